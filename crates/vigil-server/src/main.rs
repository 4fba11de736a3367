use anyhow::Result;
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use vigil_alert::engine::Rule;
use vigil_notify::manager::NotificationManager;
use vigil_notify::plugin::ChannelRegistry;

use vigil_server::config::ServerConfig;
use vigil_server::query_client::HttpQueryProvider;
use vigil_server::rule_builder;
use vigil_server::scheduler::{RuleScheduler, SchedulerSettings};

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  vigil-server [config.toml]                        Start evaluating the configured rules");
    eprintln!("  vigil-server test-rule <config.toml> <rule.json>  Evaluate one rule once and notify as a test alert");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("vigil=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("test-rule") => {
            let config_path = args.get(2).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("test-rule requires <config.toml> and <rule.json> arguments")
            })?;
            let rule_path = args.get(3).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("test-rule requires <rule.json> argument")
            })?;
            run_test_rule(config_path, rule_path).await
        }
        Some("--help" | "-h") => {
            print_usage();
            Ok(())
        }
        _ => {
            let config_path = args
                .get(1)
                .map(|s| s.as_str())
                .unwrap_or("config/server.toml");
            run_server(config_path).await
        }
    }
}

fn build_notifier(config: &ServerConfig) -> Result<NotificationManager> {
    let registry = ChannelRegistry::default();
    let mut notifier = NotificationManager::from_configs(
        &registry,
        config
            .channels
            .iter()
            .map(|c| (c.name.as_str(), c.channel_type.as_str(), &c.config)),
    )?;
    if notifier.is_empty() {
        tracing::warn!("No notification channels configured, falling back to the log channel");
        let channel = registry.create_channel("log", "log", &serde_json::Value::Null)?;
        notifier.register("log", channel)?;
    }
    Ok(notifier)
}

fn build_provider(config: &ServerConfig) -> Result<HttpQueryProvider> {
    HttpQueryProvider::new(&config.query.endpoint, config.query_timeout().as_std())
}

/// Evaluate one rule file entry once and send the result as test alerts.
async fn run_test_rule(config_path: &str, rule_path: &str) -> Result<()> {
    let config = ServerConfig::load(config_path)?;
    let content = std::fs::read_to_string(rule_path)
        .map_err(|e| anyhow::anyhow!("Failed to read rule file '{}': {}", rule_path, e))?;
    let entry: serde_json::Value = serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Failed to parse rule file '{}': {}", rule_path, e))?;
    let rule: Rule = rule_builder::build_rule(0, &entry)?;

    let provider = build_provider(&config)?;
    let notifier = build_notifier(&config)?;

    let alerts = rule
        .test_eval(&provider, Utc::now(), &CancellationToken::new(), config.query_timeout())
        .await?;
    tracing::info!(rule_id = %rule.id(), alerts = alerts.len(), "Test evaluation finished");
    if !alerts.is_empty() {
        notifier.notify(&alerts).await;
    }
    Ok(())
}

async fn run_server(config_path: &str) -> Result<()> {
    let config = ServerConfig::load(config_path)?;
    let rules_path = config.rules_path(Path::new(config_path));

    tracing::info!(
        query_endpoint = %config.query.endpoint,
        rules_file = %rules_path.display(),
        resend_delay = %config.alerting.resend_delay,
        "vigil-server starting"
    );

    let provider = Arc::new(build_provider(&config)?);
    let notifier = Arc::new(build_notifier(&config)?);
    let rules = rule_builder::load_rules_file(&rules_path)?;

    let shutdown = CancellationToken::new();
    let mut scheduler = RuleScheduler::new(
        provider,
        notifier,
        SchedulerSettings {
            query_timeout: config.query_timeout(),
            resend_delay: config.alerting.resend_delay,
        },
        shutdown.clone(),
    );
    for rule in rules {
        scheduler.add(rule);
    }
    tracing::info!(scheduled = scheduler.len(), "Alert rules running");

    signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    scheduler.shutdown().await;
    Ok(())
}
