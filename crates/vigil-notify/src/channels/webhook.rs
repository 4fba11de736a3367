use crate::error::{NotifyError, Result};
use crate::plugin::ChannelPlugin;
use crate::utils::{truncate_string, MAX_BODY_LENGTH};
use crate::NotificationChannel;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use vigil_alert::alert::NamedAlert;

const MAX_ATTEMPTS: u32 = 3;

fn default_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize)]
struct WebhookConfig {
    url: String,
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
    #[serde(default)]
    headers: BTreeMap<String, String>,
}

/// POSTs each batch of alerts as a JSON document:
///
/// ```json
/// {"receiver": "ops", "alerts": [{"name": "High CPU", "state": "firing", ...}]}
/// ```
///
/// Failed requests and non-2xx responses are retried with exponential
/// backoff.
pub struct WebhookChannel {
    name: String,
    url: String,
    headers: BTreeMap<String, String>,
    client: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(name: &str, url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            name: name.to_string(),
            url: url.to_string(),
            headers: BTreeMap::new(),
            client,
        })
    }

    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    fn render_body(&self, alerts: &[NamedAlert]) -> Value {
        serde_json::json!({
            "receiver": self.name,
            "alerts": alerts,
        })
    }

    async fn post_once(&self, body: &Value) -> anyhow::Result<()> {
        let mut request = self.client.post(self.url.as_str()).json(body);
        for (key, value) in &self.headers {
            request = request.header(key.as_str(), value.as_str());
        }

        let resp = request.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let resp_body = match resp.text().await {
            Ok(text) => truncate_string(&text, MAX_BODY_LENGTH),
            Err(e) => format!("[Failed to read response body: {e}]"),
        };
        anyhow::bail!("HTTP {status}: {resp_body}")
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    async fn send(&self, alerts: &[NamedAlert]) -> anyhow::Result<()> {
        if alerts.is_empty() {
            return Ok(());
        }

        let body = self.render_body(alerts);
        let mut last_err = None;
        for attempt in 0..MAX_ATTEMPTS {
            match self.post_once(&body).await {
                Ok(()) => {
                    tracing::debug!(channel = %self.name, count = alerts.len(), "Webhook delivered");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(
                        channel = %self.name,
                        attempt = attempt + 1,
                        error = %e,
                        "Webhook send failed, retrying"
                    );
                    last_err = Some(e);
                }
            }
            if attempt + 1 < MAX_ATTEMPTS {
                tokio::time::sleep(Duration::from_millis(100 * 2u64.pow(attempt))).await;
            }
        }

        Err(last_err
            .unwrap_or_else(|| anyhow::anyhow!("webhook not attempted"))
            .context(format!("webhook {} failed after {MAX_ATTEMPTS} attempts", self.url)))
    }

    fn channel_type(&self) -> &str {
        "webhook"
    }
}

pub struct WebhookPlugin;

impl WebhookPlugin {
    fn parse(config: &Value) -> Result<WebhookConfig> {
        let cfg: WebhookConfig = serde_json::from_value(config.clone())?;
        let parsed = url::Url::parse(&cfg.url)
            .map_err(|e| NotifyError::InvalidConfig(format!("webhook url {:?}: {e}", cfg.url)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(NotifyError::InvalidConfig(format!(
                "webhook url must be http or https, got {:?}",
                cfg.url
            )));
        }
        Ok(cfg)
    }
}

impl ChannelPlugin for WebhookPlugin {
    fn name(&self) -> &str {
        "webhook"
    }

    fn validate_config(&self, config: &Value) -> Result<()> {
        Self::parse(config).map(|_| ())
    }

    fn create_channel(&self, channel_name: &str, config: &Value) -> Result<Box<dyn NotificationChannel>> {
        let cfg = Self::parse(config)?;
        let channel = WebhookChannel::new(channel_name, &cfg.url, Duration::from_secs(cfg.timeout_secs))?
            .with_headers(cfg.headers);
        Ok(Box::new(channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use vigil_alert::alert::{Alert, AlertState};
    use vigil_common::types::Labels;

    type Requests = Arc<Mutex<Vec<(String, Value)>>>;

    /// Answers one request per entry of `statuses`, then stops listening.
    async fn serve(statuses: Vec<u16>) -> (String, Requests) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/hook", listener.local_addr().unwrap());
        let requests = Requests::default();
        let recorded = requests.clone();
        tokio::spawn(async move {
            for status in statuses {
                let (mut stream, _) = listener.accept().await.unwrap();
                let request = read_request(&mut stream).await;
                recorded.lock().unwrap().push(request);
                let resp = format!(
                    "HTTP/1.1 {status} Test\r\nContent-Length: 2\r\nConnection: close\r\n\r\nno"
                );
                stream.write_all(resp.as_bytes()).await.unwrap();
                stream.shutdown().await.ok();
            }
        });
        (url, requests)
    }

    async fn read_request(stream: &mut TcpStream) -> (String, Value) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                panic!("connection closed mid-request");
            }
            buf.extend_from_slice(&chunk[..n]);
            let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let len = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            let body_start = end + 4;
            if buf.len() >= body_start + len {
                let body = serde_json::from_slice(&buf[body_start..body_start + len]).unwrap();
                return (head, body);
            }
        }
    }

    fn firing(name: &str) -> NamedAlert {
        let mut alert = Alert::pending(
            Labels::from_pairs([("host", "web-01")]),
            Labels::new(),
            97.5,
            Utc::now(),
        );
        alert.state = AlertState::Firing;
        NamedAlert {
            name: name.to_string(),
            alert,
        }
    }

    fn channel(url: &str) -> WebhookChannel {
        WebhookChannel::new("ops", url, Duration::from_secs(5))
            .unwrap()
            .with_headers(BTreeMap::from([("X-Token".to_string(), "abc".to_string())]))
    }

    #[tokio::test]
    async fn posts_receiver_and_alerts() {
        let (url, requests) = serve(vec![200]).await;
        channel(&url).send(&[firing("High CPU")]).await.unwrap();

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let (head, body) = &requests[0];
        assert!(head.starts_with("post /hook "));
        assert!(head.contains("x-token: abc"));
        assert!(head.contains("content-type: application/json"));
        assert_eq!(body["receiver"], "ops");
        let alerts = body["alerts"].as_array().unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0]["name"], "High CPU");
        assert_eq!(alerts[0]["state"], "firing");
        assert_eq!(alerts[0]["value"], 97.5);
    }

    #[tokio::test]
    async fn retries_server_errors_until_success() {
        let (url, requests) = serve(vec![503, 200]).await;
        channel(&url).send(&[firing("High CPU")]).await.unwrap();
        assert_eq!(requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn gives_up_after_three_attempts() {
        let (url, requests) = serve(vec![500, 502, 503]).await;
        let started = std::time::Instant::now();
        let err = channel(&url).send(&[firing("High CPU")]).await.unwrap_err();

        assert_eq!(requests.lock().unwrap().len(), 3);
        // 100ms then 200ms between attempts.
        assert!(started.elapsed() >= Duration::from_millis(300));
        let message = format!("{err:#}");
        assert!(message.contains("failed after 3 attempts"), "{message}");
        assert!(message.contains("503"), "{message}");
    }

    #[tokio::test]
    async fn empty_batch_sends_nothing() {
        let (url, requests) = serve(vec![200]).await;
        channel(&url).send(&[]).await.unwrap();
        assert!(requests.lock().unwrap().is_empty());
    }

    #[test]
    fn rejects_missing_or_bad_url() {
        let plugin = WebhookPlugin;
        assert!(matches!(
            plugin.validate_config(&serde_json::json!({})),
            Err(NotifyError::JsonError(_))
        ));
        assert!(matches!(
            plugin.validate_config(&serde_json::json!({ "url": "ftp://example.com" })),
            Err(NotifyError::InvalidConfig(_))
        ));
        assert!(plugin
            .validate_config(&serde_json::json!({ "url": "https://hooks.example.com/x" }))
            .is_ok());
    }

    #[test]
    fn config_defaults() {
        let cfg = WebhookPlugin::parse(&serde_json::json!({ "url": "http://localhost:9000" })).unwrap();
        assert_eq!(cfg.timeout_secs, 10);
        assert!(cfg.headers.is_empty());
    }
}
