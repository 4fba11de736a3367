pub mod config;
pub mod query_client;
pub mod rule_builder;
pub mod scheduler;
