//! `loregate serve` — start the HTTP gateway.

use std::path::Path;

use loregate_config::AppConfig;
use tracing::debug;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load(config_path)?;
    debug!(?config, "configuration loaded");
    loregate_gateway::start(config).await
}
