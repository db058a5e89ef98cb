//! Webhook server command: `deployhook serve`.

use anyhow::Result;
use std::path::Path;

use deployhook::config::Config;

pub async fn cmd_serve(config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)?;
    tracing::debug!(config = %config_path.display(), "configuration loaded");
    deployhook::server::start_server(config).await
}
