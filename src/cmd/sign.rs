//! Signature helper: `deployhook sign`.

use anyhow::{Context, Result};
use std::path::Path;

use deployhook::config::Config;
use deployhook::deploy::{signer, validator::Code};

pub fn cmd_sign(config_path: &Path, code: &str, timestamp: Option<i64>) -> Result<()> {
    let config = Config::load(config_path)?;
    let code = Code::parse(code).with_context(|| format!("Invalid deploy code '{}'", code))?;

    let timestamp = timestamp
        .unwrap_or_else(|| chrono::Utc::now().timestamp_millis())
        .to_string();
    let sign = signer::sign(&config.server.secret, code.as_str(), &timestamp);

    let out = serde_json::json!({
        "code": code.as_str(),
        "timestamp": timestamp,
        "sign": sign,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
