//! Configuration validation: `deployhook check-config`.

use anyhow::Result;
use std::path::Path;

use deployhook::config::Config;

pub fn cmd_check_config(config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)?;
    let server = &config.server;

    println!();
    println!("Configuration OK: {}", config_path.display());
    println!();
    println!("[server]");
    println!("  addr                = {}", server.addr);
    println!("  secret              = {}", mask(&server.secret));
    println!("  upload_dir          = {}", server.upload_dir.display());
    println!("  script_dir          = {}", server.script_dir.display());
    println!("  logs_dir            = {}", server.logs_dir.display());
    println!("  web_dir             = {}", server.web_dir.display());
    println!("  max_upload_bytes    = {}", server.max_upload_bytes);
    match config.deploy_timeout() {
        Some(t) => println!("  deploy_timeout      = {}s", t.as_secs()),
        None => println!("  deploy_timeout      = unbounded"),
    }
    println!("  docker_cmd          = {}", server.docker_cmd);
    println!();
    println!("[auth]");
    println!("  users               = {}", config.auth.users.len());

    if !server.script_dir.is_dir() {
        println!();
        println!(
            "Warning: script_dir {} does not exist yet; it is created on serve.",
            server.script_dir.display()
        );
    }
    Ok(())
}

fn mask(secret: &str) -> String {
    format!("<{} chars>", secret.chars().count())
}
