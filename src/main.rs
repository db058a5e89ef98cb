use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use deployhook::config::DEFAULT_CONFIG_FILE;
use deployhook::telemetry::{self, LogFormat};

mod cmd;

#[derive(Parser)]
#[command(name = "deployhook")]
#[command(version, about = "Signed deployment webhook: run named scripts and stream their output")]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, global = true, env = "DEPLOYHOOK_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the webhook server
    Serve,
    /// Print a signed timestamp for a deploy code
    Sign {
        /// Deploy code, the script name without `.sh`
        code: String,
        /// Millisecond timestamp to sign instead of the current time
        #[arg(long)]
        timestamp: Option<i64>,
    },
    /// Validate the configuration file and print the effective settings
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    telemetry::init(cli.verbose, cli.log_format)?;

    match &cli.command {
        Commands::Serve => cmd::cmd_serve(&cli.config).await?,
        Commands::Sign { code, timestamp } => cmd::cmd_sign(&cli.config, code, *timestamp)?,
        Commands::CheckConfig => cmd::cmd_check_config(&cli.config)?,
    }

    Ok(())
}
