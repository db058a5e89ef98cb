//! Tracing subscriber setup.

use anyhow::{Result, anyhow};
use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Default filter when `RUST_LOG` is unset.
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "deployhook=debug,tower_http=debug"
    } else {
        "deployhook=info,tower_http=info"
    }
}

/// Install the global subscriber on stderr. `RUST_LOG` takes precedence over `verbose`.
pub fn init(verbose: bool, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
    .map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive_levels() {
        assert!(default_directive(false).contains("deployhook=info"));
        assert!(default_directive(true).contains("deployhook=debug"));
        EnvFilter::new(default_directive(true));
    }

    #[test]
    fn test_log_format_parses_from_cli_value() {
        assert_eq!(LogFormat::from_str("json", true).unwrap(), LogFormat::Json);
        assert_eq!(LogFormat::from_str("TEXT", true).unwrap(), LogFormat::Text);
        assert!(LogFormat::from_str("xml", true).is_err());
    }
}
