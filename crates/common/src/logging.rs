//! Logging setup and configuration

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Output layout of the fmt layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-field lines with targets
    #[default]
    Full,
    /// Single-line, abbreviated output
    Compact,
}

impl FromStr for LogFormat {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "full" => Ok(LogFormat::Full),
            "compact" => Ok(LogFormat::Compact),
            other => Err(crate::Error::Config(format!(
                "Invalid log format '{}', must be one of: full, compact",
                other
            ))),
        }
    }
}

/// Setup tracing subscriber for the application
///
/// `RUST_LOG` takes precedence over `default_level`. Logs go to stderr so
/// stdout stays free for operation replies.
pub fn setup_logging(default_level: &str, format: LogFormat) -> crate::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| crate::Error::Config(format!("Invalid log filter: {}", e)))?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = match format {
        LogFormat::Full => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .try_init(),
    };

    result.map_err(|e| crate::Error::Config(format!("Logging already initialized: {}", e)))
}
