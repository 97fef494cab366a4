//! Logging bootstrap.
//!
//! easyacme logs through `tracing`; binaries call [`init_tracing`] once at startup.

use anyhow::Result;
use std::str::FromStr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable that overrides the configured log format
pub const LOG_FORMAT_ENV: &str = "EASYACME_LOG_FORMAT";

/// Output format of the formatting layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins over `default_level`; `EASYACME_LOG_FORMAT` wins over `format`.
pub fn init_tracing(default_level: &str, format: LogFormat) -> Result<()> {
    let format = std::env::var(LOG_FORMAT_ENV)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(format);

    let json_layer = (format == LogFormat::Json).then(|| {
        fmt::layer()
            .json()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
    });

    let pretty_layer = (format == LogFormat::Pretty).then(|| {
        fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
    });

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(pretty_layer)
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("Pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
