//! Diagnostic logging through `tracing`.
//!
//! Everything goes to stderr so command output on stdout (`status --json`,
//! `logs`) stays machine-readable. Operator-facing progress is the activity
//! log in [`crate::store`]; the controller mirrors each entry here under the
//! `outreach_pilot::activity` target.
//!
//! Environment:
//!
//! - `OUTREACH_LOG` (falls back to `RUST_LOG`): filter directives, e.g.
//!   `outreach_pilot=debug`
//! - `OUTREACH_LOG_FORMAT`: `pretty` (default), `compact` or `json`

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_FILTER: &str = "outreach_pilot=info,warn";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    /// One JSON object per line
    Json,
}

impl LogFormat {
    /// Case-insensitive; anything unrecognised is `Pretty`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            "compact" => Self::Compact,
            _ => Self::Pretty,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub filter: String,
    pub format: LogFormat,
    /// Source file and line on every event
    pub with_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            format: LogFormat::default(),
            with_location: false,
        }
    }
}

impl LogConfig {
    pub fn from_env() -> Self {
        let filter = std::env::var("OUTREACH_LOG")
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| DEFAULT_FILTER.to_string());
        let format = std::env::var("OUTREACH_LOG_FORMAT")
            .map(|s| LogFormat::parse(&s))
            .unwrap_or_default();
        Self {
            filter,
            format,
            ..Default::default()
        }
    }

    /// `--verbose`: debug for this crate, with locations.
    pub fn debug() -> Self {
        Self {
            filter: "outreach_pilot=debug,info".to_string(),
            with_location: true,
            ..Self::from_env()
        }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}

/// Install the global subscriber. Returns `false` if one was already set.
pub fn init(config: LogConfig) -> bool {
    let location = config.with_location;
    let pretty = (config.format == LogFormat::Pretty).then(|| {
        fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
            .with_file(location)
            .with_line_number(location)
    });
    let compact = (config.format == LogFormat::Compact).then(|| {
        fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_file(location)
            .with_line_number(location)
    });
    let json = (config.format == LogFormat::Json).then(|| {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_file(location)
            .with_line_number(location)
    });

    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(pretty)
        .with(compact)
        .with(json)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parsing_is_lenient() {
        assert_eq!(LogFormat::parse(" JSON "), LogFormat::Json);
        assert_eq!(LogFormat::parse("compact"), LogFormat::Compact);
        assert_eq!(LogFormat::parse("fancy"), LogFormat::Pretty);
    }

    #[test]
    fn verbose_adds_locations() {
        let config = LogConfig::debug();
        assert!(config.filter.starts_with("outreach_pilot=debug"));
        assert!(config.with_location);
    }
}
