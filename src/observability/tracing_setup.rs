// observability/tracing_setup.rs - Tracing Configuration

use std::str::FromStr;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter, Layer, Registry,
};

/// Tracing output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable format (default)
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
    /// JSON format for log aggregation
    Json,
}

impl FromStr for TracingFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(TracingFormat::Pretty),
            "compact" => Ok(TracingFormat::Compact),
            "json" => Ok(TracingFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Configuration for tracing
#[derive(Clone, Debug)]
pub struct TracingConfig {
    /// Log level filter (e.g., "info", "cmdmesh=debug")
    pub filter: String,

    /// Output format
    pub format: TracingFormat,

    /// Include span close events with timings
    pub with_span_events: bool,

    /// Include file and line numbers
    pub with_file: bool,

    /// Include target (module path)
    pub with_target: bool,

    /// ANSI colors (for terminal output)
    pub with_ansi: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            filter: "info,cmdmesh=debug".into(),
            format: TracingFormat::Pretty,
            with_span_events: false,
            with_file: false,
            with_target: true,
            with_ansi: true,
        }
    }
}

impl TracingConfig {
    /// Config for a CLI-supplied level and format.
    ///
    /// libp2p internals stay at `warn` unless the level asks for more detail.
    pub fn for_cli(level: &str, format: TracingFormat) -> Self {
        let filter = match level {
            "trace" | "debug" => format!("{},libp2p_gossipsub=info", level),
            other => format!("{},libp2p=warn", other),
        };
        Self {
            filter,
            format,
            with_ansi: format != TracingFormat::Json,
            ..Self::default()
        }
    }

    /// Create a production config (JSON, minimal overhead)
    pub fn production() -> Self {
        Self {
            filter: "info,libp2p=warn".into(),
            format: TracingFormat::Json,
            with_ansi: false,
            ..Self::default()
        }
    }
}

/// Initialize the tracing subscriber
///
/// Output goes to stderr so stdout stays free for command results. Fails if
/// a global subscriber is already installed.
pub fn init_tracing(config: TracingConfig) -> Result<(), TryInitError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    let span_events = if config.with_span_events {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let base = fmt::layer()
        .with_writer(std::io::stderr)
        .with_span_events(span_events)
        .with_file(config.with_file)
        .with_line_number(config.with_file)
        .with_target(config.with_target);

    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        TracingFormat::Pretty => base.with_ansi(config.with_ansi).boxed(),
        TracingFormat::Compact => base.compact().with_ansi(config.with_ansi).boxed(),
        TracingFormat::Json => base.json().boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .try_init()?;

    tracing::info!(
        filter = %config.filter,
        format = ?config.format,
        "Tracing initialized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_config_default() {
        let config = TracingConfig::default();
        assert!(config.filter.contains("cmdmesh"));
        assert!(config.with_ansi);
    }

    #[test]
    fn test_tracing_config_production() {
        let config = TracingConfig::production();
        assert_eq!(config.format, TracingFormat::Json);
        assert!(!config.with_ansi);
    }

    #[test]
    fn test_cli_config() {
        let config = TracingConfig::for_cli("debug", TracingFormat::Json);
        assert!(config.filter.starts_with("debug"));
        assert!(!config.with_ansi);

        let config = TracingConfig::for_cli("info", TracingFormat::Pretty);
        assert!(config.filter.contains("libp2p=warn"));
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("json".parse::<TracingFormat>().unwrap(), TracingFormat::Json);
        assert_eq!("Compact".parse::<TracingFormat>().unwrap(), TracingFormat::Compact);
        assert!("xml".parse::<TracingFormat>().is_err());
    }
}
