//! Bootstrap utilities for the amqp-pipe binary.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LOG_ENV_VAR, LOG_FORMAT_ENV_VAR};

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line, for log shippers.
    Json,
}

impl LogFormat {
    /// Parse from string (used for env var).
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }

    /// Read the format from AMQP_PIPE_LOG_FORMAT, defaulting to text.
    pub fn from_env() -> Self {
        std::env::var(LOG_FORMAT_ENV_VAR)
            .map(|s| Self::parse(&s))
            .unwrap_or_default()
    }
}

/// Initialize tracing from the environment.
///
/// AMQP_PIPE_LOG sets the filter (default "info") and AMQP_PIPE_LOG_FORMAT
/// picks text or JSON output.
pub fn init_tracing() {
    let format = LogFormat::from_env();
    let (text, json) = match format {
        LogFormat::Text => (Some(tracing_subscriber::fmt::layer()), None),
        LogFormat::Json => (None, Some(tracing_subscriber::fmt::layer().json())),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(text)
        .with(json)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse(" JSON "), LogFormat::Json);
        assert_eq!(LogFormat::parse("text"), LogFormat::Text);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Text);
        assert_eq!(LogFormat::parse(""), LogFormat::Text);
    }

    #[test]
    fn test_json_lines_carry_fields() {
        use crate::worker::test_support::CapturedLogs;

        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::registry().with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(move || writer.clone()),
        );

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(worker = "reader", "Sending cleanup");
        });

        let output = logs.contents();
        let line = output.trim();
        assert!(line.starts_with('{') && line.ends_with('}'), "not JSON: {}", line);
        assert!(line.contains(r#""level":"INFO""#), "{}", line);
        assert!(line.contains(r#""message":"Sending cleanup""#), "{}", line);
        assert!(line.contains(r#""worker":"reader""#), "{}", line);
    }
}
