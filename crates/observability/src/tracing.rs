//! Tracing/logging initialization.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Subscriber settings.
///
/// `RUST_LOG`, when set, takes precedence over `default_filter`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingSettings {
    pub default_filter: String,
    /// JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for TracingSettings {
    fn default() -> Self {
        Self {
            default_filter: "info".to_string(),
            json: true,
        }
    }
}

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init() {
    init_with(&TracingSettings::default());
}

pub fn init_with(settings: &TracingSettings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.default_filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false);

    // A subscriber installed earlier wins.
    let _ = if settings.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_default_to_json_at_info() {
        let settings: TracingSettings = serde_json::from_str(r#"{ "json": false }"#).unwrap();
        assert_eq!(settings.default_filter, "info");
        assert!(!settings.json);
    }

    #[test]
    fn init_is_idempotent() {
        init();
        init_with(&TracingSettings {
            default_filter: "debug".into(),
            json: false,
        });
    }
}
