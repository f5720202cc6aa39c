//! Bus configuration.

use serde::{Deserialize, Serialize};

/// Message bus settings.
///
/// Deserializes from a partial document; missing fields take their defaults:
///
/// ```ignore
/// let config: BusConfig = serde_json::from_str(r#"{ "ignore_missing_handlers": true }"#)?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Treat an event nobody handles as fully handled instead of failing.
    pub ignore_missing_handlers: bool,

    /// Upper bound for each memoized lookup table (handler resolution and
    /// dependency binding). `0` disables memoization.
    pub cache_size: usize,

    /// Dependency name the bus looks under for the unit of work whose new
    /// events feed the cascade.
    pub unit_of_work_name: String,
}

impl BusConfig {
    pub const DEFAULT_CACHE_SIZE: usize = 64;
    pub const DEFAULT_UNIT_OF_WORK_NAME: &'static str = "uow";

    pub fn with_ignore_missing_handlers(mut self, ignore: bool) -> Self {
        self.ignore_missing_handlers = ignore;
        self
    }

    pub fn with_cache_size(mut self, cache_size: usize) -> Self {
        self.cache_size = cache_size;
        self
    }

    pub fn with_unit_of_work_name(mut self, name: impl Into<String>) -> Self {
        self.unit_of_work_name = name.into();
        self
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            ignore_missing_handlers: false,
            cache_size: Self::DEFAULT_CACHE_SIZE,
            unit_of_work_name: Self::DEFAULT_UNIT_OF_WORK_NAME.to_string(),
        }
    }
}
