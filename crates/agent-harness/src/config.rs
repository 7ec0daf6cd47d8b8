//! Harness Configuration
//!
//! Defaults for model selection, user timezone and request timeout, with an
//! environment override layer.

use std::time::Duration;

/// Model used when neither the builder nor the environment names one
pub const DEFAULT_MODEL: &str = "llama3.2";

/// Prefix of every system prompt
pub const DATE_INSTRUCTIONS: &str = "Always format dates in a nice human format.\n";

/// Harness-wide configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Model identifier handed to the provider
    pub model: String,

    /// Default user offset from UTC, in minutes
    pub utc_offset_minutes: i32,

    /// Upper bound on one dispatch round
    pub request_timeout: Option<Duration>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.into(),
            utc_offset_minutes: 0,
            request_timeout: None,
        }
    }
}

impl HarnessConfig {
    /// Read `AGENT_MODEL`, `AGENT_UTC_OFFSET_MINUTES` and
    /// `AGENT_REQUEST_TIMEOUT_SECS`; unset or unparsable values keep defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let model = lookup("AGENT_MODEL")
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(defaults.model);
        let utc_offset_minutes = lookup("AGENT_UTC_OFFSET_MINUTES")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(defaults.utc_offset_minutes);
        let request_timeout = lookup("AGENT_REQUEST_TIMEOUT_SECS")
            .and_then(|v| v.trim().parse().ok())
            .map(Duration::from_secs)
            .or(defaults.request_timeout);

        Self {
            model,
            utc_offset_minutes,
            request_timeout,
        }
    }
}
