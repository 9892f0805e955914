//! Demo application settings.

use affix_core::UploadLimits;
use serde::{Deserialize, Serialize};

/// Settings for the demo app, fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Simulated round-trip time of the in-memory daemon, in
    /// milliseconds. Zero disables the delay.
    pub latency_ms: u32,

    /// Intake restrictions for every attachment panel.
    pub limits: UploadLimits,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            latency_ms: 600,
            limits: UploadLimits::default(),
        }
    }
}

impl AppConfig {
    /// Parse settings from JSON. Missing fields keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns the parse error if `json` is not a valid settings object.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Settings baked in at build time through `AFFIX_CONFIG`, falling
    /// back to the defaults when unset or invalid.
    #[must_use]
    pub fn from_build_env() -> Self {
        let Some(json) = option_env!("AFFIX_CONFIG") else {
            return Self::default();
        };
        Self::from_json(json).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "ignoring invalid AFFIX_CONFIG");
            Self::default()
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_gives_defaults() {
        assert_eq!(AppConfig::from_json("{}").unwrap(), AppConfig::default());
    }

    #[test]
    fn partial_override_keeps_other_fields() {
        let config = AppConfig::from_json(
            r#"{"latency_ms": 0, "limits": {"max_bytes": 1024, "allowed": ["image/*"]}}"#,
        )
        .unwrap();
        assert_eq!(config.latency_ms, 0);
        assert_eq!(config.limits.max_bytes, 1024);
        assert!(config.limits.allows_type("image/png"));
        assert!(!config.limits.allows_type("application/pdf"));
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(AppConfig::from_json("{latency_ms: }").is_err());
    }
}
