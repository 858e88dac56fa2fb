//! Runtime configuration.
//!
//! Settings can be built in code or loaded from JSON, or from TOML when the
//! `toml` feature is enabled:
//!
//! ```toml
//! record_maxlen = 128
//!
//! [wait]
//! deferred = true
//! timeout_ms = 5000
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// How a wait on a callback behaves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitOptions {
    /// Keep the firing thread parked until the context is acknowledged.
    pub deferred: bool,
    /// Give up waiting for an emission after this long.
    pub timeout_ms: Option<u64>,
    /// Give up waiting for the acknowledgement (firing side) after this long.
    pub ack_timeout_ms: Option<u64>,
}

impl WaitOptions {
    pub fn deferred() -> Self {
        Self {
            deferred: true,
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn ack_timeout(&self) -> Option<Duration> {
        self.ack_timeout_ms.map(Duration::from_millis)
    }
}

fn default_record_maxlen() -> usize {
    1024
}

/// Top-level runtime settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub wait: WaitOptions,
    /// History length kept by variable records.
    #[serde(default = "default_record_maxlen")]
    pub record_maxlen: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            wait: WaitOptions::default(),
            record_maxlen: default_record_maxlen(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    #[cfg(feature = "toml")]
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|err| Error::Config(err.to_string()))
    }

    #[cfg(not(feature = "toml"))]
    pub fn from_toml_str(_s: &str) -> Result<Self> {
        Err(Error::suggest(["toml"]))
    }

    /// Load from a `.json` or `.toml` file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&text),
            Some("toml") => Self::from_toml_str(&text),
            other => Err(Error::Config(format!(
                "unsupported configuration format: {}",
                other.unwrap_or("<none>")
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config = RuntimeConfig::from_json_str(r#"{"wait": {"deferred": true}}"#).unwrap();
        assert!(config.wait.deferred);
        assert_eq!(config.wait.timeout(), None);
        assert_eq!(config.record_maxlen, 1024);
    }

    #[test]
    fn durations_come_from_milliseconds() {
        let options = WaitOptions::deferred()
            .with_timeout(Duration::from_secs(2))
            .with_ack_timeout(Duration::from_millis(250));
        assert_eq!(options.timeout_ms, Some(2000));
        assert_eq!(options.ack_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = RuntimeConfig::from_json_str("{").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[cfg(feature = "toml")]
    #[test]
    fn toml_is_parsed() {
        let config = RuntimeConfig::from_toml_str("record_maxlen = 8\n[wait]\ntimeout_ms = 10\n").unwrap();
        assert_eq!(config.record_maxlen, 8);
        assert_eq!(config.wait.timeout(), Some(Duration::from_millis(10)));
    }

    #[cfg(not(feature = "toml"))]
    #[test]
    fn toml_requires_feature() {
        let err = RuntimeConfig::from_toml_str("").unwrap_err();
        assert!(matches!(err, Error::OptionalDependencyMissing { .. }));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let path = std::env::temp_dir().join("controllables-config-test.yaml");
        std::fs::write(&path, "wait: {}").unwrap();
        let err = RuntimeConfig::load(&path).unwrap_err();
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(err, Error::Config(_)));
    }
}
