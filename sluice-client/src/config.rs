//! Client configuration.
//!
//! A [`ClientConfig`] can be built in code or loaded from TOML:
//!
//! ```toml
//! limit_global = 40
//! limit_per_destination = 6
//! request_timeout = "30s"
//!
//! [destination_limits]
//! "api.example.org:80" = 2
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sluice_core::{DEFAULT_LIMIT_GLOBAL, DEFAULT_LIMIT_PER_DESTINATION};

use crate::destination::Destination;
use crate::error::{Error, Result};

/// Settings for a [`Client`](crate::Client).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Maximum requests executing at once across all destinations.
    pub limit_global: usize,
    /// Default maximum requests executing at once against one destination.
    pub limit_per_destination: usize,
    /// Per-destination overrides of `limit_per_destination`, keyed `host:port`.
    pub destination_limits: BTreeMap<String, usize>,
    /// `User-Agent` sent when a request does not set one.
    pub user_agent: String,
    /// Upper bound on how long `send` waits for a response head. `None`
    /// waits indefinitely.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Option<Duration>,
    /// Capacity of each pool's submission queue.
    pub submission_depth: usize,
    /// Capacity of the driver's event queue.
    pub event_depth: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            limit_global: DEFAULT_LIMIT_GLOBAL,
            limit_per_destination: DEFAULT_LIMIT_PER_DESTINATION,
            destination_limits: BTreeMap::new(),
            user_agent: concat!("sluice/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout: None,
            submission_depth: 64,
            event_depth: 256,
        }
    }
}

impl ClientConfig {
    /// Parses a TOML document and validates it.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: ClientConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a TOML configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Checks limits and queue depths are positive and override keys parse.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("limit_global", self.limit_global),
            ("limit_per_destination", self.limit_per_destination),
            ("submission_depth", self.submission_depth),
            ("event_depth", self.event_depth),
        ] {
            if value == 0 {
                return Err(Error::Config(format!("{name} must be at least 1")));
            }
        }
        for (key, limit) in &self.destination_limits {
            key.parse::<Destination>()
                .map_err(|err| Error::Config(format!("destination_limits key {key:?}: {err}")))?;
            if *limit == 0 {
                return Err(Error::Config(format!(
                    "destination_limits.{key:?} must be at least 1"
                )));
            }
        }
        Ok(())
    }

    /// The connection limit for `destination`, honouring overrides.
    pub fn limit_for(&self, destination: &Destination) -> usize {
        self.destination_limits
            .iter()
            .find(|(key, _)| {
                key.parse::<Destination>()
                    .is_ok_and(|parsed| parsed == *destination)
            })
            .map_or(self.limit_per_destination, |(_, limit)| *limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_library_constants() {
        let config = ClientConfig::default();
        assert_eq!(config.limit_global, 40);
        assert_eq!(config.limit_per_destination, 6);
        assert!(config.request_timeout.is_none());
        assert!(config.user_agent.starts_with("sluice/"));
        config.validate().unwrap();
    }

    #[test]
    fn parses_toml_with_overrides() {
        let config = ClientConfig::from_toml_str(
            r#"
            limit_global = 8
            request_timeout = "1s 500ms"

            [destination_limits]
            "Api.Example.org:8080" = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.limit_global, 8);
        assert_eq!(config.limit_per_destination, 6);
        assert_eq!(config.request_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(
            config.limit_for(&Destination::new("api.example.org", 8080)),
            2
        );
        assert_eq!(config.limit_for(&Destination::new("other", 80)), 6);
    }

    #[test]
    fn rejects_zero_limits_and_bad_keys() {
        assert!(matches!(
            ClientConfig::from_toml_str("limit_global = 0"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            ClientConfig::from_toml_str("[destination_limits]\n\"a:b:c\" = 1"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            ClientConfig::from_toml_str("[destination_limits]\n\"host:80\" = 0"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            ClientConfig::from_toml_str("unknown_key = 1"),
            Err(Error::Config(_))
        ));
    }
}
