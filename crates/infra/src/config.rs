//! Platform configuration.
//!
//! ```bash
//! DATABASE_URL=postgres://...          # optional; in-memory store when unset
//! BIZDESK_PACKAGES_DIR=./packages      # scanned for */module.json
//! BIZDESK_COLLISION_POLICY=warn        # warn | reject
//! BIZDESK_EVENT_CHANNEL=bizdesk.modules
//! REDIS_URL=redis://127.0.0.1/         # optional; redis feature only
//! ```

use std::env;
use std::path::PathBuf;

use thiserror::Error;

use bizdesk_modules::CollisionPolicy;

pub const DEFAULT_PACKAGES_DIR: &str = "./packages";
pub const DEFAULT_EVENT_CHANNEL: &str = "bizdesk.modules";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformConfig {
    pub database_url: Option<String>,
    pub packages_dir: PathBuf,
    pub collision_policy: CollisionPolicy,
    pub event_channel: String,
    pub redis_url: Option<String>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            packages_dir: PathBuf::from(DEFAULT_PACKAGES_DIR),
            collision_policy: CollisionPolicy::default(),
            event_channel: DEFAULT_EVENT_CHANNEL.to_string(),
            redis_url: None,
        }
    }
}

impl PlatformConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let collision_policy = match get("BIZDESK_COLLISION_POLICY") {
            Some(raw) => raw.parse::<CollisionPolicy>().map_err(|reason| ConfigError::Invalid {
                var: "BIZDESK_COLLISION_POLICY",
                reason,
            })?,
            None => defaults.collision_policy,
        };

        Ok(Self {
            database_url: get("DATABASE_URL"),
            packages_dir: get("BIZDESK_PACKAGES_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.packages_dir),
            collision_policy,
            event_channel: get("BIZDESK_EVENT_CHANNEL").unwrap_or(defaults.event_channel),
            redis_url: get("REDIS_URL"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = PlatformConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, PlatformConfig::default());
    }

    #[test]
    fn reads_all_variables() {
        let config = PlatformConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/bizdesk"),
            ("BIZDESK_PACKAGES_DIR", "/srv/packages"),
            ("BIZDESK_COLLISION_POLICY", "Reject"),
            ("BIZDESK_EVENT_CHANNEL", "modules"),
            ("REDIS_URL", " "),
        ]))
        .unwrap();

        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/bizdesk"));
        assert_eq!(config.packages_dir, PathBuf::from("/srv/packages"));
        assert_eq!(config.collision_policy, CollisionPolicy::Reject);
        assert_eq!(config.event_channel, "modules");
        assert_eq!(config.redis_url, None);
    }

    #[test]
    fn rejects_unknown_collision_policy() {
        let err = PlatformConfig::from_lookup(lookup(&[("BIZDESK_COLLISION_POLICY", "merge")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "BIZDESK_COLLISION_POLICY", .. }));
    }
}
