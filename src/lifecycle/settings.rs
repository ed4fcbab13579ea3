//! Node settings read from the `gateway` configuration section.
//!
//! | Key | Env var | Default |
//! |-----|---------|---------|
//! | `workers_per_role` | `GATEWAY__WORKERS_PER_ROLE` | 1 |
//! | `mailbox_size` | `GATEWAY__MAILBOX_SIZE` | 32 |
//! | `timeout_ms` | `GATEWAY__TIMEOUT_MS` | 5000 |
//! | `config_fallback` | `GATEWAY__CONFIG_FALLBACK` | `abort` |
//! | `actor_system` | `GATEWAY__ACTOR_SYSTEM` | `ClusterSys` |

use crate::gateway::DEFAULT_DISPATCH_TIMEOUT;
use crate::membership::{ConfigError, ConfigFallback};
use config::{Config, Value};
use std::time::Duration;

pub const SECTION: &str = "gateway";
pub const DEFAULT_ACTOR_SYSTEM: &str = "ClusterSys";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeSettings {
    /// Echo workers spawned for each cluster role.
    pub workers_per_role: usize,
    pub mailbox_size: usize,
    pub dispatch_timeout: Duration,
    /// Applied when the `cluster` section is invalid.
    pub config_fallback: ConfigFallback,
    /// Actor-system name used in the node address.
    pub actor_system: String,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            workers_per_role: 1,
            mailbox_size: 32,
            dispatch_timeout: DEFAULT_DISPATCH_TIMEOUT,
            config_fallback: ConfigFallback::Abort,
            actor_system: DEFAULT_ACTOR_SYSTEM.to_string(),
        }
    }
}

impl NodeSettings {
    /// Reads the `gateway` section of `source`. Absent keys keep their defaults.
    pub fn from_source(source: &Config) -> Result<Self, ConfigError> {
        let section = match source.get_table(SECTION) {
            Ok(section) => section,
            Err(config::ConfigError::NotFound(_)) => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };

        let mut settings = Self::default();
        if let Some(value) = section.get("workers_per_role") {
            settings.workers_per_role = non_negative("gateway.workers_per_role", value.clone())?;
        }
        if let Some(value) = section.get("mailbox_size") {
            settings.mailbox_size = positive("gateway.mailbox_size", value.clone())?;
        }
        if let Some(value) = section.get("timeout_ms") {
            let millis = positive("gateway.timeout_ms", value.clone())?;
            settings.dispatch_timeout = Duration::from_millis(millis as u64);
        }
        if let Some(value) = section.get("config_fallback") {
            settings.config_fallback = parse_fallback(value.clone())?;
        }
        if let Some(value) = section.get("actor_system") {
            let name = value
                .clone()
                .into_string()
                .map_err(|e| ConfigError::invalid("gateway.actor_system", e.to_string()))?;
            let name = name.trim();
            if name.is_empty() {
                return Err(ConfigError::invalid("gateway.actor_system", "must not be empty"));
            }
            settings.actor_system = name.to_string();
        }
        Ok(settings)
    }
}

fn non_negative(key: &str, value: Value) -> Result<usize, ConfigError> {
    let raw = value
        .into_int()
        .map_err(|e| ConfigError::invalid(key, e.to_string()))?;
    usize::try_from(raw).map_err(|_| ConfigError::invalid(key, format!("{raw} is negative")))
}

fn positive(key: &str, value: Value) -> Result<usize, ConfigError> {
    match non_negative(key, value)? {
        0 => Err(ConfigError::invalid(key, "must be greater than zero")),
        n => Ok(n),
    }
}

fn parse_fallback(value: Value) -> Result<ConfigFallback, ConfigError> {
    let key = "gateway.config_fallback";
    let raw = value
        .into_string()
        .map_err(|e| ConfigError::invalid(key, e.to_string()))?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "abort" => Ok(ConfigFallback::Abort),
        "defaults" | "use_defaults" => Ok(ConfigFallback::UseDefaults),
        other => Err(ConfigError::invalid(
            key,
            format!("unknown policy `{other}`, expected `abort` or `defaults`"),
        )),
    }
}
