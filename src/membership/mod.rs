//! # Membership Bootstrap
//!
//! Derives this node's network identity and cluster seed list from configuration at
//! startup.
//!
//! ## Sources
//!
//! Configuration is read through the `config` crate. In production the source is the
//! process environment, with `__` separating sections from keys:
//!
//! ```text
//! CLUSTER__IP=10.0.0.5
//! CLUSTER__PORT=9001
//! CLUSTER__SEEDS=akka.tcp://ClusterSys@10.0.0.2:4055,akka.tcp://ClusterSys@10.0.0.3:4055
//! CLUSTER__ROLES=console,backend
//! ```
//!
//! ## Resolution rules
//!
//! - No `cluster` section (or an empty one): log and use [`MembershipConfig::default`].
//! - Otherwise overlay only the keys that are set. Unset keys keep their defaults.
//! - A malformed port or seed fails the whole resolution with
//!   [`ConfigError::InvalidConfiguration`]; nothing is partially applied.

pub mod identity;

pub use identity::ServiceIdentity;

use config::{Config, Environment, Value};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{info, warn};

/// Name of the configuration section holding membership keys.
pub const SECTION: &str = "cluster";

pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";
pub const DEFAULT_PUBLIC_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 4055;
pub const DEFAULT_ROLE: &str = "default";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration for `{key}`: {reason}")]
    InvalidConfiguration { key: String, reason: String },
    #[error("Configuration source error: {0}")]
    Source(#[from] config::ConfigError),
}

impl ConfigError {
    pub(crate) fn invalid(key: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidConfiguration {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// What to do when the membership configuration is present but invalid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ConfigFallback {
    /// Refuse to start. A node bound to the wrong port is worse than no node.
    #[default]
    Abort,
    /// Log the problem and run with the built-in defaults.
    UseDefaults,
}

/// One cluster seed, e.g. `akka.tcp://ClusterSys@10.0.0.2:4055` or `10.0.0.2:4055`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedAddress {
    raw: String,
    host: String,
    port: u16,
}

impl SeedAddress {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let raw = raw.trim();
        let malformed = |reason: &str| ConfigError::invalid("seeds", format!("`{raw}`: {reason}"));

        let authority = match raw.split_once("://") {
            Some(("", _)) => return Err(malformed("empty scheme")),
            Some((_, rest)) => rest,
            None => raw,
        };
        let authority = authority
            .rsplit_once('@')
            .map_or(authority, |(_, host_port)| host_port)
            .trim_end_matches('/');
        let (host, port) = authority
            .rsplit_once(':')
            .ok_or_else(|| malformed("missing port"))?;
        if host.is_empty() || host.contains(|c: char| c == '/' || c.is_whitespace()) {
            return Err(malformed("invalid host"));
        }
        let port = port
            .parse::<u16>()
            .ok()
            .filter(|port| *port != 0)
            .ok_or_else(|| malformed("port must be between 1 and 65535"))?;

        Ok(Self {
            raw: raw.to_string(),
            host: host.to_string(),
            port,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for SeedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// This node's bootstrap descriptor. Built once at startup, never mutated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MembershipConfig {
    pub seeds: Vec<SeedAddress>,
    pub bind_host: String,
    pub public_host: String,
    pub port: u16,
    pub roles: BTreeSet<String>,
}

impl Default for MembershipConfig {
    fn default() -> Self {
        Self {
            seeds: Vec::new(),
            bind_host: DEFAULT_BIND_HOST.to_string(),
            public_host: DEFAULT_PUBLIC_HOST.to_string(),
            port: DEFAULT_PORT,
            roles: BTreeSet::from([DEFAULT_ROLE.to_string()]),
        }
    }
}

impl MembershipConfig {
    /// Resolves membership from the `cluster` section of `source`.
    pub fn resolve(source: &Config) -> Result<Self, ConfigError> {
        let section = match source.get_table(SECTION) {
            Ok(section) if !section.is_empty() => section,
            Ok(_) | Err(config::ConfigError::NotFound(_)) => {
                info!("No '{}' section found, using default membership", SECTION);
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        // Parse every key before touching the result so a bad key leaves nothing applied.
        let seeds = match section.get("seeds") {
            Some(value) => Some(
                string_list("seeds", value.clone())?
                    .iter()
                    .map(|seed| SeedAddress::parse(seed))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            None => None,
        };
        let public_host = match section.get("ip") {
            Some(value) => Some(
                value
                    .clone()
                    .into_string()
                    .map_err(|e| ConfigError::invalid("ip", e.to_string()))?,
            ),
            None => None,
        };
        let port = section.get("port").map(|value| parse_port(value.clone())).transpose()?;
        let roles = match section.get("roles") {
            Some(value) => Some(string_list("roles", value.clone())?),
            None => None,
        };

        let mut resolved = Self::default();
        if let Some(seeds) = seeds {
            resolved.seeds = seeds;
        }
        if let Some(host) = public_host.map(|h| h.trim().to_string()).filter(|h| !h.is_empty()) {
            resolved.public_host = host;
        }
        if let Some(port) = port {
            resolved.port = port;
        }
        if let Some(roles) = roles.filter(|roles| !roles.is_empty()) {
            resolved.roles = roles.into_iter().collect();
        }

        info!(
            public_host = %resolved.public_host,
            port = resolved.port,
            seeds = resolved.seeds.len(),
            roles = ?resolved.roles,
            "Membership resolved"
        );
        Ok(resolved)
    }

    /// Resolves membership, applying `fallback` when the configuration is invalid.
    pub fn resolve_with(source: &Config, fallback: ConfigFallback) -> Result<Self, ConfigError> {
        match (Self::resolve(source), fallback) {
            (Ok(config), _) => Ok(config),
            (Err(e), ConfigFallback::UseDefaults) => {
                warn!(error = %e, "Invalid membership configuration, falling back to defaults");
                Ok(Self::default())
            }
            (Err(e), ConfigFallback::Abort) => Err(e),
        }
    }

    /// Resolves membership from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::resolve(&environment_source()?)
    }

    /// This node's actor-system address, e.g. `akka.tcp://ClusterSys@10.0.0.5:9001`.
    pub fn node_address(&self, system: &str) -> String {
        format!("akka.tcp://{}@{}:{}", system, self.public_host, self.port)
    }
}

/// Builds a configuration source from the process environment.
pub fn environment_source() -> Result<Config, ConfigError> {
    build_source(None)
}

/// Builds a configuration source from explicit `NAME=value` pairs, as if they were the
/// process environment.
pub fn environment_source_from<I, K, V>(vars: I) -> Result<Config, ConfigError>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let vars: config::Map<String, String> = vars
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect();
    build_source(Some(vars))
}

fn build_source(vars: Option<config::Map<String, String>>) -> Result<Config, ConfigError> {
    let environment = Environment::default()
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("cluster.seeds")
        .with_list_parse_key("cluster.roles")
        .source(vars);
    Ok(Config::builder().add_source(environment).build()?)
}

/// Reads a list of strings, accepting either a real array or a comma-separated string.
/// Blank entries are dropped.
fn string_list(key: &str, value: Value) -> Result<Vec<String>, ConfigError> {
    let items = match value.clone().into_array() {
        Ok(items) => items
            .into_iter()
            .map(Value::into_string)
            .collect::<Result<Vec<_>, _>>(),
        Err(_) => value
            .into_string()
            .map(|s| s.split(',').map(str::to_string).collect()),
    }
    .map_err(|e| ConfigError::invalid(key, e.to_string()))?;

    Ok(items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect())
}

fn parse_port(value: Value) -> Result<u16, ConfigError> {
    let port = value
        .into_int()
        .map_err(|e| ConfigError::invalid("port", e.to_string()))?;
    u16::try_from(port)
        .ok()
        .filter(|port| *port != 0)
        .ok_or_else(|| ConfigError::invalid("port", format!("{port} is outside 1..=65535")))
}
