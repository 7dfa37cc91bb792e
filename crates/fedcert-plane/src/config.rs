//! Plane configuration
//!
//! Read from `FEDCERT_*` environment variables by the binary. Every value
//! has a default; a value that is present but unparsable is an error.

use fedcert_trust::ResolverConfig;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

use crate::error::{PlaneError, Result};

pub const ENV_LOG_LEVEL: &str = "FEDCERT_LOG_LEVEL";
pub const ENV_BIND_HOST: &str = "FEDCERT_BIND_HOST";
pub const ENV_BASE_PORT: &str = "FEDCERT_BASE_PORT";
pub const ENV_SOLVE_TIMEOUT_SECS: &str = "FEDCERT_SOLVE_TIMEOUT_SECS";
pub const ENV_MAX_CHAIN_DEPTH: &str = "FEDCERT_MAX_CHAIN_DEPTH";

/// Runtime configuration for hosting and challenge solving
#[derive(Debug, Clone, PartialEq)]
pub struct PlaneConfig {
    /// Maximum log level
    pub log_level: Level,
    /// Host the publication listeners bind to
    pub bind_host: String,
    /// Port of the first listener; later listeners take consecutive ports
    pub base_port: u16,
    /// Budget for a whole solve-and-validate flow
    pub solve_timeout: Duration,
    /// Longest trust chain accepted, counted in entities
    pub max_chain_depth: usize,
}

impl Default for PlaneConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            bind_host: "127.0.0.1".into(),
            base_port: 8001,
            solve_timeout: Duration::from_secs(30),
            max_chain_depth: fedcert_trust::DEFAULT_MAX_DEPTH,
        }
    }
}

impl PlaneConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let max_chain_depth = parse_or(&lookup, ENV_MAX_CHAIN_DEPTH, defaults.max_chain_depth)?;
        if max_chain_depth < 2 {
            return Err(PlaneError::Config(format!(
                "{} must be at least 2, got {}",
                ENV_MAX_CHAIN_DEPTH, max_chain_depth
            )));
        }

        let solve_timeout_secs: u64 = parse_or(
            &lookup,
            ENV_SOLVE_TIMEOUT_SECS,
            defaults.solve_timeout.as_secs(),
        )?;
        if solve_timeout_secs == 0 {
            return Err(PlaneError::Config(format!(
                "{} must be positive",
                ENV_SOLVE_TIMEOUT_SECS
            )));
        }

        Ok(Self {
            log_level: parse_or(&lookup, ENV_LOG_LEVEL, defaults.log_level)?,
            bind_host: lookup(ENV_BIND_HOST).unwrap_or(defaults.bind_host),
            base_port: parse_or(&lookup, ENV_BASE_PORT, defaults.base_port)?,
            solve_timeout: Duration::from_secs(solve_timeout_secs),
            max_chain_depth,
        })
    }

    /// Resolver settings derived from this configuration
    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            max_depth: self.max_chain_depth,
            timeout: Some(self.solve_timeout),
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| PlaneError::Config(format!("{}='{}': {}", key, raw, e))),
    }
}
