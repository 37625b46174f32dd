use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;

use crate::engine::EngineSettings;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}: cannot parse {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Server configuration, read from `INNKEEP_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub password: String,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub timezone: Tz,
    /// Zero disables stale-PENDING expiry.
    pub pending_ttl_secs: u64,
    pub lock_timeout_ms: u64,
    pub booking_retries: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 5433,
            data_dir: PathBuf::from("./data"),
            password: "innkeep".into(),
            max_connections: 256,
            compact_threshold: 1000,
            metrics_port: None,
            timezone: Tz::UTC,
            pending_ttl_secs: 900,
            lock_timeout_ms: 2000,
            booking_retries: 3,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source. Unset variables keep their default;
    /// set but malformed ones are an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let password = lookup("INNKEEP_PASSWORD").unwrap_or(defaults.password);
        let bind = lookup("INNKEEP_BIND").unwrap_or(defaults.bind);
        let data_dir = lookup("INNKEEP_DATA_DIR").map_or(defaults.data_dir, PathBuf::from);
        Ok(Self {
            bind,
            port: parse(&lookup, "INNKEEP_PORT")?.unwrap_or(defaults.port),
            data_dir,
            password,
            max_connections: parse(&lookup, "INNKEEP_MAX_CONNECTIONS")?
                .unwrap_or(defaults.max_connections),
            compact_threshold: parse(&lookup, "INNKEEP_COMPACT_THRESHOLD")?
                .unwrap_or(defaults.compact_threshold),
            metrics_port: parse(&lookup, "INNKEEP_METRICS_PORT")?,
            timezone: parse(&lookup, "INNKEEP_TIMEZONE")?.unwrap_or(defaults.timezone),
            pending_ttl_secs: parse(&lookup, "INNKEEP_PENDING_TTL_SECS")?
                .unwrap_or(defaults.pending_ttl_secs),
            lock_timeout_ms: parse(&lookup, "INNKEEP_LOCK_TIMEOUT_MS")?
                .unwrap_or(defaults.lock_timeout_ms),
            booking_retries: parse(&lookup, "INNKEEP_BOOKING_RETRIES")?
                .unwrap_or(defaults.booking_retries),
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            timezone: self.timezone,
            pending_ttl: (self.pending_ttl_secs > 0).then(|| Duration::from_secs(self.pending_ttl_secs)),
            lock_timeout: Duration::from_millis(self.lock_timeout_ms),
            booking_retries: self.booking_retries,
        }
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(value) = lookup(var) else {
        return Ok(None);
    };
    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|e: T::Err| ConfigError::Invalid {
            var,
            value,
            reason: e.to_string(),
        })
}
