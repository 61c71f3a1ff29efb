use std::{net::SocketAddr, path::PathBuf};

use log::debug;
use serde::Deserialize;

use crate::error::{ApiError, Error};

pub const ENV_PREFIX: &str = "FOODGRAM_";

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8000))
}

fn default_base_url() -> String {
    String::from("http://localhost:8000")
}

fn default_media_root() -> PathBuf {
    PathBuf::from("media")
}

fn default_max_connections() -> u32 {
    5
}

fn default_jwt_lifetime_hours() -> i64 {
    24
}

/// Server settings read from `FOODGRAM_*` environment variables.
#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_media_root")]
    pub media_root: PathBuf,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_jwt_lifetime_hours")]
    pub jwt_lifetime_hours: i64,
    pub log_level: Option<LogLevel>,
}

impl Config {
    pub fn from_env() -> Result<Self, Error> {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<I>(vars: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config: Config = envy::prefixed(ENV_PREFIX)
            .from_iter(vars)
            .map_err(|e| ApiError::Internal.new(&format!("Invalid configuration: {e}")))?;

        if config.jwt_secret.is_empty() {
            return Err(ApiError::Internal.new("Invalid configuration: empty jwt secret"));
        }

        debug!("Loaded configuration for {}", config.bind_address);
        Ok(config)
    }

    /// `RUST_LOG` first, then the configured level on top of it.
    pub fn logger(&self) -> env_logger::Builder {
        let mut builder = env_logger::Builder::from_default_env();
        if let Some(level) = self.log_level {
            builder.filter_level(level.to_filter());
        }
        builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_fill_optional_settings() {
        let config = Config::from_vars(vars(&[
            ("FOODGRAM_DATABASE_URL", "postgres://localhost/foodgram"),
            ("FOODGRAM_JWT_SECRET", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.bind_address, default_bind_address());
        assert_eq!(config.base_url, "http://localhost:8000");
        assert_eq!(config.media_root, PathBuf::from("media"));
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.jwt_lifetime_hours, 24);
        assert_eq!(config.log_level, None);
    }

    #[test]
    fn explicit_values_override_defaults() {
        let config = Config::from_vars(vars(&[
            ("FOODGRAM_DATABASE_URL", "postgres://db/foodgram"),
            ("FOODGRAM_JWT_SECRET", "secret"),
            ("FOODGRAM_BIND_ADDRESS", "127.0.0.1:9000"),
            ("FOODGRAM_MAX_CONNECTIONS", "12"),
            ("FOODGRAM_LOG_LEVEL", "debug"),
        ]))
        .unwrap();

        assert_eq!(config.bind_address.port(), 9000);
        assert_eq!(config.max_connections, 12);
        assert_eq!(config.log_level, Some(LogLevel::Debug));
    }

    #[test]
    fn missing_database_url_is_rejected() {
        let result = Config::from_vars(vars(&[("FOODGRAM_JWT_SECRET", "secret")]));

        assert!(result.is_err());
    }
}
