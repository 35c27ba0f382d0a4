use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{MixerError, Result};

/// Top-level configuration structure for the service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub cache: CacheConfig,
}

impl ServiceConfig {
    /// Loads configuration from a TOML file. Missing sections and keys fall
    /// back to their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(MixerError::NotFound(path.to_path_buf()));
        }
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|err| MixerError::Config(err.to_string()))
    }

    /// Reads `path` when given, otherwise returns the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }
}

/// Configuration for the HTTP listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            request_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Which cache implementation backs the HTTP handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Redis,
    Memory,
    None,
}

impl std::str::FromStr for CacheBackend {
    type Err = MixerError;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            "none" | "off" | "disabled" => Ok(Self::None),
            other => Err(MixerError::Config(format!(
                "unknown cache backend `{other}`"
            ))),
        }
    }
}

/// Configuration specific to the result cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    pub redis_host: String,
    pub redis_port: u16,
    /// Lifetime of cached responses.
    pub ttl_secs: u64,
    /// Upper bound for connecting to and talking with the backend.
    pub timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Redis,
            redis_host: "localhost".to_string(),
            redis_port: 6379,
            ttl_secs: 3600,
            timeout_ms: 2000,
        }
    }
}

impl CacheConfig {
    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}/", self.redis_host, self.redis_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = ServiceConfig::from_toml(
            r#"
            [server]
            port = 8080

            [cache]
            backend = "memory"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.cache.backend, CacheBackend::Memory);
        assert_eq!(config.cache.ttl_secs, 3600);
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = ServiceConfig::from_toml("[server\nport = ").unwrap_err();
        assert!(matches!(err, MixerError::Config(_)));
    }

    #[test]
    fn parses_backend_names() {
        assert_eq!("Redis".parse::<CacheBackend>().unwrap(), CacheBackend::Redis);
        assert_eq!("off".parse::<CacheBackend>().unwrap(), CacheBackend::None);
        assert!("memcached".parse::<CacheBackend>().is_err());
    }

    #[test]
    fn builds_redis_url() {
        let cache = CacheConfig::default();
        assert_eq!(cache.redis_url(), "redis://localhost:6379/");
    }
}
