//! Result cache in front of the two operations.
//!
//! Backends implement [`CacheGateway`]. None of its methods may fail: an
//! unreachable backend reads as a miss and swallows writes, so a cache
//! outage only costs recomputation.

mod memory;
mod redis_cache;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::config::{CacheBackend, CacheConfig};
use crate::Result;

pub use memory::MemoryCache;
pub use redis_cache::RedisCache;

/// Minimal key/value capability with expiry.
pub trait CacheGateway: Send + Sync {
    /// Returns the stored value, or `None` on a miss or backend failure.
    fn get(&self, key: &str) -> Option<String>;

    /// Stores `value` for `ttl`. Failures are logged and dropped.
    fn set(&self, key: &str, value: &str, ttl: Duration);

    /// Whether the backend currently answers.
    fn is_available(&self) -> bool;
}

/// Gateway used when caching is switched off.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

impl CacheGateway for NoCache {
    fn get(&self, _key: &str) -> Option<String> {
        None
    }

    fn set(&self, _key: &str, _value: &str, _ttl: Duration) {}

    fn is_available(&self) -> bool {
        false
    }
}

/// Builds the gateway described by `config`. A Redis URL that cannot be
/// parsed degrades to [`NoCache`] instead of failing startup.
pub fn build_gateway(config: &CacheConfig) -> Arc<dyn CacheGateway> {
    match config.backend {
        CacheBackend::Redis => {
            let timeout = Duration::from_millis(config.timeout_ms);
            match RedisCache::new(&config.redis_url(), timeout) {
                Ok(cache) => Arc::new(cache),
                Err(err) => {
                    warn!(%err, "redis cache disabled");
                    Arc::new(NoCache)
                }
            }
        }
        CacheBackend::Memory => Arc::new(MemoryCache::new()),
        CacheBackend::None => Arc::new(NoCache),
    }
}

/// Derives the cache key for `operation` invoked with `params`.
///
/// The key is the hex SHA-256 of `operation:canonical-json`, where object
/// keys are sorted at every level so parameter order never matters.
pub fn cache_key(operation: &str, params: &Value) -> String {
    let mut canonical = String::new();
    write_canonical(params, &mut canonical);

    let mut hasher = Sha256::new();
    hasher.update(operation.as_bytes());
    hasher.update(b":");
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (index, (key, value)) in entries.into_iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(value, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Whether [`get_or_compute`] answered from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

/// Returns the cached value for `key` or runs `compute`, storing its output
/// only when it succeeds.
pub fn get_or_compute<F>(
    gateway: &dyn CacheGateway,
    key: &str,
    ttl: Duration,
    compute: F,
) -> Result<(String, CacheStatus)>
where
    F: FnOnce() -> Result<String>,
{
    if let Some(value) = gateway.get(key) {
        debug!(key, "cache hit");
        return Ok((value, CacheStatus::Hit));
    }

    let value = compute()?;
    gateway.set(key, &value, ttl);
    Ok((value, CacheStatus::Miss))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::MixerError;

    #[test]
    fn key_ignores_parameter_order() {
        let a = json!({"lyrics": "song.lrc", "bpm": 120.0, "beats_per_bar": 4, "offset": 0.0});
        let b = json!({"offset": 0.0, "beats_per_bar": 4, "bpm": 120.0, "lyrics": "song.lrc"});

        assert_eq!(cache_key("map-lyrics", &a), cache_key("map-lyrics", &b));
        assert_eq!(cache_key("map-lyrics", &a), cache_key("map-lyrics", &a));
        assert_eq!(cache_key("map-lyrics", &a).len(), 64);
    }

    #[test]
    fn key_depends_on_operation_and_values() {
        let params = json!({"input": "a.wav", "preset": "car-wash"});
        let other = json!({"input": "b.wav", "preset": "car-wash"});

        assert_ne!(cache_key("mix", &params), cache_key("map-lyrics", &params));
        assert_ne!(cache_key("mix", &params), cache_key("mix", &other));
    }

    #[test]
    fn canonical_form_sorts_nested_objects() {
        let mut out = String::new();
        write_canonical(&json!({"b": {"y": 1, "x": [true, null]}, "a": "q\""}), &mut out);
        assert_eq!(out, r#"{"a":"q\"","b":{"x":[true,null],"y":1}}"#);
    }

    #[test]
    fn stores_only_successful_results() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(60);

        let failed = get_or_compute(&cache, "k", ttl, || Err(MixerError::invalid("boom")));
        assert!(failed.is_err());
        assert_eq!(cache.get("k"), None);

        let (value, status) = get_or_compute(&cache, "k", ttl, || Ok("v1".into())).unwrap();
        assert_eq!((value.as_str(), status), ("v1", CacheStatus::Miss));

        let (value, status) = get_or_compute(&cache, "k", ttl, || Ok("v2".into())).unwrap();
        assert_eq!((value.as_str(), status), ("v1", CacheStatus::Hit));
    }

    #[test]
    fn disabled_cache_always_recomputes() {
        let ttl = Duration::from_secs(60);
        let (_, status) = get_or_compute(&NoCache, "k", ttl, || Ok("v".into())).unwrap();
        assert_eq!(status, CacheStatus::Miss);
        assert!(!NoCache.is_available());
    }
}
