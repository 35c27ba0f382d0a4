use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::CacheGateway;
use crate::{MixerError, Result};

/// Pause between reconnect attempts after a connection failure.
const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// Idle connections kept for reuse. Extra connections opened under load are
/// closed after their command.
const MAX_IDLE_CONNECTIONS: usize = 8;

#[derive(Default)]
struct PoolState {
    idle: Vec<redis::Connection>,
    retry_at: Option<Instant>,
}

/// Redis-backed gateway over a small pool of lazily opened connections.
///
/// The pool lock is only held to check a connection out or back in, never
/// across a network round trip.
pub struct RedisCache {
    client: redis::Client,
    timeout: Duration,
    pool: Mutex<PoolState>,
}

impl RedisCache {
    /// Parses `url` without connecting. The first command opens a
    /// connection.
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|err| MixerError::Config(format!("invalid redis url `{url}`: {err}")))?;

        Ok(Self {
            client,
            timeout,
            pool: Mutex::new(PoolState::default()),
        })
    }

    fn run<T, F>(&self, command: F) -> Result<T>
    where
        F: FnOnce(&mut redis::Connection) -> redis::RedisResult<T>,
    {
        let mut connection = self.checkout()?;

        match command(&mut connection) {
            Ok(value) => {
                self.checkin(connection);
                Ok(value)
            }
            Err(err) => {
                if err.is_io_error() || err.is_connection_dropped() || err.is_timeout() {
                    self.back_off();
                } else {
                    self.checkin(connection);
                }
                Err(MixerError::CacheUnavailable(err.to_string()))
            }
        }
    }

    fn checkout(&self) -> Result<redis::Connection> {
        {
            let mut pool = self.lock()?;
            if let Some(retry_at) = pool.retry_at {
                if Instant::now() < retry_at {
                    return Err(MixerError::CacheUnavailable("backing off after failure".into()));
                }
                pool.retry_at = None;
            }
            if let Some(connection) = pool.idle.pop() {
                return Ok(connection);
            }
        }

        match self.connect() {
            Ok(connection) => {
                debug!("opened redis connection");
                Ok(connection)
            }
            Err(err) => {
                self.back_off();
                Err(err)
            }
        }
    }

    fn checkin(&self, connection: redis::Connection) {
        if let Ok(mut pool) = self.lock() {
            if pool.idle.len() < MAX_IDLE_CONNECTIONS {
                pool.idle.push(connection);
            }
        }
    }

    /// Drops every idle connection and holds off reconnecting.
    fn back_off(&self) {
        if let Ok(mut pool) = self.lock() {
            pool.idle.clear();
            pool.retry_at = Some(Instant::now() + RECONNECT_BACKOFF);
        }
    }

    fn connect(&self) -> Result<redis::Connection> {
        let unavailable = |err: redis::RedisError| MixerError::CacheUnavailable(err.to_string());

        let connection = self
            .client
            .get_connection_with_timeout(self.timeout)
            .map_err(unavailable)?;
        connection
            .set_read_timeout(Some(self.timeout))
            .map_err(unavailable)?;
        connection
            .set_write_timeout(Some(self.timeout))
            .map_err(unavailable)?;
        Ok(connection)
    }

    fn lock(&self) -> Result<MutexGuard<'_, PoolState>> {
        self.pool
            .lock()
            .map_err(|_| MixerError::CacheUnavailable("redis pool has been poisoned".into()))
    }
}

impl CacheGateway for RedisCache {
    fn get(&self, key: &str) -> Option<String> {
        match self.run(|conn| redis::cmd("GET").arg(key).query::<Option<String>>(conn)) {
            Ok(value) => value,
            Err(err) => {
                warn!(%err, "cache read failed; treating as miss");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) {
        let seconds = ttl.as_secs().max(1);
        let stored = self.run(|conn| {
            redis::cmd("SETEX")
                .arg(key)
                .arg(seconds)
                .arg(value)
                .query::<()>(conn)
        });
        if let Err(err) = stored {
            warn!(%err, "cache write failed; dropping");
        }
    }

    fn is_available(&self) -> bool {
        self.run(|conn| redis::cmd("PING").query::<String>(conn))
            .is_ok()
    }
}

impl fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCache")
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable() -> RedisCache {
        // Nothing listens on port 1; connects are refused immediately.
        RedisCache::new("redis://127.0.0.1:1/", Duration::from_millis(200)).unwrap()
    }

    #[test]
    fn rejects_malformed_urls() {
        let err = RedisCache::new("not a url", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, MixerError::Config(_)));
    }

    #[test]
    fn unreachable_server_degrades_to_misses() {
        let cache = unreachable();
        cache.set("k", "v", Duration::from_secs(60));
        assert_eq!(cache.get("k"), None);
        assert!(!cache.is_available());
    }

    #[test]
    fn backs_off_after_a_failed_connect() {
        let cache = unreachable();
        assert!(cache.run(|conn| redis::cmd("PING").query::<String>(conn)).is_err());

        {
            let pool = cache.lock().unwrap();
            assert!(pool.idle.is_empty());
            assert!(pool.retry_at.is_some());
        }

        // While backing off, commands fail without touching the network.
        let err = cache
            .run(|conn| redis::cmd("PING").query::<String>(conn))
            .unwrap_err();
        assert!(err.to_string().contains("backing off"));
    }

    #[test]
    fn concurrent_callers_fail_fast_during_an_outage() {
        let cache = std::sync::Arc::new(unreachable());
        cache.set("warm", "up", Duration::from_secs(60));

        let started = Instant::now();
        let handles: Vec<_> = (0..8)
            .map(|n| {
                let cache = cache.clone();
                std::thread::spawn(move || cache.get(&format!("key-{n}")))
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), None);
        }
        assert!(started.elapsed() < RECONNECT_BACKOFF);
    }
}
