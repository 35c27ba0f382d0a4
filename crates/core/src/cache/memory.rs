use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::warn;

use super::CacheGateway;

/// In-process cache with per-entry expiry.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock()
            .map(|entries| entries.values().filter(|(_, expires)| *expires > now).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Option<MutexGuard<'_, HashMap<String, (String, Instant)>>> {
        match self.entries.lock() {
            Ok(guard) => Some(guard),
            Err(_) => {
                warn!("memory cache has been poisoned");
                None
            }
        }
    }
}

impl CacheGateway for MemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.lock()?;
        match entries.get(key) {
            Some((value, expires)) if *expires > Instant::now() => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Expired entries are evicted on every write, so the map never holds
    /// more than the live set plus the entry being written.
    fn set(&self, key: &str, value: &str, ttl: Duration) {
        if let Some(mut entries) = self.lock() {
            let now = Instant::now();
            entries.retain(|_, (_, expires)| *expires > now);
            entries.insert(key.to_string(), (value.to_string(), now + ttl));
        }
    }

    fn is_available(&self) -> bool {
        true
    }
}
