use dashmap::DashMap;
use std::time::{Duration, Instant};

/// The hot-cache contract (spec §6): `get`/`set`/`delete`/
/// `invalidate_pattern`, opaque JSON values, non-fatal failures. Misses
/// always fall back to the store — callers must not treat a cache miss as
/// an error.
pub trait HotCache: Send + Sync {
    fn get(&self, key: &str) -> Option<serde_json::Value>;
    fn set(&self, key: &str, value: serde_json::Value, ttl: Duration);
    fn delete(&self, key: &str);
    /// `pattern` is a simple glob: a literal prefix followed by an
    /// optional trailing `*`, matching the patterns the engine actually
    /// issues (`latest_block*`, `chain_info*`, `balance_<addr>*`).
    fn invalidate_pattern(&self, pattern: &str);
}

struct Entry {
    value: serde_json::Value,
    expires_at: Instant,
}

/// In-process, DashMap-backed implementation. The original CAD-COIN
/// reference used Redis; a single-node service gets a process-local cache
/// instead, since the contract only promises short-TTL memoization, not
/// cross-process sharing.
pub struct InProcessCache {
    entries: DashMap<String, Entry>,
    default_ttl: Duration,
}

impl InProcessCache {
    pub fn new(default_ttl_secs: u64) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl: Duration::from_secs(default_ttl_secs),
        }
    }
}

impl Default for InProcessCache {
    fn default() -> Self {
        Self::new(3600)
    }
}

impl HotCache for InProcessCache {
    fn get(&self, key: &str) -> Option<serde_json::Value> {
        match self.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn set(&self, key: &str, value: serde_json::Value, ttl: Duration) {
        let ttl = if ttl.is_zero() { self.default_ttl } else { ttl };
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    fn delete(&self, key: &str) {
        self.entries.remove(key);
    }

    fn invalidate_pattern(&self, pattern: &str) {
        let prefix = pattern.trim_end_matches('*');
        self.entries.retain(|k, _| !k.starts_with(prefix));
        tracing::debug!(pattern, "cache pattern invalidated");
    }
}
