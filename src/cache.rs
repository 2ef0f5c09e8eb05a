use anyhow::{Result, anyhow};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub const HOUR: Duration = Duration::from_secs(60 * 60);
pub const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Shared key-value store with per-key expiry. Implementations must make
/// `set_max` atomic with respect to other writers of the same key.
pub trait Cache {
    fn get(&self, key: &str) -> Result<Option<Value>>;

    fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<()>;

    /// Increments an integer key. Fails when the key is absent or expired.
    fn incr(&self, key: &str) -> Result<i64>;

    /// Stores `value` only if it exceeds the current value (or the key is
    /// absent). Returns whether the write happened.
    fn set_max(&self, key: &str, value: i64, ttl: Duration) -> Result<bool>;

    fn delete(&self, key: &str) -> Result<()>;

    fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>>
    where
        Self: Sized,
    {
        match self.get(key)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    fn set_as<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<()>
    where
        Self: Sized,
    {
        self.set(key, serde_json::to_value(value)?, ttl)
    }
}

impl<C: Cache + ?Sized> Cache for &C {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<()> {
        (**self).set(key, value, ttl)
    }

    fn incr(&self, key: &str) -> Result<i64> {
        (**self).incr(key)
    }

    fn set_max(&self, key: &str, value: i64, ttl: Duration) -> Result<bool> {
        (**self).set_max(key, value, ttl)
    }

    fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key)
    }
}

struct Entry {
    value: Value,
    expires_at: Instant,
}

/// In-process cache, used by tests and single-process runs.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries<T>(&self, f: impl FnOnce(&mut HashMap<String, Entry>) -> Result<T>) -> Result<T> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("cache lock poisoned"))?;
        let now = Instant::now();
        entries.retain(|_, e| e.expires_at > now);
        f(&mut entries)
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        self.with_entries(|entries| Ok(entries.get(key).map(|e| e.value.clone())))
    }

    fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<()> {
        self.with_entries(|entries| {
            entries.insert(key.to_string(), Entry {
                value,
                expires_at: Instant::now() + ttl,
            });
            Ok(())
        })
    }

    fn incr(&self, key: &str) -> Result<i64> {
        self.with_entries(|entries| {
            let entry = entries
                .get_mut(key)
                .ok_or_else(|| anyhow!("cache key {} not found", key))?;
            let current = entry
                .value
                .as_i64()
                .ok_or_else(|| anyhow!("cache key {} is not an integer", key))?;
            entry.value = Value::from(current + 1);
            Ok(current + 1)
        })
    }

    fn set_max(&self, key: &str, value: i64, ttl: Duration) -> Result<bool> {
        self.with_entries(|entries| {
            let current = entries.get(key).and_then(|e| e.value.as_i64());
            if current.is_some_and(|c| c >= value) {
                return Ok(false);
            }
            entries.insert(key.to_string(), Entry {
                value: Value::from(value),
                expires_at: Instant::now() + ttl,
            });
            Ok(true)
        })
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.with_entries(|entries| {
            entries.remove(key);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn incr_requires_existing_key() {
        let cache = MemoryCache::new();
        assert!(cache.incr("fails").is_err());
        cache.set("fails", json!(1), HOUR).unwrap();
        assert_eq!(cache.incr("fails").unwrap(), 2);
    }

    #[test]
    fn set_max_never_regresses() {
        let cache = MemoryCache::new();
        assert!(cache.set_max("wm", 10, DAY).unwrap());
        assert!(!cache.set_max("wm", 7, DAY).unwrap());
        assert!(!cache.set_max("wm", 10, DAY).unwrap());
        assert!(cache.set_max("wm", 11, DAY).unwrap());
        assert_eq!(cache.get_as::<i64>("wm").unwrap(), Some(11));
    }

    #[test]
    fn expired_entries_disappear() {
        let cache = MemoryCache::new();
        cache.set("short", json!("x"), Duration::ZERO).unwrap();
        assert_eq!(cache.get("short").unwrap(), None);
    }

    #[test]
    fn typed_round_trip_through_reference() {
        let cache = MemoryCache::new();
        let by_ref = &cache;
        by_ref.set_as("ids", &vec![1, 2, 3], HOUR).unwrap();
        assert_eq!(cache.get_as::<Vec<i64>>("ids").unwrap(), Some(vec![1, 2, 3]));
        by_ref.delete("ids").unwrap();
        assert_eq!(cache.get("ids").unwrap(), None);
    }
}
