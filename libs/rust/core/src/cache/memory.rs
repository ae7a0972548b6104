//! In-process TTL map, used when no external cache service is configured and in tests.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{CacheBackend, CacheError};

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant { Instant::now() }
}

/// Clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock { now: Arc<Mutex<Instant>> }

impl ManualClock {
    pub fn new() -> Self { Self { now: Arc::new(Mutex::new(Instant::now())) } }
    pub fn advance(&self, by: Duration) { *self.now.lock() += by; }
}

impl Default for ManualClock {
    fn default() -> Self { Self::new() }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant { *self.now.lock() }
}

/// `expires_at = None` when the TTL runs past what `Instant` can represent.
struct Entry { value: String, expires_at: Option<Instant> }

impl Entry {
    fn live_at(&self, now: Instant) -> bool { self.expires_at.map_or(true, |at| at > now) }
}

pub struct MemoryBackend {
    entries: RwLock<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryBackend {
    pub fn new() -> Self { Self::with_clock(SystemClock) }

    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        Self { entries: RwLock::new(HashMap::new()), clock: Arc::new(clock) }
    }

    pub fn len(&self) -> usize { self.entries.read().len() }
    pub fn is_empty(&self) -> bool { self.entries.read().is_empty() }

    /// Drop every expired entry. Reads already ignore them; this reclaims memory.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut map = self.entries.write();
        let before = map.len();
        map.retain(|_, e| e.live_at(now));
        before - map.len()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self { Self::new() }
}

impl CacheBackend for MemoryBackend {
    fn name(&self) -> &'static str { "memory" }

    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = self.clock.now();
        {
            let map = self.entries.read();
            match map.get(key) {
                None => return Ok(None),
                Some(e) if e.live_at(now) => return Ok(Some(e.value.clone())),
                Some(_) => {}
            }
        }
        let mut map = self.entries.write();
        if map.get(key).is_some_and(|e| !e.live_at(now)) { map.remove(key); }
        Ok(None)
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = self.clock.now().checked_add(ttl);
        self.entries.write().insert(key.to_string(), Entry { value: value.to_string(), expires_at });
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), CacheError> {
        self.entries.write().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_expire_with_the_clock() {
        let clock = ManualClock::new();
        let mem = MemoryBackend::with_clock(clock.clone());
        mem.set("k", "\"v\"", Duration::from_secs(10)).unwrap();
        assert_eq!(mem.get("k").unwrap().as_deref(), Some("\"v\""));
        clock.advance(Duration::from_secs(10));
        assert_eq!(mem.get("k").unwrap(), None);
        assert!(mem.is_empty());
    }

    #[test]
    fn oversized_ttl_never_expires() {
        let clock = ManualClock::new();
        let mem = MemoryBackend::with_clock(clock.clone());
        mem.set("k", "1", Duration::MAX).unwrap();
        clock.advance(Duration::from_secs(86_400 * 365));
        assert_eq!(mem.get("k").unwrap().as_deref(), Some("1"));
        assert_eq!(mem.purge_expired(), 0);
    }

    #[test]
    fn purge_drops_only_expired() {
        let clock = ManualClock::new();
        let mem = MemoryBackend::with_clock(clock.clone());
        mem.set("short", "1", Duration::from_secs(1)).unwrap();
        mem.set("long", "2", Duration::from_secs(60)).unwrap();
        clock.advance(Duration::from_secs(5));
        assert_eq!(mem.purge_expired(), 1);
        assert_eq!(mem.len(), 1);
    }
}
