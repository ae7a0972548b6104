//! Cache layer: JSON values in a pluggable key-value backend.
//!
//! Every backend failure is absorbed here. A `get` against an unreachable store is a
//! miss and a `set` reports `false`, so callers recompute instead of failing. A circuit
//! breaker stops hammering a store that is down.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use vdoc_resilience::{BreakerState, CallError, CircuitBreaker};

use crate::config::{CacheBackendKind, CacheSettings};
use crate::metrics;

pub mod key;
pub mod memoize;
pub mod memory;
#[cfg(feature = "cache-redis")]
pub mod redis;

pub use memoize::Memoized;
pub use memory::{Clock, ManualClock, MemoryBackend, SystemClock};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cache value codec: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Raw string store. Implementations may fail; [`CacheLayer`] turns failures into misses.
pub trait CacheBackend: Send + Sync {
    fn name(&self) -> &'static str;
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;
    fn delete(&self, key: &str) -> Result<(), CacheError>;
    fn clear(&self) -> Result<(), CacheError>;
}

/// Always misses, accepts nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBackend;

impl CacheBackend for NoopBackend {
    fn name(&self) -> &'static str { "noop" }
    fn get(&self, _key: &str) -> Result<Option<String>, CacheError> { Ok(None) }
    fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), CacheError> { Ok(()) }
    fn delete(&self, _key: &str) -> Result<(), CacheError> { Ok(()) }
    fn clear(&self) -> Result<(), CacheError> { Ok(()) }
}

pub struct CacheLayer {
    backend: Box<dyn CacheBackend>,
    breaker: CircuitBreaker,
    default_ttl: Duration,
}

impl CacheLayer {
    pub fn new(backend: impl CacheBackend + 'static, default_ttl: Duration) -> Self {
        Self::with_breaker(backend, default_ttl, CircuitBreaker::new("cache", 3, Duration::from_secs(30)))
    }

    pub fn with_breaker(backend: impl CacheBackend + 'static, default_ttl: Duration, breaker: CircuitBreaker) -> Self {
        Self { backend: Box::new(backend), breaker, default_ttl }
    }

    pub fn disabled() -> Self { Self::new(NoopBackend, Duration::from_secs(3600)) }

    pub fn from_settings(settings: &CacheSettings) -> Self {
        let breaker = CircuitBreaker::new("cache", settings.breaker_failure_threshold, settings.breaker_open());
        let ttl = settings.default_ttl();
        match settings.backend {
            #[cfg(feature = "cache-redis")]
            CacheBackendKind::Redis => match self::redis::RedisBackend::new(settings) {
                Ok(b) => Self::with_breaker(b, ttl, breaker),
                Err(e) => {
                    warn!(error = %e, url = %settings.url(), "redis cache misconfigured, caching disabled");
                    Self::with_breaker(NoopBackend, ttl, breaker)
                }
            },
            #[cfg(not(feature = "cache-redis"))]
            CacheBackendKind::Redis => {
                warn!("built without cache-redis, caching disabled");
                Self::with_breaker(NoopBackend, ttl, breaker)
            }
            CacheBackendKind::Memory => Self::with_breaker(MemoryBackend::new(), ttl, breaker),
            CacheBackendKind::Disabled => Self::with_breaker(NoopBackend, ttl, breaker),
        }
    }

    pub fn backend_name(&self) -> &'static str { self.backend.name() }
    pub fn default_ttl(&self) -> Duration { self.default_ttl }
    pub fn breaker_state(&self) -> BreakerState { self.breaker.state() }

    fn guarded<T>(&self, op: &'static str, f: impl FnOnce(&dyn CacheBackend) -> Result<T, CacheError>) -> Option<T> {
        match self.breaker.call(|| f(self.backend.as_ref())) {
            Ok(v) => Some(v),
            Err(CallError::Rejected(e)) => {
                debug!(op, error = %e, "cache skipped");
                metrics::cache_op(op, "skipped");
                None
            }
            Err(CallError::Failed(e)) => {
                warn!(op, backend = self.backend.name(), error = %e, "cache operation failed");
                metrics::cache_op(op, "error");
                None
            }
        }
    }

    fn lookup(&self, key: &str) -> Option<Value> {
        let raw = self.guarded("get", |b| b.get(key))??;
        match serde_json::from_str(&raw) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(key, error = %e, "discarding undecodable cache entry");
                metrics::cache_op("get", "error");
                None
            }
        }
    }

    /// Cached value for `key`, or `None` when absent, expired, undecodable or the store is down.
    pub fn get(&self, key: &str) -> Option<Value> {
        let value = self.lookup(key)?;
        metrics::cache_op("get", "hit");
        Some(value)
    }

    /// Like [`get`](Self::get), but a value of the wrong shape for `T` is a miss, not a hit.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.lookup(key)?;
        match serde_json::from_value(value) {
            Ok(v) => {
                metrics::cache_op("get", "hit");
                Some(v)
            }
            Err(e) => {
                debug!(key, error = %e, "cached value has unexpected shape");
                metrics::cache_op("get", "mismatch");
                None
            }
        }
    }

    /// Store `value` as JSON. `ttl = None` uses the configured default. Returns whether the write landed.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Option<Duration>) -> bool {
        let encoded = match serde_json::to_string(value) {
            Ok(s) => s,
            Err(e) => {
                warn!(key, error = %e, "value not cacheable");
                metrics::cache_op("set", "error");
                return false;
            }
        };
        let ttl = ttl.unwrap_or(self.default_ttl);
        let stored = self.guarded("set", |b| b.set(key, &encoded, ttl)).is_some();
        if stored { metrics::cache_op("set", "ok"); }
        stored
    }

    pub fn delete(&self, key: &str) -> bool { self.guarded("delete", |b| b.delete(key)).is_some() }

    pub fn clear(&self) -> bool { self.guarded("clear", |b| b.clear()).is_some() }

    /// Cached value for `key`, or the result of `compute`, which is then stored. Errors are not cached.
    pub fn get_or_compute<T, E>(&self, key: &str, ttl: Option<Duration>, compute: impl FnOnce() -> Result<T, E>) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
    {
        if let Some(hit) = self.get_as::<T>(key) {
            return Ok(hit);
        }
        metrics::cache_op("get", "miss");
        let value = compute()?;
        self.set(key, &value, ttl);
        Ok(value)
    }

    /// Wrap `func` so results are cached under `identity` plus the input's key arguments.
    ///
    /// `func` must be deterministic in its input; nothing checks this.
    pub fn memoize<F>(self: &Arc<Self>, identity: impl Into<String>, ttl: Option<Duration>, func: F) -> Memoized<F> {
        Memoized::new(Arc::clone(self), identity.into(), ttl, func)
    }
}
