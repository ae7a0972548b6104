use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::key::ToKeyArgs;
use super::CacheLayer;
use crate::metrics;

/// A computation whose results are cached by input.
///
/// Built by [`CacheLayer::memoize`]. The key is `identity` followed by the input's
/// [`ToKeyArgs`], so two memoized functions must not share an identity.
pub struct Memoized<F> {
    cache: Arc<CacheLayer>,
    identity: String,
    ttl: Option<Duration>,
    func: F,
}

impl<F> Memoized<F> {
    pub(crate) fn new(cache: Arc<CacheLayer>, identity: String, ttl: Option<Duration>, func: F) -> Self {
        Self { cache, identity, ttl, func }
    }

    pub fn identity(&self) -> &str { &self.identity }

    pub fn key_for<I: ToKeyArgs + ?Sized>(&self, input: &I) -> String { input.key_args().key(&self.identity) }

    pub fn call<I, R, E>(&self, input: &I) -> Result<R, E>
    where
        I: ToKeyArgs + ?Sized,
        R: Serialize + DeserializeOwned,
        F: Fn(&I) -> Result<R, E>,
    {
        let key = self.key_for(input);
        if let Some(hit) = self.cache.get_as::<R>(&key) {
            tracing::trace!(identity = %self.identity, "memoized hit");
            return Ok(hit);
        }
        metrics::cache_op("get", "miss");
        let result = (self.func)(input)?;
        self.cache.set(&key, &result, self.ttl);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::{ManualClock, MemoryBackend};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn recomputes_only_after_ttl() {
        let clock = ManualClock::new();
        let cache = Arc::new(CacheLayer::new(MemoryBackend::with_clock(clock.clone()), Duration::from_secs(3600)));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let double = cache.memoize("double", Some(Duration::from_secs(10)), move |s: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, std::convert::Infallible>(format!("{s}{s}"))
        });
        assert_eq!(double.call("ab").unwrap(), "abab");
        assert_eq!(double.call("ab").unwrap(), "abab");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        clock.advance(Duration::from_secs(11));
        assert_eq!(double.call("ab").unwrap(), "abab");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
