use std::sync::Arc;
use std::time::Duration;
use vdoc_core::cache::MemoryBackend;
use vdoc_core::metrics::CACHE_REQUESTS;
use vdoc_core::CacheLayer;

fn count(outcome: &str) -> u64 { CACHE_REQUESTS.with_label_values(&["get", outcome]).get() }

#[test]
fn mis_shaped_entry_counts_one_miss_and_no_hit() {
    let cache = Arc::new(CacheLayer::new(MemoryBackend::new(), Duration::from_secs(60)));
    let square = cache.memoize("square", None, |n: &u32| Ok::<_, std::convert::Infallible>(n * n));
    let key = square.key_for(&3u32);
    assert!(cache.set(&key, "not a number", None));

    let (hits, misses) = (count("hit"), count("miss"));
    assert_eq!(square.call(&3u32).unwrap(), 9);
    assert_eq!(count("hit"), hits);
    assert_eq!(count("miss"), misses + 1);

    assert_eq!(square.call(&3u32).unwrap(), 9);
    assert_eq!(count("hit"), hits + 1);
}
