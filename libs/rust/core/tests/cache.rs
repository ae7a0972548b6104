use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vdoc_core::cache::{ManualClock, MemoryBackend};
use vdoc_core::{derive_key, CacheBackendKind, CacheLayer, CacheSettings, Complex, KeyArg, KeyArgs, ToKeyArg, ToKeyArgs};

#[test]
fn keyword_order_does_not_change_the_key() {
    let pos = [1i64.to_key_arg(), "a".to_key_arg()];
    let a = derive_key("f", &pos, &[("b", 2i64.to_key_arg()), ("a", 1i64.to_key_arg())]);
    let b = derive_key("f", &pos, &[("a", 1i64.to_key_arg()), ("b", 2i64.to_key_arg())]);
    assert_eq!(a, b);
    assert_eq!(a, "f:1:a:a:1:b:2");
}

#[test]
fn complex_arguments_hash_by_content() {
    let first = json!({"allergies": ["x"], "age": 30});
    let second = json!({"age": 30, "allergies": ["x"]});
    let k1 = KeyArgs::new().arg("recommend").arg(Complex(&first)).key("medicine");
    let k2 = KeyArgs::new().arg("recommend").arg(Complex(&second)).key("medicine");
    assert_eq!(k1, k2);
    assert!(matches!(Complex(&first).to_key_arg(), KeyArg::Complex(_)));
}

#[cfg(feature = "cache-redis")]
#[test]
fn unreachable_store_degrades_to_miss() {
    let settings = CacheSettings {
        backend: CacheBackendKind::Redis,
        host: "127.0.0.1".into(),
        port: 1,
        connect_timeout_ms: 50,
        ..Default::default()
    };
    let cache = CacheLayer::from_settings(&settings);
    assert_eq!(cache.get("never-written"), None);
    assert!(!cache.set("k", &json!({"v": 1}), None));
    assert_eq!(cache.get("k"), None);
    assert!(!cache.delete("k"));
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Scored { label: String, score: f32 }

struct Query { text: String, top: usize }

impl ToKeyArgs for Query {
    fn key_args(&self) -> KeyArgs { KeyArgs::new().arg(&self.text).kwarg("top", self.top) }
}

#[test]
fn memoized_calls_hit_until_expiry() {
    let clock = ManualClock::new();
    let cache = Arc::new(CacheLayer::new(MemoryBackend::with_clock(clock.clone()), Duration::from_secs(60)));
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let classify = cache.memoize("classify", None, move |q: &Query| {
        seen.fetch_add(1, Ordering::SeqCst);
        Ok::<_, anyhow::Error>(vec![Scored { label: q.text.to_uppercase(), score: q.top as f32 }])
    });

    let q = Query { text: "calm".into(), top: 1 };
    let first = classify.call(&q).unwrap();
    let second = classify.call(&q).unwrap();
    assert_eq!(first, second);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    classify.call(&Query { text: "calm".into(), top: 2 }).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    clock.advance(Duration::from_secs(61));
    classify.call(&q).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn memoized_errors_are_recomputed() {
    let cache = Arc::new(CacheLayer::new(MemoryBackend::new(), Duration::from_secs(60)));
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let flaky = cache.memoize("flaky", None, move |_: &str| {
        let n = seen.fetch_add(1, Ordering::SeqCst);
        if n == 0 { Err("transient") } else { Ok(n) }
    });
    assert!(flaky.call("x").is_err());
    assert_eq!(flaky.call("x"), Ok(1));
    assert_eq!(flaky.call("x"), Ok(1));
}
