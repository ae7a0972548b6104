//! Prometheus counters shared by the registry, cache and endpoint handlers.

use once_cell::sync::Lazy;
use prometheus::{IntCounterVec, Opts};

fn counter_vec(name: &str, help: &str, labels: &[&str]) -> IntCounterVec {
    let vec = IntCounterVec::new(Opts::new(name, help), labels).expect("static metric definition");
    if let Err(e) = prometheus::default_registry().register(Box::new(vec.clone())) {
        tracing::debug!(metric = name, error = %e, "metric already registered");
    }
    vec
}

pub static CACHE_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    counter_vec("vdoc_cache_requests_total", "Cache operations by outcome", &["op", "outcome"])
});

pub static REGISTRY_LOADS: Lazy<IntCounterVec> = Lazy::new(|| {
    counter_vec("vdoc_registry_loads_total", "Artifact load attempts by outcome", &["name", "outcome"])
});

pub static ENDPOINT_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    counter_vec("vdoc_endpoint_requests_total", "Endpoint calls by outcome", &["endpoint", "outcome"])
});

pub fn cache_op(op: &str, outcome: &str) { CACHE_REQUESTS.with_label_values(&[op, outcome]).inc(); }
pub fn registry_load(name: &str, outcome: &str) { REGISTRY_LOADS.with_label_values(&[name, outcome]).inc(); }
pub fn endpoint(endpoint: &str, outcome: &str) { ENDPOINT_REQUESTS.with_label_values(&[endpoint, outcome]).inc(); }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_gather() {
        cache_op("get", "hit");
        let names: Vec<String> = prometheus::gather().iter().map(|f| f.get_name().to_string()).collect();
        assert!(names.iter().any(|n| n == "vdoc_cache_requests_total"));
    }
}
