//! Resilience utilities: a synchronous circuit breaker for calls into external services.
//!
//! The breaker counts consecutive failures. Once the threshold is reached it opens and
//! rejects calls for `open_for`, then lets trial calls through (half-open). A trial
//! success closes it again, a trial failure re-opens it.
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use parking_lot::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ResilienceError { #[error("circuit open")] CircuitOpen }

/// Outcome of [`CircuitBreaker::call`] when the call did not succeed.
#[derive(Debug)]
pub enum CallError<E> {
    /// The breaker was open; the operation was not attempted.
    Rejected(ResilienceError),
    /// The operation ran and failed.
    Failed(E),
}

impl<E: fmt::Display> fmt::Display for CallError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallError::Rejected(e) => write!(f, "{e}"),
            CallError::Failed(e) => write!(f, "{e}"),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for CallError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CallError::Rejected(e) => Some(e),
            CallError::Failed(e) => Some(e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState { Closed, Open, HalfOpen }

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self { BreakerState::Closed => "closed", BreakerState::Open => "open", BreakerState::HalfOpen => "half_open" }
    }
}

#[derive(Debug)]
struct Inner { failures: u32, opened_at: Option<Instant>, half_open: bool }

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    state: Mutex<Inner>,
    failure_threshold: u32,
    open_for: Duration,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, failure_threshold: u32, open_for: Duration) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(Inner { failures: 0, opened_at: None, half_open: false }),
            failure_threshold: failure_threshold.max(1),
            open_for,
        }
    }

    pub fn name(&self) -> &str { &self.name }

    /// Whether a call may proceed right now. Moves an expired open breaker to half-open.
    pub fn allow(&self) -> bool {
        let mut st = self.state.lock();
        match st.opened_at {
            Some(opened) if opened.elapsed() >= self.open_for => {
                debug!(breaker = %self.name, "half-open trial");
                st.opened_at = None;
                st.half_open = true;
                true
            }
            Some(_) => false,
            None => true,
        }
    }

    pub fn record_success(&self) {
        let mut st = self.state.lock();
        if st.half_open { debug!(breaker = %self.name, "circuit closed"); }
        st.failures = 0;
        st.half_open = false;
        st.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut st = self.state.lock();
        st.failures = st.failures.saturating_add(1);
        if st.half_open || st.failures >= self.failure_threshold {
            if st.opened_at.is_none() {
                warn!(breaker = %self.name, failures = st.failures, "circuit opened");
            }
            st.opened_at = Some(Instant::now());
            st.half_open = false;
        }
    }

    pub fn state(&self) -> BreakerState {
        let st = self.state.lock();
        match st.opened_at {
            Some(opened) if opened.elapsed() < self.open_for => BreakerState::Open,
            Some(_) => BreakerState::HalfOpen,
            None if st.half_open => BreakerState::HalfOpen,
            None => BreakerState::Closed,
        }
    }

    /// Run `op` through the breaker, recording its outcome.
    pub fn call<T, E>(&self, op: impl FnOnce() -> Result<T, E>) -> Result<T, CallError<E>> {
        if !self.allow() { return Err(CallError::Rejected(ResilienceError::CircuitOpen)); }
        match op() {
            Ok(v) => { self.record_success(); Ok(v) }
            Err(e) => { self.record_failure(); Err(CallError::Failed(e)) }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold() {
        let cb = CircuitBreaker::new("t", 2, Duration::from_secs(60));
        for _ in 0..2 { let _ = cb.call(|| Err::<(), _>("boom")); }
        assert_eq!(cb.state(), BreakerState::Open);
        let err = cb.call(|| Ok::<_, &str>(1)).unwrap_err();
        assert!(matches!(err, CallError::Rejected(ResilienceError::CircuitOpen)));
        assert_eq!(err.to_string(), "circuit open");
    }

    #[test]
    fn success_resets_failure_count() {
        let cb = CircuitBreaker::new("t", 2, Duration::from_secs(60));
        let _ = cb.call(|| Err::<(), _>("boom"));
        assert!(cb.call(|| Ok::<_, &str>(())).is_ok());
        let _ = cb.call(|| Err::<(), _>("boom"));
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn half_open_trial_closes_on_success() {
        let cb = CircuitBreaker::new("t", 1, Duration::from_millis(5));
        let _ = cb.call(|| Err::<(), _>("boom"));
        assert_eq!(cb.state(), BreakerState::Open);
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(cb.state(), BreakerState::HalfOpen);
        assert!(cb.call(|| Ok::<_, &str>(())).is_ok());
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn half_open_trial_failure_reopens() {
        let cb = CircuitBreaker::new("t", 3, Duration::from_millis(5));
        for _ in 0..3 { let _ = cb.call(|| Err::<(), _>("boom")); }
        std::thread::sleep(Duration::from_millis(10));
        let err = cb.call(|| Err::<(), _>("still down")).unwrap_err();
        assert!(matches!(err, CallError::Failed("still down")));
        assert_eq!(cb.state(), BreakerState::Open);
    }
}
