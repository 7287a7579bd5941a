//! A minimal circuit breaker, trimmed to what the Capability Provider's
//! "injected circuit breaker" resilience layer needs (§4.2 layer 2):
//! consecutive-failure based trip, a cooldown before half-open probing, and
//! half-open recovery on consecutive successes.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub open_duration: Duration,
    pub half_open_max_requests: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            open_duration: Duration::from_secs(30),
            half_open_max_requests: 3,
        }
    }
}

pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: RwLock<CircuitState>,
    consecutive_failures: AtomicU32,
    consecutive_successes: AtomicU32,
    half_open_inflight: AtomicU32,
    opened_at: RwLock<Option<Instant>>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    #[error("circuit breaker open")]
    Open,
    #[error(transparent)]
    Inner(#[from] E),
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            state: RwLock::new(CircuitState::Closed),
            consecutive_failures: AtomicU32::new(0),
            consecutive_successes: AtomicU32::new(0),
            half_open_inflight: AtomicU32::new(0),
            opened_at: RwLock::new(None),
        })
    }

    pub async fn state(&self) -> CircuitState {
        self.maybe_transition_to_half_open().await;
        *self.state.read().await
    }

    async fn maybe_transition_to_half_open(&self) {
        let mut state = self.state.write().await;
        if *state == CircuitState::Open {
            if let Some(opened_at) = *self.opened_at.read().await {
                if opened_at.elapsed() >= self.config.open_duration {
                    *state = CircuitState::HalfOpen;
                    self.half_open_inflight.store(0, Ordering::SeqCst);
                    self.consecutive_successes.store(0, Ordering::SeqCst);
                }
            }
        }
    }

    /// Runs `f` if the circuit allows it, recording the outcome. Returns
    /// [`CircuitBreakerError::Open`] without calling `f` if the circuit is open
    /// or the half-open probe quota is exhausted.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        let state = self.state().await;
        match state {
            CircuitState::Open => return Err(CircuitBreakerError::Open),
            CircuitState::HalfOpen => {
                let inflight = self.half_open_inflight.fetch_add(1, Ordering::SeqCst);
                if inflight >= self.config.half_open_max_requests {
                    self.half_open_inflight.fetch_sub(1, Ordering::SeqCst);
                    return Err(CircuitBreakerError::Open);
                }
            }
            CircuitState::Closed => {}
        }

        match f().await {
            Ok(value) => {
                self.on_success().await;
                Ok(value)
            }
            Err(err) => {
                self.on_failure().await;
                Err(CircuitBreakerError::Inner(err))
            }
        }
    }

    async fn on_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        let mut state = self.state.write().await;
        if *state == CircuitState::HalfOpen {
            let successes = self.consecutive_successes.fetch_add(1, Ordering::SeqCst) + 1;
            if successes >= self.config.success_threshold {
                *state = CircuitState::Closed;
            }
        }
    }

    async fn on_failure(&self) {
        let mut state = self.state.write().await;
        match *state {
            CircuitState::HalfOpen => {
                *state = CircuitState::Open;
                *self.opened_at.write().await = Some(Instant::now());
            }
            CircuitState::Closed => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                if failures >= self.config.failure_threshold {
                    *state = CircuitState::Open;
                    *self.opened_at.write().await = Some(Instant::now());
                }
            }
            CircuitState::Open => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_after_consecutive_failures() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 2,
            ..Default::default()
        });
        for _ in 0..2 {
            let _ = cb.call(|| async { Err::<(), &str>("boom") }).await;
        }
        assert_eq!(cb.state().await, CircuitState::Open);
        let result = cb.call(|| async { Ok::<_, &str>(()) }).await;
        assert!(matches!(result, Err(CircuitBreakerError::Open)));
    }

    #[tokio::test]
    async fn half_open_closes_after_success_threshold() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            success_threshold: 1,
            open_duration: Duration::from_millis(1),
            ..Default::default()
        });
        let _ = cb.call(|| async { Err::<(), &str>("boom") }).await;
        assert_eq!(cb.state().await, CircuitState::Open);
        tokio::time::sleep(Duration::from_millis(5)).await;
        let result = cb.call(|| async { Ok::<_, &str>(()) }).await;
        assert!(result.is_ok());
        assert_eq!(cb.state().await, CircuitState::Closed);
    }
}
