use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::metrics::Metrics;

// ============================================================================
// Circuit Breaker Pattern Implementation
// ============================================================================
//
// Guards the topic publisher. When the broker is down every publish would
// otherwise wait out the full delivery timeout; once the circuit opens the
// rest of the sweep fails immediately and the next sweep tries again after
// the cool-down.
//
// States:
// - Closed: Normal operation, calls pass through
// - Open: Too many consecutive failures, calls rejected immediately
// - HalfOpen: Cool-down elapsed, trial calls allowed
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    fn code(self) -> i64 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }

    fn label(self) -> &'static str {
        match self {
            CircuitState::Closed => "Closed",
            CircuitState::Open => "Open",
            CircuitState::HalfOpen => "HalfOpen",
        }
    }
}

#[derive(Clone, Debug)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening
    pub failure_threshold: u32,
    /// Time spent open before allowing a trial call
    pub cool_down: Duration,
    /// Trial successes needed to close again
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cool_down: Duration::from_secs(30),
            success_threshold: 3,
        }
    }
}

struct Counters {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    opened_at: Option<Instant>,
}

#[derive(Clone)]
pub struct CircuitBreaker {
    counters: Arc<Mutex<Counters>>,
    config: CircuitBreakerConfig,
    metrics: Option<Arc<Metrics>>,
}

#[derive(Debug)]
pub enum CircuitBreakerError<E> {
    CircuitOpen,
    OperationFailed(E),
}

impl<E: std::fmt::Display> std::fmt::Display for CircuitBreakerError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitBreakerError::CircuitOpen => write!(f, "circuit breaker is open"),
            CircuitBreakerError::OperationFailed(e) => write!(f, "{}", e),
        }
    }
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            counters: Arc::new(Mutex::new(Counters {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                opened_at: None,
            })),
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run `operation` unless the circuit is open.
    pub async fn call<F, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: std::future::Future<Output = Result<T, E>>,
    {
        self.admit()?;

        match operation.await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(CircuitBreakerError::OperationFailed(err))
            }
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Counters> {
        // A panic while holding the lock leaves plain counters behind
        self.counters.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn admit<E>(&self) -> Result<(), CircuitBreakerError<E>> {
        let mut counters = self.lock();

        if counters.state == CircuitState::Open {
            let cooled = counters
                .opened_at
                .map_or(true, |opened| opened.elapsed() >= self.config.cool_down);
            if !cooled {
                return Err(CircuitBreakerError::CircuitOpen);
            }
            counters.success_count = 0;
            self.transition(&mut counters, CircuitState::HalfOpen);
        }

        Ok(())
    }

    fn record_success(&self) {
        let mut counters = self.lock();

        match counters.state {
            CircuitState::HalfOpen => {
                counters.success_count += 1;
                if counters.success_count >= self.config.success_threshold {
                    counters.failure_count = 0;
                    counters.success_count = 0;
                    counters.opened_at = None;
                    self.transition(&mut counters, CircuitState::Closed);
                }
            }
            CircuitState::Closed => counters.failure_count = 0,
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self) {
        let mut counters = self.lock();
        counters.failure_count += 1;

        match counters.state {
            CircuitState::Closed if counters.failure_count >= self.config.failure_threshold => {
                counters.opened_at = Some(Instant::now());
                self.transition(&mut counters, CircuitState::Open);
            }
            CircuitState::HalfOpen => {
                counters.success_count = 0;
                counters.opened_at = Some(Instant::now());
                self.transition(&mut counters, CircuitState::Open);
            }
            _ => {}
        }
    }

    fn transition(&self, counters: &mut Counters, to: CircuitState) {
        let from = counters.state;
        counters.state = to;

        match to {
            CircuitState::Open => tracing::warn!(
                failures = counters.failure_count,
                "⚡ Publisher circuit breaker opened"
            ),
            _ => tracing::info!(from = from.label(), to = to.label(), "Publisher circuit breaker transition"),
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_circuit_transition(from.label(), to.label(), to.code());
        }
    }
}
