// Private module declaration
mod server;

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};

// Re-export for public API
pub use server::configure;

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Covers:
// - Replication producer ticks and per-event publish outcomes
// - Topic consumer reads, drops and transport errors
// - Circuit breaker state guarding the publisher
//
// Scraped from GET /metrics on the API server.
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Producer
    pub producer_ticks: IntCounter,
    pub events_published: IntCounter,
    pub publish_failures: IntCounter,
    pub tick_duration: Histogram,

    // Consumer
    pub messages_received: IntCounter,
    pub messages_dropped: IntCounter,
    pub read_errors: IntCounter,

    // Circuit Breaker
    pub circuit_breaker_state: IntGauge,
    pub circuit_breaker_transitions: IntCounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let producer_ticks = IntCounter::new(
            "replication_ticks_total",
            "Total replication sweeps started by the producer",
        )?;
        registry.register(Box::new(producer_ticks.clone()))?;

        let events_published = IntCounter::new(
            "replication_events_published_total",
            "Total event snapshots published to the topic",
        )?;
        registry.register(Box::new(events_published.clone()))?;

        let publish_failures = IntCounter::new(
            "replication_publish_failures_total",
            "Total event snapshots that failed to publish",
        )?;
        registry.register(Box::new(publish_failures.clone()))?;

        let tick_duration = Histogram::with_opts(
            HistogramOpts::new("replication_tick_duration_seconds", "Replication sweep duration")
                .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]),
        )?;
        registry.register(Box::new(tick_duration.clone()))?;

        let messages_received = IntCounter::new(
            "consumer_messages_received_total",
            "Total messages read from the topic",
        )?;
        registry.register(Box::new(messages_received.clone()))?;

        let messages_dropped = IntCounter::new(
            "consumer_messages_dropped_total",
            "Total messages dropped because they could not be decoded",
        )?;
        registry.register(Box::new(messages_dropped.clone()))?;

        let read_errors = IntCounter::new(
            "consumer_read_errors_total",
            "Total failed reads from the topic",
        )?;
        registry.register(Box::new(read_errors.clone()))?;

        let circuit_breaker_state = IntGauge::new(
            "circuit_breaker_state",
            "Publisher circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)",
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        let circuit_breaker_transitions = IntCounterVec::new(
            Opts::new("circuit_breaker_transitions_total", "Circuit breaker state transitions"),
            &["from_state", "to_state"],
        )?;
        registry.register(Box::new(circuit_breaker_transitions.clone()))?;

        Ok(Self {
            registry,
            producer_ticks,
            events_published,
            publish_failures,
            tick_duration,
            messages_received,
            messages_dropped,
            read_errors,
            circuit_breaker_state,
            circuit_breaker_transitions,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record the outcome of one producer sweep
    pub fn record_tick(&self, published: usize, failed: usize, duration_secs: f64) {
        self.producer_ticks.inc();
        self.events_published.inc_by(published as u64);
        self.publish_failures.inc_by(failed as u64);
        self.tick_duration.observe(duration_secs);
    }

    /// Record a circuit breaker transition and the resulting state
    pub fn record_circuit_transition(&self, from_state: &str, to_state: &str, state_code: i64) {
        self.circuit_breaker_transitions
            .with_label_values(&[from_state, to_state])
            .inc();
        self.circuit_breaker_state.set(state_code);
    }
}
