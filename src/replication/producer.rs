use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{interval_at, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{Lifecycle, ReplicationError};
use crate::messaging::EventPublisher;
use crate::metrics::Metrics;
use crate::models::EventMessage;
use crate::store::EventStore;
use crate::telemetry::Logger;

// ============================================================================
// Replication Producer - Periodic full sweep of the store onto the topic
// ============================================================================
//
// Every tick:
// 1. ListAll from the store
// 2. Snapshot each event with sent_at = now
// 3. Publish keyed by event id (same key → same partition → per-event order)
//
// No state is carried between ticks. A failed publish is logged and the
// sweep moves on to the next event.
//
// ============================================================================

const COMPONENT: &str = "replication-producer";

#[derive(Debug, Clone)]
pub struct ProducerSettings {
    pub interval: Duration,
    pub drain_timeout: Duration,
}

/// Outcome of one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub attempted: usize,
    pub published: usize,
    pub failed: usize,
}

pub struct ReplicationProducer {
    inner: Arc<Sweeper>,
    settings: ProducerSettings,
    lifecycle: Lifecycle,
}

struct Sweeper {
    store: Arc<dyn EventStore>,
    publisher: Arc<dyn EventPublisher>,
    metrics: Arc<Metrics>,
    logger: Logger,
}

impl ReplicationProducer {
    pub fn new(
        store: Arc<dyn EventStore>,
        publisher: Arc<dyn EventPublisher>,
        metrics: Arc<Metrics>,
        logger: Logger,
        settings: ProducerSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Sweeper {
                store,
                publisher,
                metrics,
                logger,
            }),
            settings,
            lifecycle: Lifecycle::new(COMPONENT),
        }
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }

    /// Spawn the tick loop. The loop ends when `shutdown` (or `stop`) fires.
    pub fn start(&self, shutdown: &CancellationToken) -> Result<(), ReplicationError> {
        let sweeper = self.inner.clone();
        let period = self.settings.interval;

        self.lifecycle.start(shutdown, move |token| {
            let logger = sweeper.logger.clone();
            logger.attach(async move { sweeper.run(token, period).await })
        })?;

        self.inner.logger.in_scope(|| {
            tracing::info!(
                interval_secs = period.as_secs_f64(),
                "🔄 Replication producer started"
            )
        });
        Ok(())
    }

    /// Cancel the loop, wait for it to drain and flush the publisher.
    ///
    /// Calling this more than once is harmless; the publisher is closed once.
    pub async fn stop(&self) -> Result<(), ReplicationError> {
        let publisher = self.inner.publisher.clone();
        let result = self
            .inner
            .logger
            .attach(
                self.lifecycle
                    .stop(self.settings.drain_timeout, || async move { publisher.close().await }),
            )
            .await;

        self.inner.logger.in_scope(|| match &result {
            Ok(()) => tracing::info!("🛑 Replication producer stopped"),
            Err(e) => tracing::error!(error = %e, "Replication producer stopped with error"),
        });
        result
    }

    /// Run a single sweep outside the loop.
    #[cfg(test)]
    pub async fn sweep_once(&self) -> SweepReport {
        let token = CancellationToken::new();
        self.inner.logger.attach(self.inner.sweep(&token)).await
    }
}

impl Sweeper {
    async fn run(&self, token: CancellationToken, period: Duration) {
        // First sweep happens one full period after start
        let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    self.sweep(&token).await;
                }
            }
        }

        tracing::debug!("Replication producer loop exited");
    }

    async fn sweep(&self, token: &CancellationToken) -> SweepReport {
        let started = Instant::now();
        let mut report = SweepReport::default();

        let events = match self.store.list_all().await {
            Ok(events) => events,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load events for replication");
                self.metrics.record_tick(0, 0, started.elapsed().as_secs_f64());
                return report;
            }
        };

        if events.is_empty() {
            tracing::debug!("No events to replicate");
            self.metrics.record_tick(0, 0, started.elapsed().as_secs_f64());
            return report;
        }

        let sent_at = Utc::now();

        for event in &events {
            if token.is_cancelled() {
                tracing::debug!(
                    remaining = events.len() - report.attempted,
                    "Sweep interrupted by shutdown"
                );
                break;
            }

            report.attempted += 1;
            let key = event.id.to_string();

            let payload = match serde_json::to_vec(&EventMessage::snapshot(event, sent_at)) {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::error!(event_id = %event.id, error = %e, "Failed to encode event snapshot");
                    report.failed += 1;
                    continue;
                }
            };

            match self.publisher.publish(&key, &payload).await {
                Ok(()) => report.published += 1,
                Err(e) => {
                    tracing::warn!(event_id = %event.id, error = %e, "⚠️  Failed to publish event snapshot");
                    report.failed += 1;
                }
            }
        }

        self.metrics.record_tick(
            report.published,
            report.failed,
            started.elapsed().as_secs_f64(),
        );

        tracing::info!(
            total = events.len(),
            published = report.published,
            failed = report.failed,
            "📤 Replication sweep complete"
        );

        report
    }
}
