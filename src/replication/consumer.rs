use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{Lifecycle, ReplicationError};
use crate::messaging::{MessageSource, TopicMessage};
use crate::metrics::Metrics;
use crate::models::EventMessage;
use crate::telemetry::Logger;

// ============================================================================
// Topic Consumer - Reads replicated snapshots and logs them
// ============================================================================
//
// Read loop:
// - each read is bounded by `read_timeout`; an empty timeout just loops
// - a failed read is logged, then the loop backs off before retrying
// - undecodable payloads are logged with offset/partition and dropped
//
// Logging is the only side effect. Nothing is written back to the store.
//
// ============================================================================

const COMPONENT: &str = "topic-consumer";

#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub read_timeout: Duration,
    pub backoff: Duration,
    pub drain_timeout: Duration,
}

pub struct TopicConsumer {
    inner: Arc<Reader>,
    settings: ConsumerSettings,
    lifecycle: Lifecycle,
}

struct Reader {
    source: Arc<dyn MessageSource>,
    metrics: Arc<Metrics>,
    logger: Logger,
}

impl TopicConsumer {
    pub fn new(
        source: Arc<dyn MessageSource>,
        metrics: Arc<Metrics>,
        logger: Logger,
        settings: ConsumerSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Reader {
                source,
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

    pub fn start(&self, shutdown: &CancellationToken) -> Result<(), ReplicationError> {
        let reader = self.inner.clone();
        let settings = self.settings.clone();

        self.lifecycle.start(shutdown, move |token| {
            let logger = reader.logger.clone();
            logger.attach(async move { reader.run(token, settings).await })
        })?;

        self.inner
            .logger
            .in_scope(|| tracing::info!("👂 Topic consumer started"));
        Ok(())
    }

    /// Cancel the read loop and release the reader. Safe to call repeatedly.
    pub async fn stop(&self) -> Result<(), ReplicationError> {
        let source = self.inner.source.clone();
        let result = self
            .inner
            .logger
            .attach(
                self.lifecycle
                    .stop(self.settings.drain_timeout, || async move { source.close().await }),
            )
            .await;

        self.inner.logger.in_scope(|| match &result {
            Ok(()) => tracing::info!("🛑 Topic consumer stopped"),
            Err(e) => tracing::error!(error = %e, "Topic consumer stopped with error"),
        });
        result
    }
}

impl Reader {
    async fn run(&self, token: CancellationToken, settings: ConsumerSettings) {
        loop {
            let read = tokio::select! {
                _ = token.cancelled() => break,
                read = tokio::time::timeout(settings.read_timeout, self.source.read()) => read,
            };

            match read {
                // Quiet topic
                Err(_) => continue,
                Ok(Ok(message)) => {
                    self.metrics.messages_received.inc();
                    self.handle_message(&message);
                }
                Ok(Err(e)) => {
                    self.metrics.read_errors.inc();
                    if token.is_cancelled() {
                        tracing::debug!(error = %e, "Read failed during shutdown");
                        break;
                    }
                    tracing::error!(
                        error = %e,
                        backoff_ms = settings.backoff.as_millis() as u64,
                        "❌ Failed to read from topic"
                    );
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = tokio::time::sleep(settings.backoff) => {}
                    }
                }
            }
        }

        tracing::debug!("Topic consumer loop exited");
    }

    /// Decode and log one message. Returns the decoded snapshot, if any.
    fn handle_message(&self, message: &TopicMessage) -> Option<EventMessage> {
        let mut event: EventMessage = match serde_json::from_slice(&message.payload) {
            Ok(event) => event,
            Err(e) => {
                self.metrics.messages_dropped.inc();
                tracing::warn!(
                    offset = message.offset,
                    partition = message.partition,
                    error = %e,
                    "🗑️  Dropping undecodable message"
                );
                return None;
            }
        };

        event.stamp_if_unsent(Utc::now());
        let sent_at = event.sent_at.unwrap_or_else(Utc::now);

        tracing::info!(
            event_id = %event.id,
            title = %event.title,
            description = %event.description,
            owner_id = %event.owner_id,
            start_time = %event.start_time.to_rfc3339_opts(SecondsFormat::Secs, true),
            end_time = %event.end_time.to_rfc3339_opts(SecondsFormat::Secs, true),
            created_at = %event.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            updated_at = %event.updated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            sent_at = %sent_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            key = %String::from_utf8_lossy(message.key.as_deref().unwrap_or_default()),
            offset = message.offset,
            partition = message.partition,
            "📥 Received event snapshot"
        );
        tracing::info!("{}", summary_line(&event, sent_at));

        Some(event)
    }
}

/// One-line human summary of a received snapshot.
fn summary_line(event: &EventMessage, sent_at: DateTime<Utc>) -> String {
    format!(
        "Event {} \"{}\" ({}) for {} from {} to {} (sent {})",
        event.id,
        event.title,
        event.description,
        event.owner_id,
        event.start_time.format("%Y-%m-%d %H:%M"),
        event.end_time.format("%Y-%m-%d %H:%M"),
        sent_at.format("%Y-%m-%d %H:%M:%S"),
    )
}
