use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::Message;
use std::sync::Arc;
use std::time::Duration;

use super::{EventPublisher, MessageSource, TopicMessage, TransportError};
use crate::metrics::Metrics;
use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};

const SEND_TIMEOUT: Duration = Duration::from_secs(5);
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Kafka Publisher
// ============================================================================

pub struct KafkaPublisher {
    producer: FutureProducer,
    topic: String,
    circuit_breaker: CircuitBreaker,
}

impl KafkaPublisher {
    pub fn new(brokers: &str, topic: &str, metrics: Arc<Metrics>) -> Result<Self, TransportError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .set("acks", "1")
            .create()
            .map_err(|e| TransportError::Setup(e.to_string()))?;

        let circuit_breaker = CircuitBreaker::new(CircuitBreakerConfig::default()).with_metrics(metrics);

        tracing::info!(brokers = %brokers, topic = %topic, "Kafka producer created");

        Ok(Self {
            producer,
            topic: topic.to_string(),
            circuit_breaker,
        })
    }
}

#[async_trait]
impl EventPublisher for KafkaPublisher {
    async fn publish(&self, key: &str, payload: &[u8]) -> Result<(), TransportError> {
        let result = self
            .circuit_breaker
            .call(async {
                let record = FutureRecord::to(&self.topic).key(key).payload(payload);

                self.producer
                    .send(record, Timeout::After(SEND_TIMEOUT))
                    .await
                    .map(|_| ())
                    .map_err(|(e, _)| e.to_string())
            })
            .await;

        match result {
            Ok(()) => {
                tracing::debug!(topic = %self.topic, key = %key, "Published to Kafka");
                Ok(())
            }
            Err(CircuitBreakerError::CircuitOpen) => Err(TransportError::CircuitOpen {
                key: key.to_string(),
            }),
            Err(CircuitBreakerError::OperationFailed(message)) => Err(TransportError::Publish {
                key: key.to_string(),
                message,
            }),
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        let producer = self.producer.clone();

        // flush blocks the calling thread until delivery reports arrive
        tokio::task::spawn_blocking(move || producer.flush(Timeout::After(FLUSH_TIMEOUT)))
            .await
            .map_err(|e| TransportError::Close(e.to_string()))?
            .map_err(|e| TransportError::Close(e.to_string()))?;

        tracing::info!(topic = %self.topic, "Kafka producer flushed");
        Ok(())
    }
}

// ============================================================================
// Kafka Source
// ============================================================================

pub struct KafkaSource {
    consumer: Arc<StreamConsumer>,
    topic: String,
}

impl KafkaSource {
    pub fn new(brokers: &str, topic: &str, group_id: &str) -> Result<Self, TransportError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "true")
            .set("auto.commit.interval.ms", "1000")
            .set("auto.offset.reset", "latest")
            .create()
            .map_err(|e| TransportError::Setup(e.to_string()))?;

        consumer
            .subscribe(&[topic])
            .map_err(|e| TransportError::Setup(e.to_string()))?;

        tracing::info!(
            brokers = %brokers,
            topic = %topic,
            group_id = %group_id,
            "Kafka consumer subscribed"
        );

        Ok(Self {
            consumer: Arc::new(consumer),
            topic: topic.to_string(),
        })
    }
}

#[async_trait]
impl MessageSource for KafkaSource {
    async fn read(&self) -> Result<TopicMessage, TransportError> {
        let message = self
            .consumer
            .recv()
            .await
            .map_err(|e| TransportError::Read(e.to_string()))?;

        Ok(TopicMessage {
            key: message.key().map(|k| k.to_vec()),
            payload: message.payload().unwrap_or_default().to_vec(),
            partition: message.partition(),
            offset: message.offset(),
        })
    }

    /// Commit the offsets consumed so far, then leave the group.
    ///
    /// A failed commit is logged and does not fail the close; auto-commit
    /// will have covered everything up to its last interval.
    async fn close(&self) -> Result<(), TransportError> {
        let consumer = self.consumer.clone();

        // Sync commit blocks the calling thread until the broker acks
        let committed =
            tokio::task::spawn_blocking(move || consumer.commit_consumer_state(CommitMode::Sync))
                .await
                .map_err(|e| TransportError::Close(e.to_string()))?;

        match committed {
            Ok(()) => tracing::debug!(topic = %self.topic, "Kafka consumer offsets committed"),
            Err(e) if nothing_to_commit(&e) => {
                tracing::debug!(topic = %self.topic, "No consumed offsets to commit")
            }
            Err(e) => tracing::warn!(
                topic = %self.topic,
                error = %e,
                "⚠️  Failed to commit consumer offsets on close"
            ),
        }

        self.consumer.unsubscribe();
        tracing::info!(topic = %self.topic, "Kafka consumer unsubscribed");
        Ok(())
    }
}

/// Commit failures that only mean no message was consumed since the last commit.
fn nothing_to_commit(err: &KafkaError) -> bool {
    matches!(err, KafkaError::ConsumerCommit(RDKafkaErrorCode::NoOffset))
}
