// ============================================================================
// Messaging - Topic transport seams
// ============================================================================
//
// The replication loops only see these traits. `kafka` provides the real
// rdkafka-backed implementations; tests plug in scripted doubles.
//
// ============================================================================

mod kafka;

use async_trait::async_trait;
use thiserror::Error;

pub use kafka::{KafkaPublisher, KafkaSource};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to create kafka client: {0}")]
    Setup(String),

    #[error("publish failed for key {key}: {message}")]
    Publish { key: String, message: String },

    #[error("circuit breaker open, publish skipped for key {key}")]
    CircuitOpen { key: String },

    #[error("read failed: {0}")]
    Read(String),

    #[error("failed to close transport: {0}")]
    Close(String),
}

/// One record read from the topic, detached from the client's buffers.
#[derive(Debug, Clone)]
pub struct TopicMessage {
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
    pub partition: i32,
    pub offset: i64,
}

/// Writing side of the topic.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish one payload under `key` so that all snapshots of the same
    /// event share a partition.
    async fn publish(&self, key: &str, payload: &[u8]) -> Result<(), TransportError>;

    /// Flush and release the writer. Called at most once.
    async fn close(&self) -> Result<(), TransportError>;
}

/// Reading side of the topic.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Wait for the next message. Callers bound this with their own timeout.
    async fn read(&self) -> Result<TopicMessage, TransportError>;

    /// Leave the group and release the reader. Called at most once.
    async fn close(&self) -> Result<(), TransportError>;
}
