use std::error::Error as StdError;
use thiserror::Error;
use uuid::Uuid;

pub type BoxedError = Box<dyn StdError + Send + Sync>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid event: {0}")]
    Validation(String),

    #[error("event not found: {id}")]
    NotFound { id: Uuid },

    #[error("event already exists: {id}")]
    Conflict { id: Uuid },

    #[error("database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<BoxedError>,
    },
}

impl StoreError {
    pub fn database(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Database {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_database_error_helper() {
        let source = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        let err = StoreError::database("failed to list events", source);

        match err {
            StoreError::Database { message, source } => {
                assert_eq!(message, "failed to list events");
                assert!(source.is_some());
            }
            _ => panic!("Expected Database variant"),
        }
    }

    #[test]
    fn test_error_display_carries_id() {
        let id = Uuid::new_v4();
        assert!(StoreError::NotFound { id }.to_string().contains(&id.to_string()));
        assert!(StoreError::Conflict { id }.to_string().contains(&id.to_string()));
    }
}
