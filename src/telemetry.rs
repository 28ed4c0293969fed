use std::future::Future;
use thiserror::Error;
use tracing::instrument::{WithDispatch, WithSubscriber};
use tracing::Dispatch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ============================================================================
// Logger - explicitly constructed tracing dispatcher
// ============================================================================
//
// No global subscriber is installed. The coordinator builds one Logger and
// hands clones to every component; each component runs its tasks (and the
// HTTP workers run each request) with this dispatcher attached.
//
// ============================================================================

#[derive(Debug, Error)]
#[error("invalid log level {level:?}: {source}")]
pub struct LoggerError {
    level: String,
    #[source]
    source: tracing_subscriber::filter::ParseError,
}

#[derive(Clone)]
pub struct Logger {
    dispatch: Dispatch,
}

impl Logger {
    /// JSON logger filtered at `level`. `RUST_LOG`, when set, wins.
    pub fn new(level: &str) -> Result<Self, LoggerError> {
        let filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(level).map_err(|source| LoggerError {
                level: level.to_string(),
                source,
            })?,
        };

        let subscriber = tracing_subscriber::registry()
            .with(fmt::layer().json().with_target(true).with_thread_ids(true))
            .with(filter);

        Ok(Self {
            dispatch: Dispatch::new(subscriber),
        })
    }

    /// Discards everything.
    #[cfg(test)]
    pub fn silent() -> Self {
        Self {
            dispatch: Dispatch::none(),
        }
    }

    /// Run `future` with this logger as its dispatcher.
    pub fn attach<F: Future>(&self, future: F) -> WithDispatch<F> {
        future.with_subscriber(self.dispatch.clone())
    }

    /// Run a synchronous section with this logger as its dispatcher.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }
}
