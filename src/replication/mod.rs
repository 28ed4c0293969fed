// ============================================================================
// Replication - Store → topic → log
// ============================================================================
//
// Two independent background loops:
// - ReplicationProducer: periodic full sweep of the store onto the topic
// - TopicConsumer: reads the topic back and logs every snapshot
//
// Both share the same lifecycle: Idle → Running → Stopping → Idle, gated by
// a mutex around the state. Each run owns one cancellation token, a child of
// the process shutdown token. Stop cancels it, waits for the task to drain
// and closes the transport exactly once.
//
// ============================================================================

mod consumer;
mod producer;

pub use consumer::{ConsumerSettings, TopicConsumer};
pub use producer::{ProducerSettings, ReplicationProducer};

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::messaging::TransportError;

#[derive(Debug, Error)]
pub enum ReplicationError {
    #[error("{component} is already running")]
    AlreadyRunning { component: &'static str },

    #[error("{component} cannot start: its transport has been closed")]
    TransportClosed { component: &'static str },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

enum LoopState {
    Idle,
    Running {
        token: CancellationToken,
        handle: JoinHandle<()>,
    },
    Stopping,
}

/// Start/stop gate shared by both loops.
pub(crate) struct Lifecycle {
    component: &'static str,
    state: Mutex<LoopState>,
    closed: AtomicBool,
}

impl Lifecycle {
    pub(crate) fn new(component: &'static str) -> Self {
        Self {
            component,
            state: Mutex::new(LoopState::Idle),
            closed: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LoopState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[cfg(test)]
    pub(crate) fn is_running(&self) -> bool {
        matches!(*self.lock(), LoopState::Running { .. })
    }

    /// Move Idle → Running, spawning the loop with a fresh child token.
    pub(crate) fn start<F, Fut>(
        &self,
        shutdown: &CancellationToken,
        spawn_loop: F,
    ) -> Result<(), ReplicationError>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut state = self.lock();

        if !matches!(*state, LoopState::Idle) {
            return Err(ReplicationError::AlreadyRunning {
                component: self.component,
            });
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(ReplicationError::TransportClosed {
                component: self.component,
            });
        }

        let token = shutdown.child_token();
        let handle = tokio::spawn(spawn_loop(token.clone()));
        *state = LoopState::Running { token, handle };

        Ok(())
    }

    /// Cancel and drain the running loop, then run `close` if nobody has yet.
    ///
    /// A loop still busy after `drain_timeout` is aborted. Stopping an idle
    /// loop, or racing another stop, returns immediately without closing.
    pub(crate) async fn stop<C, CFut>(
        &self,
        drain_timeout: Duration,
        close: C,
    ) -> Result<(), ReplicationError>
    where
        C: FnOnce() -> CFut,
        CFut: Future<Output = Result<(), TransportError>>,
    {
        let (token, mut handle) = {
            let mut state = self.lock();
            match std::mem::replace(&mut *state, LoopState::Stopping) {
                LoopState::Running { token, handle } => (token, handle),
                LoopState::Idle => {
                    *state = LoopState::Idle;
                    return Ok(());
                }
                LoopState::Stopping => return Ok(()),
            }
        };

        token.cancel();
        match tokio::time::timeout(drain_timeout, &mut handle).await {
            Ok(Ok(())) => tracing::debug!(component = self.component, "Loop drained"),
            Ok(Err(e)) => tracing::error!(component = self.component, error = %e, "Loop task failed"),
            Err(_) => {
                tracing::warn!(
                    component = self.component,
                    timeout_secs = drain_timeout.as_secs_f64(),
                    "⏱️  Loop did not drain in time, aborting"
                );
                handle.abort();
            }
        }

        let result = if self.closed.swap(true, Ordering::SeqCst) {
            Ok(())
        } else {
            close().await.map_err(ReplicationError::from)
        };

        *self.lock() = LoopState::Idle;
        result
    }
}
