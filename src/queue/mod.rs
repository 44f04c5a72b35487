//! Source queue the relay pulls events from.
//!
//! This module contains:
//! - `QueueConnector` trait: establishes fresh connections (startup and reconnects)
//! - `QueueConnection` trait: data and liveness operations on one live connection
//! - Implementations: Redis list, Mock

use async_trait::async_trait;

use crate::event::Event;

// Implementation modules
pub mod mock;
#[cfg(feature = "redis")]
pub mod redis;

// Re-exports
pub use mock::MockQueue;
#[cfg(feature = "redis")]
pub use self::redis::RedisQueue;

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Errors that can occur talking to the source queue.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Pop failed: {0}")]
    Pop(String),

    #[error("Ping failed: {0}")]
    Ping(String),

    #[error("Requeue failed: {0}")]
    Requeue(String),

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Opens connections to the source queue.
///
/// Shared between a reader and its reconnect task, so it must be cheap to
/// call repeatedly and safe to call from another task.
#[async_trait]
pub trait QueueConnector: Send + Sync + 'static {
    type Connection: QueueConnection;

    /// Human-readable endpoint for logs (e.g. `localhost:6379`).
    fn endpoint(&self) -> String;

    /// Open a new connection and verify it answers.
    async fn connect(&self) -> Result<Self::Connection>;
}

/// One live connection to the source queue.
#[async_trait]
pub trait QueueConnection: Send + 'static {
    /// Remove and return the oldest event. `Ok(None)` when the queue is empty.
    async fn pop(&mut self) -> Result<Option<Event>>;

    /// Liveness check.
    async fn ping(&mut self) -> Result<()>;

    /// Put an event back at the head of the queue, so it is the next one popped.
    async fn requeue(&mut self, event: Event) -> Result<()>;

    /// Release the connection.
    async fn close(&mut self) -> Result<()>;

    /// True if `pop` itself waits for events on an empty queue, so callers
    /// don't need to sleep between empty pops.
    fn waits_for_events(&self) -> bool {
        false
    }
}
