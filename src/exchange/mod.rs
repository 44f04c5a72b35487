//! Publish/subscribe exchange the relay forwards events to.
//!
//! This module contains:
//! - `ExchangeConnector` trait: establishes fresh connections and declares the exchange
//! - `ExchangeConnection` trait: publishing over one live connection
//! - Implementations: AMQP (RabbitMQ), Mock

use async_trait::async_trait;

use crate::event::Event;

// Implementation modules
#[cfg(feature = "amqp")]
pub mod amqp;
pub mod mock;

// Re-exports
#[cfg(feature = "amqp")]
pub use amqp::AmqpExchange;
pub use mock::MockExchange;

/// Content type every event is published with.
pub const CONTENT_TYPE: &str = "application/json";

/// Result type for exchange operations.
pub type Result<T> = std::result::Result<T, ExchangeError>;

/// Errors that can occur talking to the exchange.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Exchange declaration failed: {0}")]
    Declare(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Close failed: {0}")]
    Close(String),
}

/// Opens connections to the exchange.
///
/// Every successful connect leaves the exchange declared (fanout, durable,
/// not auto-deleted, not internal), so a connection is ready to publish.
#[async_trait]
pub trait ExchangeConnector: Send + Sync + 'static {
    type Connection: ExchangeConnection;

    /// Human-readable endpoint for logs (e.g. `localhost:5672`).
    fn endpoint(&self) -> String;

    /// Open a new connection and declare the exchange.
    async fn connect(&self) -> Result<Self::Connection>;
}

/// One live connection to the exchange.
#[async_trait]
pub trait ExchangeConnection: Send + 'static {
    /// Publish one event: no routing key, not mandatory, not immediate,
    /// [`CONTENT_TYPE`], body unmodified.
    async fn publish(&mut self, event: &Event) -> Result<()>;

    /// Release the connection.
    async fn close(&mut self) -> Result<()>;
}
