//! Startup wiring.
//!
//! Both endpoints are connected once, with no retry: if either is unreachable
//! at startup the pipe does not start. Only after both connections exist are
//! the relay created and the workers spawned.

use tracing::info;

use crate::config::{ConfigError, RelayConfig};
use crate::exchange::{ExchangeConnector, ExchangeError};
use crate::queue::{QueueConnector, QueueError};
use crate::relay;
use crate::shutdown::Coordinator;
use crate::worker::{ExchangeWriter, QueueReader};

/// Result type for startup.
pub type Result<T> = std::result::Result<T, PipeError>;

/// Anything that keeps the pipe from starting.
#[derive(Debug, thiserror::Error)]
pub enum PipeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Source queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),
}

/// Connect both endpoints and start relaying.
///
/// Returns the coordinator that owns the running workers.
pub async fn start<Q, X>(queue: Q, exchange: X, timing: RelayConfig) -> Result<Coordinator>
where
    Q: QueueConnector,
    X: ExchangeConnector,
{
    let queue_endpoint = queue.endpoint();
    let exchange_endpoint = exchange.endpoint();

    let reader = QueueReader::connect(queue, timing.clone()).await?;
    let writer = ExchangeWriter::connect(exchange, timing).await?;

    let (relay_tx, relay_rx) = relay::channel();
    let writer = writer.spawn(relay_rx);
    let reader = reader.spawn(relay_tx);

    info!(
        queue = %queue_endpoint,
        exchange = %exchange_endpoint,
        "Pipe started"
    );
    Ok(Coordinator::new(reader, writer))
}

/// Start a Redis → AMQP pipe from configuration.
#[cfg(all(feature = "redis", feature = "amqp"))]
pub async fn start_from_config(config: &crate::config::Config) -> Result<Coordinator> {
    use crate::exchange::AmqpExchange;
    use crate::queue::RedisQueue;

    let queue = RedisQueue::new(config.redis.clone())?;
    let exchange = AmqpExchange::new(config.amqp.clone());

    start(queue, exchange, config.relay.clone()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::MockExchange;
    use crate::queue::MockQueue;
    use crate::worker::test_support::fast_timing;

    #[tokio::test]
    async fn test_unreachable_queue_is_fatal() {
        let queue = MockQueue::new();
        let exchange = MockExchange::new();
        queue.set_reachable(false);

        let result = start(queue.clone(), exchange.clone(), fast_timing()).await;

        assert!(matches!(result, Err(PipeError::Queue(_))));
        assert_eq!(queue.connect_attempts(), 1);
        assert_eq!(exchange.connect_attempts(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_exchange_is_fatal() {
        let queue = MockQueue::new();
        let exchange = MockExchange::new();
        exchange.set_reachable(false);

        let result = start(queue.clone(), exchange.clone(), fast_timing()).await;

        assert!(matches!(result, Err(PipeError::Exchange(_))));
        assert_eq!(exchange.connect_attempts(), 1);
        assert_eq!(queue.live_connections(), 0);
        assert_eq!(queue.pop_count(), 0);
    }
}
