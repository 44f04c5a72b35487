//! Redis list as the source queue.
//!
//! Events are popped from the head of a single list key (`LPOP`, or `BLPOP`
//! when `block_secs` is set). Requeue pushes back onto the head (`LPUSH`), so
//! a requeued event is the next one popped. No other keys are touched.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::{
    aio::MultiplexedConnection, AsyncCommands, Client, ConnectionAddr, ConnectionInfo,
    RedisConnectionInfo, RedisResult,
};
use tracing::{debug, info};

use super::{QueueConnection, QueueConnector, QueueError, Result};
use crate::config::RedisConfig;
use crate::event::Event;

/// Connector for a Redis list queue.
pub struct RedisQueue {
    client: Client,
    config: RedisConfig,
}

impl RedisQueue {
    /// Create a connector. Does not touch the network.
    pub fn new(config: RedisConfig) -> Result<Self> {
        let client = Client::open(connection_info(&config))
            .map_err(|e| QueueError::Connection(format!("Invalid Redis settings: {}", e)))?;

        Ok(Self { client, config })
    }
}

fn connection_info(config: &RedisConfig) -> ConnectionInfo {
    let password = if config.password.is_empty() {
        None
    } else {
        Some(config.password.clone())
    };

    ConnectionInfo {
        addr: ConnectionAddr::Tcp(config.host.clone(), config.port),
        redis: RedisConnectionInfo {
            db: config.database,
            password,
            ..Default::default()
        },
    }
}

/// Bound a Redis call so a dead peer can't hang the reader forever.
async fn within<T>(
    limit: Duration,
    call: impl Future<Output = RedisResult<T>>,
) -> Result<RedisResult<T>> {
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| QueueError::Timeout(limit))
}

#[async_trait]
impl QueueConnector for RedisQueue {
    type Connection = RedisQueueConnection;

    fn endpoint(&self) -> String {
        self.config.address()
    }

    async fn connect(&self) -> Result<RedisQueueConnection> {
        let timeout = self.config.timeout();
        let conn = within(timeout, self.client.get_multiplexed_async_connection())
            .await?
            .map_err(|e| QueueError::Connection(e.to_string()))?;

        let mut connection = RedisQueueConnection {
            conn: Some(conn),
            key: self.config.key.clone(),
            block_secs: self.config.block_secs,
            timeout,
        };

        connection
            .ping()
            .await
            .map_err(|e| QueueError::Connection(e.to_string()))?;

        info!(
            address = %self.config.address(),
            database = self.config.database,
            key = %self.config.key,
            "Connected to Redis"
        );

        Ok(connection)
    }
}

/// One multiplexed Redis connection.
pub struct RedisQueueConnection {
    conn: Option<MultiplexedConnection>,
    key: String,
    block_secs: u64,
    timeout: Duration,
}

impl RedisQueueConnection {
    fn live(&mut self) -> Result<&mut MultiplexedConnection> {
        self.conn
            .as_mut()
            .ok_or_else(|| QueueError::Connection("connection already closed".to_string()))
    }
}

#[async_trait]
impl QueueConnection for RedisQueueConnection {
    async fn pop(&mut self) -> Result<Option<Event>> {
        let key = self.key.clone();
        let block_secs = self.block_secs;
        let timeout = self.timeout;
        let conn = self.live()?;

        let body: Option<Vec<u8>> = if block_secs > 0 {
            let limit = timeout + Duration::from_secs(block_secs);
            let popped: Option<(String, Vec<u8>)> = within(limit, conn.blpop(&key, block_secs as f64))
                .await?
                .map_err(|e| QueueError::Pop(e.to_string()))?;
            popped.map(|(_, body)| body)
        } else {
            within(timeout, conn.lpop(&key, None))
                .await?
                .map_err(|e| QueueError::Pop(e.to_string()))?
        };

        Ok(body.map(Event::from))
    }

    async fn ping(&mut self) -> Result<()> {
        let timeout = self.timeout;
        let conn = self.live()?;

        let _: String = within(timeout, redis::cmd("PING").query_async(conn))
            .await?
            .map_err(|e| QueueError::Ping(e.to_string()))?;

        Ok(())
    }

    async fn requeue(&mut self, event: Event) -> Result<()> {
        let key = self.key.clone();
        let timeout = self.timeout;
        let conn = self.live()?;

        let _: () = within(timeout, conn.lpush(&key, event.body()))
            .await?
            .map_err(|e| QueueError::Requeue(e.to_string()))?;

        debug!(key = %key, bytes = event.len(), "Requeued event");
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        // Multiplexed connections close when the last handle drops.
        if self.conn.take().is_some() {
            debug!(key = %self.key, "Released Redis connection");
        }
        Ok(())
    }

    fn waits_for_events(&self) -> bool {
        self.block_secs > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_info_without_password() {
        let config = RedisConfig::default();
        let info = connection_info(&config);

        assert!(matches!(
            info.addr,
            ConnectionAddr::Tcp(ref host, 6379) if host == "localhost"
        ));
        assert_eq!(info.redis.db, 0);
        assert!(info.redis.password.is_none());
    }

    #[test]
    fn test_connection_info_with_password_and_database() {
        let config = RedisConfig {
            host: "10.1.2.3".to_string(),
            port: 6380,
            password: "p@ss:word/with#chars".to_string(),
            database: 4,
            ..Default::default()
        };
        let info = connection_info(&config);

        assert!(matches!(
            info.addr,
            ConnectionAddr::Tcp(ref host, 6380) if host == "10.1.2.3"
        ));
        assert_eq!(info.redis.db, 4);
        assert_eq!(info.redis.password.as_deref(), Some("p@ss:word/with#chars"));
    }

    #[test]
    fn test_new_does_not_connect() {
        // Nothing listens on this port; creating the connector must still succeed.
        let config = RedisConfig {
            port: 1,
            ..Default::default()
        };
        let queue = RedisQueue::new(config).unwrap();
        assert_eq!(queue.endpoint(), "localhost:1");
    }
}
