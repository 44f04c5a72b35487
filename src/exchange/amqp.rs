//! AMQP (RabbitMQ) exchange.
//!
//! Publishes to a durable fanout exchange. Every consumer queue bound to the
//! exchange gets a copy of each event; routing keys are ignored.

use async_trait::async_trait;
use lapin::{
    options::{BasicPublishOptions, ExchangeDeclareOptions},
    types::FieldTable,
    uri::AMQPUri,
    BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind,
};
use tracing::{debug, info};

use super::{ExchangeConnection, ExchangeConnector, ExchangeError, Result, CONTENT_TYPE};
use crate::config::AmqpConfig;
use crate::event::Event;

/// AMQP reply code for a normal close.
const REPLY_SUCCESS: u16 = 200;

/// Connector for an AMQP fanout exchange.
pub struct AmqpExchange {
    config: AmqpConfig,
}

impl AmqpExchange {
    pub fn new(config: AmqpConfig) -> Self {
        Self { config }
    }

    fn uri(&self) -> AMQPUri {
        let mut uri = AMQPUri::default();
        uri.authority.userinfo.username = self.config.username.clone();
        uri.authority.userinfo.password = self.config.password.clone();
        uri.authority.host = self.config.host.clone();
        uri.authority.port = self.config.port;
        uri
    }
}

#[async_trait]
impl ExchangeConnector for AmqpExchange {
    type Connection = AmqpExchangeConnection;

    fn endpoint(&self) -> String {
        self.config.address()
    }

    async fn connect(&self) -> Result<AmqpExchangeConnection> {
        let properties =
            ConnectionProperties::default().with_connection_name(self.config.name.clone().into());

        let connection = Connection::connect_uri(self.uri(), properties)
            .await
            .map_err(|e| ExchangeError::Connection(e.to_string()))?;

        let channel = match connection.create_channel().await {
            Ok(channel) => channel,
            Err(e) => {
                let _ = connection.close(REPLY_SUCCESS, "channel failed").await;
                return Err(ExchangeError::Connection(format!(
                    "Failed to create channel: {}",
                    e
                )));
            }
        };

        // Idempotent: re-declaring with identical settings is a no-op on the broker.
        let declared = channel
            .exchange_declare(
                &self.config.exchange,
                ExchangeKind::Fanout,
                ExchangeDeclareOptions {
                    durable: true,
                    auto_delete: false,
                    internal: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await;
        if let Err(e) = declared {
            let _ = connection.close(REPLY_SUCCESS, "declare failed").await;
            return Err(ExchangeError::Declare(e.to_string()));
        }

        info!(
            name = %self.config.name,
            address = %self.config.address(),
            exchange = %self.config.exchange,
            "Connected to AMQP"
        );

        Ok(AmqpExchangeConnection {
            connection,
            channel,
            exchange: self.config.exchange.clone(),
            closed: false,
        })
    }
}

/// One AMQP connection with a single channel.
pub struct AmqpExchangeConnection {
    connection: Connection,
    channel: Channel,
    exchange: String,
    closed: bool,
}

#[async_trait]
impl ExchangeConnection for AmqpExchangeConnection {
    async fn publish(&mut self, event: &Event) -> Result<()> {
        if self.closed {
            return Err(ExchangeError::Publish("connection already closed".to_string()));
        }

        let properties = BasicProperties::default().with_content_type(CONTENT_TYPE.into());

        // Empty routing key; mandatory and immediate are both off by default.
        let confirm = self
            .channel
            .basic_publish(
                &self.exchange,
                "",
                BasicPublishOptions::default(),
                event.body(),
                properties,
            )
            .await
            .map_err(|e| ExchangeError::Publish(e.to_string()))?;

        confirm
            .await
            .map_err(|e| ExchangeError::Publish(format!("Publish confirmation failed: {}", e)))?;

        debug!(exchange = %self.exchange, bytes = event.len(), "Published event");
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let channel = self.channel.close(REPLY_SUCCESS, "amqp-pipe closing").await;
        let connection = self
            .connection
            .close(REPLY_SUCCESS, "amqp-pipe closing")
            .await;

        channel
            .and(connection)
            .map_err(|e| ExchangeError::Close(e.to_string()))
    }
}
