//! Exchange writer: relay → exchange.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, trace, warn};

use super::{ConnectionHealth, Health, WorkerHandle};
use crate::config::RelayConfig;
use crate::control::{control_channel, done_channel, ControlReceiver, DoneSender};
use crate::event::Event;
use crate::exchange::{self, ExchangeConnection, ExchangeConnector};
use crate::relay::RelayReceiver;
use crate::utils::retry::reconnect_forever;

/// Takes events from the relay and publishes them to the exchange.
///
/// A failed publish inhibits the writer. The event that failed is held and
/// published first once the exchange is back; until then the writer takes
/// nothing from the relay, which in turn keeps the reader from popping.
pub struct ExchangeWriter<C: ExchangeConnector> {
    connector: Arc<C>,
    health: Health<C::Connection>,
    timing: RelayConfig,
    status: watch::Sender<ConnectionHealth>,
    held: Option<Event>,
}

impl<C: ExchangeConnector> ExchangeWriter<C> {
    /// Connect to the exchange and declare it. Failing at startup is fatal.
    pub async fn connect(connector: C, timing: RelayConfig) -> exchange::Result<Self> {
        let connection = connector.connect().await?;
        let (status, _) = watch::channel(ConnectionHealth::Active);

        Ok(Self {
            connector: Arc::new(connector),
            health: Health::Active(connection),
            timing,
            status,
            held: None,
        })
    }

    /// Run the writer on its own task.
    pub fn spawn(self, relay: RelayReceiver) -> WorkerHandle {
        let (control_tx, control_rx) = control_channel();
        let (done_tx, done_rx) = done_channel();
        let health = self.status.subscribe();

        let task = tokio::spawn(self.run(relay, control_rx, done_tx));

        WorkerHandle::new("writer", control_tx, done_rx, health, task)
    }

    /// Writer loop. Sends exactly one Done after Cleanup has been processed.
    pub async fn run(
        mut self,
        mut relay: RelayReceiver,
        mut control: ControlReceiver,
        done: DoneSender,
    ) {
        info!(endpoint = %self.connector.endpoint(), "Exchange writer started");

        loop {
            if control.pending() {
                break;
            }

            match &mut self.health {
                Health::Active(conn) => {
                    let event = match self.held.take() {
                        Some(event) => event,
                        None => tokio::select! {
                            biased;
                            _ = control.recv() => break,
                            received = relay.recv() => match received {
                                Some(event) => event,
                                // The reader drops its side when it stops.
                                None => {
                                    info!("Reader stopped, waiting for cleanup");
                                    control.recv().await;
                                    break;
                                }
                            },
                        },
                    };

                    match conn.publish(&event).await {
                        Ok(()) => trace!(bytes = event.len(), "Published event"),
                        Err(e) => {
                            warn!(error = %e, bytes = event.len(), "Publish failed, holding event");
                            self.held = Some(event);
                            self.inhibit().await;
                        }
                    }
                }
                Health::Inhibited(reconnect) => {
                    tokio::select! {
                        biased;
                        _ = control.recv() => break,
                        joined = reconnect => self.restore(joined),
                    }
                }
            }
        }

        self.drain(&mut relay).await;
        self.release().await;
        info!("Exchange writer stopped");
        done.ack();
    }

    /// Publish whatever is still in hand at shutdown, if the exchange is up.
    async fn drain(&mut self, relay: &mut RelayReceiver) {
        let pending: Vec<Event> = self
            .held
            .take()
            .into_iter()
            .chain(relay.take_delivered())
            .collect();
        if pending.is_empty() {
            return;
        }

        match &mut self.health {
            Health::Active(conn) => {
                for event in pending {
                    match conn.publish(&event).await {
                        Ok(()) => debug!(bytes = event.len(), "Published event during shutdown"),
                        Err(e) => {
                            error!(error = %e, bytes = event.len(), "Publish failed during shutdown, event dropped")
                        }
                    }
                }
            }
            Health::Inhibited(_) => {
                error!(
                    count = pending.len(),
                    "Exchange unavailable at shutdown, undelivered events dropped"
                );
            }
        }
    }

    /// Close the broken connection and start reconnecting.
    async fn inhibit(&mut self) {
        if let Health::Active(conn) = &mut self.health {
            if let Err(e) = conn.close().await {
                debug!(error = %e, "Failed to close exchange connection");
            }
        }

        self.health = Health::Inhibited(self.spawn_reconnect());
        self.status.send_replace(ConnectionHealth::Inhibited);
        warn!("Exchange inhibited, not publishing any new events");
    }

    fn restore(&mut self, joined: Result<C::Connection, JoinError>) {
        match joined {
            Ok(conn) => {
                self.health = Health::Active(conn);
                self.status.send_replace(ConnectionHealth::Active);
                info!(endpoint = %self.connector.endpoint(), "Exchange uninhibited, publishing events again");
            }
            Err(e) => {
                error!(error = %e, "Exchange reconnect task failed, restarting it");
                self.health = Health::Inhibited(self.spawn_reconnect());
            }
        }
    }

    fn spawn_reconnect(&self) -> JoinHandle<C::Connection> {
        let connector = Arc::clone(&self.connector);
        let delay = self.timing.reconnect_delay();

        tokio::spawn(async move {
            let endpoint = connector.endpoint();
            reconnect_forever(&endpoint, delay, || connector.connect()).await
        })
    }

    async fn release(&mut self) {
        match &mut self.health {
            Health::Active(conn) => {
                if let Err(e) = conn.close().await {
                    warn!(error = %e, "Failed to close exchange connection");
                }
            }
            Health::Inhibited(reconnect) => {
                reconnect.abort();
                if let Ok(mut conn) = reconnect.await {
                    if let Err(e) = conn.close().await {
                        warn!(error = %e, "Failed to close exchange connection");
                    }
                }
            }
        }
    }
}
