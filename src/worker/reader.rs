//! Queue reader: source queue → relay.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, trace, warn};

use super::{ConnectionHealth, Health, WorkerHandle};
use crate::config::RelayConfig;
use crate::control::{control_channel, done_channel, ControlReceiver, DoneSender};
use crate::event::Event;
use crate::queue::{self, QueueConnection, QueueConnector};
use crate::relay::{RelayClosed, RelaySender};
use crate::utils::retry::reconnect_forever;

/// Outcome of handing one event to the relay.
enum Handoff {
    Delivered,
    /// Cleanup arrived before the writer took the event.
    Cancelled(Event),
    /// The writer side is gone.
    Closed(Event),
}

/// Pulls events off the source queue and hands them to the relay.
///
/// Loop, until Cleanup:
/// - Active: pop; forward an event, sleep on an empty queue. A failed pop is
///   followed by a ping, and only a failed ping inhibits the reader.
/// - Inhibited: no queue operations, just wait for the reconnect task.
pub struct QueueReader<C: QueueConnector> {
    connector: Arc<C>,
    health: Health<C::Connection>,
    timing: RelayConfig,
    status: watch::Sender<ConnectionHealth>,
}

impl<C: QueueConnector> QueueReader<C> {
    /// Connect to the queue. There is no retry here: failing at startup is fatal.
    pub async fn connect(connector: C, timing: RelayConfig) -> queue::Result<Self> {
        let connection = connector.connect().await?;
        let (status, _) = watch::channel(ConnectionHealth::Active);

        Ok(Self {
            connector: Arc::new(connector),
            health: Health::Active(connection),
            timing,
            status,
        })
    }

    /// Run the reader on its own task.
    pub fn spawn(self, relay: RelaySender) -> WorkerHandle {
        let (control_tx, control_rx) = control_channel();
        let (done_tx, done_rx) = done_channel();
        let health = self.status.subscribe();

        let task = tokio::spawn(self.run(relay, control_rx, done_tx));

        WorkerHandle::new("reader", control_tx, done_rx, health, task)
    }

    /// Reader loop. Sends exactly one Done after Cleanup has been processed.
    pub async fn run(
        mut self,
        mut relay: RelaySender,
        mut control: ControlReceiver,
        done: DoneSender,
    ) {
        info!(endpoint = %self.connector.endpoint(), "Queue reader started");

        loop {
            if control.pending() {
                break;
            }

            match &mut self.health {
                Health::Active(conn) => match conn.pop().await {
                    Ok(Some(event)) => {
                        trace!(bytes = event.len(), "Popped event");
                        match handoff(&mut relay, &mut control, event).await {
                            Handoff::Delivered => {}
                            Handoff::Cancelled(event) => {
                                requeue(conn, event).await;
                                break;
                            }
                            Handoff::Closed(event) => {
                                error!("Relay closed, nothing is publishing events");
                                requeue(conn, event).await;
                                control.recv().await;
                                break;
                            }
                        }
                    }
                    Ok(None) => {
                        if !conn.waits_for_events()
                            && control.idle(self.timing.poll_interval()).await
                        {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!(error = %e, "Pop failed, probing queue");
                        if let Err(e) = conn.ping().await {
                            warn!(error = %e, "Queue did not respond to ping");
                            self.inhibit().await;
                        }
                        if control.idle(self.timing.poll_interval()).await {
                            break;
                        }
                    }
                },
                Health::Inhibited(reconnect) => {
                    tokio::select! {
                        biased;
                        _ = control.recv() => break,
                        joined = reconnect => self.restore(joined),
                    }
                }
            }
        }

        self.release().await;
        info!("Queue reader stopped");
        done.ack();
    }

    /// Close the broken connection and start reconnecting.
    async fn inhibit(&mut self) {
        if let Health::Active(conn) = &mut self.health {
            if let Err(e) = conn.close().await {
                warn!(error = %e, "Failed to close queue connection");
            }
        }

        self.health = Health::Inhibited(self.spawn_reconnect());
        self.status.send_replace(ConnectionHealth::Inhibited);
        warn!("Queue inhibited, not reading any new events");
    }

    fn restore(&mut self, joined: Result<C::Connection, JoinError>) {
        match joined {
            Ok(conn) => {
                self.health = Health::Active(conn);
                self.status.send_replace(ConnectionHealth::Active);
                info!(endpoint = %self.connector.endpoint(), "Queue uninhibited, reading events again");
            }
            Err(e) => {
                error!(error = %e, "Queue reconnect task failed, restarting it");
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

    /// Drop out of either state, leaving no connection and no task behind.
    async fn release(&mut self) {
        match &mut self.health {
            Health::Active(conn) => {
                if let Err(e) = conn.close().await {
                    warn!(error = %e, "Failed to close queue connection");
                }
            }
            Health::Inhibited(reconnect) => {
                reconnect.abort();
                // The task may have finished just before the abort.
                if let Ok(mut conn) = reconnect.await {
                    if let Err(e) = conn.close().await {
                        warn!(error = %e, "Failed to close queue connection");
                    }
                }
            }
        }
    }
}

/// Wait for the writer to take `event`, unless Cleanup comes first.
async fn handoff(relay: &mut RelaySender, control: &mut ControlReceiver, event: Event) -> Handoff {
    let mut event = event;
    loop {
        let reserved = tokio::select! {
            biased;
            _ = control.recv() => return Handoff::Cancelled(event),
            reserved = relay.reserve() => reserved,
        };

        match reserved {
            Ok(slot) => match slot.deliver(event) {
                Ok(()) => return Handoff::Delivered,
                Err(returned) => event = returned,
            },
            Err(RelayClosed) => return Handoff::Closed(event),
        }
    }
}

/// Put a popped but undelivered event back at the head of the queue.
async fn requeue<Q: QueueConnection>(conn: &mut Q, event: Event) {
    let bytes = event.len();
    match conn.requeue(event).await {
        Ok(()) => info!(bytes, "Returned undelivered event to the queue"),
        Err(e) => error!(error = %e, bytes, "Failed to return undelivered event, event lost"),
    }
}
