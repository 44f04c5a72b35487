//! Long-lived relay workers.
//!
//! - [`QueueReader`]: pops from the source queue, hands events to the relay
//! - [`ExchangeWriter`]: takes events from the relay, publishes them
//!
//! Each worker task owns its connection and its connection health outright.
//! When a connection breaks the worker closes it, spawns a reconnect task and
//! goes Inhibited. The reconnect task only owns the connection it is building;
//! it hands that connection back through its join handle and the worker flips
//! itself back to Active.
//!
//! ```text
//!            failure confirmed
//!   Active ─────────────────────► Inhibited(reconnect task)
//!     ▲                                   │
//!     └───────── task yields connection ◄─┘
//!
//!   either state ──Cleanup──► Stopped (connection released, Done sent)
//! ```

mod reader;
mod writer;

pub use reader::QueueReader;
pub use writer::ExchangeWriter;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::control::{ControlSender, DoneReceiver};
use crate::shutdown::ShutdownError;

/// Observable connection health of a worker's endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionHealth {
    /// Normal operation.
    Active,
    /// Connection believed broken; only reconnect attempts are made.
    Inhibited,
}

/// Connection state owned by a worker task.
enum Health<T> {
    Active(T),
    /// At most one reconnect task per worker: the handle lives here and
    /// nowhere else.
    Inhibited(JoinHandle<T>),
}

/// Coordinator's handle on a running worker.
pub struct WorkerHandle {
    name: &'static str,
    control: ControlSender,
    done: DoneReceiver,
    health: watch::Receiver<ConnectionHealth>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    fn new(
        name: &'static str,
        control: ControlSender,
        done: DoneReceiver,
        health: watch::Receiver<ConnectionHealth>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            name,
            control,
            done,
            health,
            task,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Watch the worker's connection health.
    pub fn health(&self) -> watch::Receiver<ConnectionHealth> {
        self.health.clone()
    }

    /// True once the worker task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Send Cleanup, wait for Done, then wait for the task to finish.
    ///
    /// Consumes the handle, so a worker can be told to clean up only once.
    pub async fn stop(self) -> Result<(), ShutdownError> {
        let worker = self.name;
        info!(worker, "Sending cleanup");

        if !self.control.cleanup() {
            debug!(worker, "Worker had already finished");
        }

        let acknowledged = self.done.wait().await;

        self.task
            .await
            .map_err(|source| ShutdownError::Join { worker, source })?;

        match acknowledged {
            Some(true) => {
                info!(worker, "Worker acknowledged cleanup");
                Ok(())
            }
            _ => Err(ShutdownError::NoAck { worker }),
        }
    }
}
