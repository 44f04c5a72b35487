//! Lifecycle signalling between the shutdown coordinator and a worker.
//!
//! Each worker gets one control channel (coordinator → worker) and one done
//! channel (worker → coordinator). Both are single-use: the sending halves are
//! consumed by [`ControlSender::cleanup`] and [`DoneSender::ack`], so a second
//! Cleanup or a second Done can't be expressed.

use std::time::Duration;

use tokio::sync::oneshot::{self, error::TryRecvError};
use tracing::debug;

/// Commands a worker understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Stop the loop, release the connection, acknowledge.
    Cleanup,
}

/// Create a control channel.
pub fn control_channel() -> (ControlSender, ControlReceiver) {
    let (tx, rx) = oneshot::channel();
    (
        ControlSender(tx),
        ControlReceiver {
            rx,
            stopped: false,
        },
    )
}

/// Create a done channel.
pub fn done_channel() -> (DoneSender, DoneReceiver) {
    let (tx, rx) = oneshot::channel();
    (DoneSender(tx), DoneReceiver(rx))
}

/// Coordinator side of a control channel.
#[derive(Debug)]
pub struct ControlSender(oneshot::Sender<Control>);

impl ControlSender {
    /// Send Cleanup. Returns false if the worker already went away.
    pub fn cleanup(self) -> bool {
        self.0.send(Control::Cleanup).is_ok()
    }
}

/// Worker side of a control channel.
///
/// A dropped [`ControlSender`] is treated the same as Cleanup: with nobody
/// left to stop the worker, it stops on its own.
#[derive(Debug)]
pub struct ControlReceiver {
    rx: oneshot::Receiver<Control>,
    stopped: bool,
}

impl ControlReceiver {
    /// Non-blocking check for a pending Cleanup.
    pub fn pending(&mut self) -> bool {
        if !self.stopped {
            match self.rx.try_recv() {
                Ok(Control::Cleanup) | Err(TryRecvError::Closed) => self.stopped = true,
                Err(TryRecvError::Empty) => {}
            }
        }
        self.stopped
    }

    /// Wait for Cleanup. Cancel-safe.
    pub async fn recv(&mut self) -> Control {
        if !self.stopped {
            let _ = (&mut self.rx).await;
            self.stopped = true;
        }
        Control::Cleanup
    }

    /// Sleep for `period` unless Cleanup arrives first.
    ///
    /// Returns true if the worker should stop.
    pub async fn idle(&mut self, period: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.recv() => true,
            _ = tokio::time::sleep(period) => false,
        }
    }
}

/// Worker side of a done channel.
#[derive(Debug)]
pub struct DoneSender(oneshot::Sender<bool>);

impl DoneSender {
    /// Acknowledge that the worker's loop exited and its connection was released.
    pub fn ack(self) {
        if self.0.send(true).is_err() {
            debug!("Done acknowledgment had no receiver");
        }
    }
}

/// Coordinator side of a done channel.
#[derive(Debug)]
pub struct DoneReceiver(oneshot::Receiver<bool>);

impl DoneReceiver {
    /// Wait for the acknowledgment. `None` if the worker ended without sending one.
    pub async fn wait(self) -> Option<bool> {
        self.0.await.ok()
    }
}
