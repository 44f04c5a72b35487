//! Shutdown coordination.
//!
//! The coordinator is the only thing that ends a worker's life. On a stop
//! request it sends Cleanup to the reader and waits for its Done, then does the
//! same for the writer. Stopping the reader first means nothing new leaves the
//! source queue while the writer finishes what it already took.

use std::future::Future;

use tokio::sync::watch;
use tokio::task::JoinError;
use tracing::{error, info};

use crate::worker::{ConnectionHealth, WorkerHandle};

/// Result type for shutdown operations.
pub type Result<T> = std::result::Result<T, ShutdownError>;

/// Errors that can occur while stopping a worker.
#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    #[error("{worker} task failed: {source}")]
    Join {
        worker: &'static str,
        #[source]
        source: JoinError,
    },

    #[error("{worker} exited without acknowledging cleanup")]
    NoAck { worker: &'static str },
}

/// Owns both worker handles for the lifetime of the process.
pub struct Coordinator {
    reader: WorkerHandle,
    writer: WorkerHandle,
}

impl Coordinator {
    pub fn new(reader: WorkerHandle, writer: WorkerHandle) -> Self {
        Self { reader, writer }
    }

    pub fn reader_health(&self) -> watch::Receiver<ConnectionHealth> {
        self.reader.health()
    }

    pub fn writer_health(&self) -> watch::Receiver<ConnectionHealth> {
        self.writer.health()
    }

    /// Stop the reader, then the writer.
    ///
    /// The writer is stopped even if the reader failed to; the first error is
    /// returned.
    pub async fn shutdown(self) -> Result<()> {
        info!("Shutting down");

        let reader = self.reader.stop().await;
        if let Err(e) = &reader {
            error!(error = %e, "Reader did not stop cleanly");
        }

        let writer = self.writer.stop().await;
        if let Err(e) = &writer {
            error!(error = %e, "Writer did not stop cleanly");
        }

        reader?;
        writer?;
        info!("Shutdown complete");
        Ok(())
    }

    /// Wait for `stop` to resolve, then shut down.
    ///
    /// Runs the sequence once. Further stop requests are not observed.
    pub async fn run_until<F>(self, stop: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        stop.await;
        info!("Stop requested");
        self.shutdown().await
    }
}

/// Termination signal handlers, registered up front.
///
/// Registering is separate from waiting so that a process which cannot
/// listen for signals fails at startup instead of stopping straight away.
/// The handlers stay installed for the rest of the process, so a second
/// signal during shutdown no longer terminates it.
pub struct ShutdownSignals {
    #[cfg(unix)]
    sigint: tokio::signal::unix::Signal,
    #[cfg(unix)]
    sigterm: tokio::signal::unix::Signal,
    #[cfg(unix)]
    sigquit: tokio::signal::unix::Signal,
    #[cfg(windows)]
    ctrl_c: tokio::signal::windows::CtrlC,
}

impl ShutdownSignals {
    /// Install handlers for SIGINT, SIGTERM and SIGQUIT (Ctrl-C on Windows).
    #[cfg(unix)]
    pub fn register() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            sigint: signal(SignalKind::interrupt())?,
            sigterm: signal(SignalKind::terminate())?,
            sigquit: signal(SignalKind::quit())?,
        })
    }

    #[cfg(windows)]
    pub fn register() -> std::io::Result<Self> {
        Ok(Self {
            ctrl_c: tokio::signal::windows::ctrl_c()?,
        })
    }

    /// Complete on the first termination signal.
    #[cfg(unix)]
    pub async fn wait(mut self) {
        let name = tokio::select! {
            _ = self.sigint.recv() => "SIGINT",
            _ = self.sigterm.recv() => "SIGTERM",
            _ = self.sigquit.recv() => "SIGQUIT",
        };
        info!(signal = name, "Received termination signal");
    }

    #[cfg(windows)]
    pub async fn wait(mut self) {
        self.ctrl_c.recv().await;
        info!(signal = "ctrl-c", "Received termination signal");
    }
}
