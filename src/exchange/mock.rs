//! In-memory exchange for testing.
//!
//! Records every published event together with its content type. Outages are
//! simulated the same way as [`crate::queue::MockQueue`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::{ExchangeConnection, ExchangeConnector, ExchangeError, Result, CONTENT_TYPE};
use crate::event::Event;

/// A publish as the exchange saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub content_type: &'static str,
    pub event: Event,
}

/// Mock exchange connector. Clones share the same exchange.
#[derive(Clone, Default)]
pub struct MockExchange {
    state: Arc<Mutex<MockExchangeState>>,
}

#[derive(Default)]
struct MockExchangeState {
    published: Vec<Published>,
    unreachable: bool,
    fail_declare: bool,
    generation: u64,
    publishes: usize,
    dead_publishes: usize,
    declares: usize,
    connect_attempts: usize,
    connects: usize,
    live: usize,
    max_live: usize,
}

impl MockExchange {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockExchangeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Everything published so far, in order.
    pub fn published(&self) -> Vec<Published> {
        self.state().published.clone()
    }

    /// Bodies published so far, in order.
    pub fn published_bodies(&self) -> Vec<Vec<u8>> {
        self.state()
            .published
            .iter()
            .map(|p| p.event.body().to_vec())
            .collect()
    }

    pub fn published_count(&self) -> usize {
        self.state().published.len()
    }

    /// Make the exchange (un)reachable for every operation, connects included.
    pub fn set_reachable(&self, reachable: bool) {
        self.state().unreachable = !reachable;
    }

    /// Make connects fail at the exchange declaration step.
    pub fn set_fail_declare(&self, fail: bool) {
        self.state().fail_declare = fail;
    }

    /// Kill every open connection; new connects still succeed.
    pub fn drop_connections(&self) {
        self.state().generation += 1;
    }

    /// Publish attempts, successful or not.
    pub fn publish_attempts(&self) -> usize {
        self.state().publishes
    }

    /// Publish attempts made on a connection that was already dead.
    pub fn dead_publish_count(&self) -> usize {
        self.state().dead_publishes
    }

    pub fn declare_count(&self) -> usize {
        self.state().declares
    }

    pub fn connect_attempts(&self) -> usize {
        self.state().connect_attempts
    }

    /// Successful connects.
    pub fn connect_count(&self) -> usize {
        self.state().connects
    }

    pub fn live_connections(&self) -> usize {
        self.state().live
    }

    /// Highest number of simultaneously open connections seen.
    pub fn max_live_connections(&self) -> usize {
        self.state().max_live
    }
}

#[async_trait]
impl ExchangeConnector for MockExchange {
    type Connection = MockExchangeConnection;

    fn endpoint(&self) -> String {
        "mock-exchange".to_string()
    }

    async fn connect(&self) -> Result<MockExchangeConnection> {
        let mut state = self.state();
        state.connect_attempts += 1;
        if state.unreachable {
            return Err(ExchangeError::Connection(
                "mock exchange unreachable".to_string(),
            ));
        }
        if state.fail_declare {
            return Err(ExchangeError::Declare("mock declare refused".to_string()));
        }

        state.declares += 1;
        state.connects += 1;
        state.live += 1;
        state.max_live = state.max_live.max(state.live);

        Ok(MockExchangeConnection {
            state: Arc::clone(&self.state),
            generation: state.generation,
            open: true,
        })
    }
}

/// Connection handed out by [`MockExchange`].
pub struct MockExchangeConnection {
    state: Arc<Mutex<MockExchangeState>>,
    generation: u64,
    open: bool,
}

impl MockExchangeConnection {
    fn state(&self) -> MutexGuard<'_, MockExchangeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&mut self) {
        if self.open {
            self.open = false;
            self.state().live -= 1;
        }
    }
}

#[async_trait]
impl ExchangeConnection for MockExchangeConnection {
    async fn publish(&mut self, event: &Event) -> Result<()> {
        let mut state = self.state();
        state.publishes += 1;

        let alive = self.open && !state.unreachable && state.generation == self.generation;
        if !alive {
            state.dead_publishes += 1;
            return Err(ExchangeError::Publish("mock connection is dead".to_string()));
        }

        state.published.push(Published {
            content_type: CONTENT_TYPE,
            event: event.clone(),
        });
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.release();
        Ok(())
    }
}

impl Drop for MockExchangeConnection {
    fn drop(&mut self) {
        self.release();
    }
}
