//! In-memory queue for testing.
//!
//! Outages are simulated with [`MockQueue::set_reachable`] (everything fails,
//! including connects) and [`MockQueue::drop_connections`] (existing
//! connections die, new ones succeed). [`MockQueue::set_blocking`] turns pops
//! into blocking pops, like `BLPOP` with a timeout.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use super::{QueueConnection, QueueConnector, QueueError, Result};
use crate::event::Event;

/// Mock queue connector. Clones share the same queue.
#[derive(Clone, Default)]
pub struct MockQueue {
    state: Arc<Mutex<MockQueueState>>,
    arrivals: Arc<Notify>,
}

#[derive(Default)]
struct MockQueueState {
    items: VecDeque<Event>,
    unreachable: bool,
    generation: u64,
    failing_pops: usize,
    block: Option<Duration>,
    pops: usize,
    dead_pops: usize,
    pings: usize,
    requeues: usize,
    connect_attempts: usize,
    connects: usize,
    live: usize,
    max_live: usize,
}

impl MockQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockQueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append events to the tail.
    pub fn push<I, E>(&self, events: I)
    where
        I: IntoIterator<Item = E>,
        E: Into<Event>,
    {
        self.state().items.extend(events.into_iter().map(Into::into));
        self.arrivals.notify_one();
    }

    /// Events still queued, head first.
    pub fn remaining(&self) -> Vec<Event> {
        self.state().items.iter().cloned().collect()
    }

    /// Make the queue (un)reachable for every operation, connects included.
    pub fn set_reachable(&self, reachable: bool) {
        self.state().unreachable = !reachable;
    }

    /// Kill every open connection; new connects still succeed.
    pub fn drop_connections(&self) {
        self.state().generation += 1;
    }

    /// Make pops on an empty queue wait up to `block` for an event.
    /// `None` restores immediate pops.
    pub fn set_blocking(&self, block: Option<Duration>) {
        self.state().block = block;
    }

    /// Fail the next `n` pops while pings keep answering.
    pub fn fail_next_pops(&self, n: usize) {
        self.state().failing_pops = n;
    }

    /// Pop attempts, successful or not.
    pub fn pop_count(&self) -> usize {
        self.state().pops
    }

    /// Pop attempts made on a connection that was already dead.
    pub fn dead_pop_count(&self) -> usize {
        self.state().dead_pops
    }

    pub fn ping_count(&self) -> usize {
        self.state().pings
    }

    pub fn requeue_count(&self) -> usize {
        self.state().requeues
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
impl QueueConnector for MockQueue {
    type Connection = MockQueueConnection;

    fn endpoint(&self) -> String {
        "mock-queue".to_string()
    }

    async fn connect(&self) -> Result<MockQueueConnection> {
        let mut state = self.state();
        state.connect_attempts += 1;
        if state.unreachable {
            return Err(QueueError::Connection("mock queue unreachable".to_string()));
        }

        state.connects += 1;
        state.live += 1;
        state.max_live = state.max_live.max(state.live);

        Ok(MockQueueConnection {
            state: Arc::clone(&self.state),
            arrivals: Arc::clone(&self.arrivals),
            generation: state.generation,
            open: true,
        })
    }
}

/// Connection handed out by [`MockQueue`].
pub struct MockQueueConnection {
    state: Arc<Mutex<MockQueueState>>,
    arrivals: Arc<Notify>,
    generation: u64,
    open: bool,
}

impl MockQueueConnection {
    fn state(&self) -> MutexGuard<'_, MockQueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn alive(&self, state: &MockQueueState) -> bool {
        self.open && !state.unreachable && state.generation == self.generation
    }

    fn release(&mut self) {
        if self.open {
            self.open = false;
            self.state().live -= 1;
        }
    }
}

#[async_trait]
impl QueueConnection for MockQueueConnection {
    async fn pop(&mut self) -> Result<Option<Event>> {
        let block = {
            let mut state = self.state();
            state.pops += 1;

            if !self.alive(&state) {
                state.dead_pops += 1;
                return Err(QueueError::Pop("mock connection is dead".to_string()));
            }
            if state.failing_pops > 0 {
                state.failing_pops -= 1;
                return Err(QueueError::Pop("injected pop failure".to_string()));
            }

            match (state.items.pop_front(), state.block) {
                (Some(event), _) => return Ok(Some(event)),
                (None, None) => return Ok(None),
                (None, Some(block)) => block,
            }
        };

        // Timing out is the blocking pop's normal "queue stayed empty".
        let _ = tokio::time::timeout(block, self.arrivals.notified()).await;

        let mut state = self.state();
        if !self.alive(&state) {
            return Err(QueueError::Pop("mock connection is dead".to_string()));
        }
        Ok(state.items.pop_front())
    }

    async fn ping(&mut self) -> Result<()> {
        let mut state = self.state();
        state.pings += 1;

        if self.alive(&state) {
            Ok(())
        } else {
            Err(QueueError::Ping("mock connection is dead".to_string()))
        }
    }

    async fn requeue(&mut self, event: Event) -> Result<()> {
        let mut state = self.state();
        if !self.alive(&state) {
            return Err(QueueError::Requeue("mock connection is dead".to_string()));
        }

        state.requeues += 1;
        state.items.push_front(event);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.release();
        Ok(())
    }

    fn waits_for_events(&self) -> bool {
        self.state().block.is_some()
    }
}

impl Drop for MockQueueConnection {
    fn drop(&mut self) {
        self.release();
    }
}
