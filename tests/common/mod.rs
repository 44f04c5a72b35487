//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::time::Duration;

use amqp_pipe::config::RelayConfig;
use amqp_pipe::exchange::MockExchange;
use amqp_pipe::pipe;
use amqp_pipe::queue::MockQueue;
use amqp_pipe::shutdown::Coordinator;

/// Short poll and reconnect intervals so outages resolve in milliseconds.
pub fn fast_timing() -> RelayConfig {
    RelayConfig {
        poll_interval_ms: 5,
        reconnect_delay_ms: 10,
    }
}

/// Poll `condition` until it holds, panicking after 5 seconds.
pub async fn eventually(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for: {}",
            what
        );
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

/// A running pipe over mock endpoints.
pub struct MockPipe {
    pub queue: MockQueue,
    pub exchange: MockExchange,
    pub coordinator: Coordinator,
}

/// Start a pipe over fresh mock endpoints, with `events` already queued.
pub async fn start_mock_pipe(events: &[&'static str]) -> MockPipe {
    let queue = MockQueue::new();
    let exchange = MockExchange::new();
    queue.push(events.iter().copied());

    let coordinator = pipe::start(queue.clone(), exchange.clone(), fast_timing())
        .await
        .expect("Failed to start pipe over mocks");

    MockPipe {
        queue,
        exchange,
        coordinator,
    }
}

/// Bodies as byte vectors, for comparing with published bodies.
pub fn bodies(events: &[&str]) -> Vec<Vec<u8>> {
    events.iter().map(|e| e.as_bytes().to_vec()).collect()
}
