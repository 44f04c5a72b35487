//! End-to-end relay behaviour over the in-memory backends.
//!
//! Run with: cargo test --test relay

mod common;

use std::time::Duration;

use amqp_pipe::exchange::{MockExchange, CONTENT_TYPE};
use amqp_pipe::pipe::{self, PipeError};
use amqp_pipe::queue::MockQueue;
use amqp_pipe::worker::ConnectionHealth;
use amqp_pipe::Event;

use common::{bodies, eventually, fast_timing, start_mock_pipe};

// ============================================================================
// Steady state
// ============================================================================

#[tokio::test]
async fn test_healthy_endpoints_relay_in_order() {
    let pipe = start_mock_pipe(&["a", "b", "c"]).await;

    eventually("three publishes", || pipe.exchange.published_count() == 3).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(pipe.exchange.published_bodies(), bodies(&["a", "b", "c"]));
    assert!(pipe
        .exchange
        .published()
        .iter()
        .all(|p| p.content_type == CONTENT_TYPE));
    assert!(pipe.queue.remaining().is_empty());

    pipe.coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_payloads_relayed_byte_for_byte() {
    let pipe = start_mock_pipe(&[]).await;
    let payloads = vec![
        Event::from(r#"{"event_type":"alert","src_ip":"10.0.0.1"}"#),
        Event::from(vec![0u8, 159, 146, 150, 255]),
        Event::from(Vec::<u8>::new()),
    ];
    pipe.queue.push(payloads.clone());

    eventually("three publishes", || pipe.exchange.published_count() == 3).await;

    let published: Vec<Event> = pipe
        .exchange
        .published()
        .into_iter()
        .map(|p| p.event)
        .collect();
    assert_eq!(published, payloads);

    pipe.coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_empty_queue_forwards_nothing_and_polls_slowly() {
    let pipe = start_mock_pipe(&[]).await;

    tokio::time::sleep(Duration::from_millis(200)).await;

    let pops = pipe.queue.pop_count();
    assert!(pops >= 5, "reader stopped polling after {} pops", pops);
    assert!(pops < 100, "reader is spinning: {} pops in 200ms", pops);
    assert_eq!(pipe.exchange.publish_attempts(), 0);

    pipe.coordinator.shutdown().await.unwrap();
}

// ============================================================================
// Startup
// ============================================================================

#[tokio::test]
async fn test_unreachable_exchange_at_startup_is_fatal() {
    let queue = MockQueue::new();
    let exchange = MockExchange::new();
    queue.push(["a"]);
    exchange.set_reachable(false);

    let result = pipe::start(queue.clone(), exchange.clone(), fast_timing()).await;

    assert!(matches!(result, Err(PipeError::Exchange(_))));
    assert_eq!(exchange.published_count(), 0);
    assert_eq!(queue.remaining(), vec![Event::from("a")]);
    assert_eq!(queue.live_connections(), 0);
}

#[tokio::test]
async fn test_failed_declare_at_startup_is_fatal() {
    let queue = MockQueue::new();
    let exchange = MockExchange::new();
    exchange.set_fail_declare(true);

    let result = pipe::start(queue.clone(), exchange.clone(), fast_timing()).await;

    assert!(matches!(result, Err(PipeError::Exchange(_))));
    assert_eq!(exchange.connect_attempts(), 1);
}

// ============================================================================
// Outages
// ============================================================================

#[tokio::test]
async fn test_exchange_outage_holds_events_and_resumes_in_order() {
    let pipe = start_mock_pipe(&["a", "b"]).await;
    let mut writer = pipe.coordinator.writer_health();
    eventually("first publishes", || pipe.exchange.published_count() == 2).await;

    pipe.exchange.drop_connections();
    pipe.exchange.set_reachable(false);
    pipe.queue.push(["c", "d", "e"]);
    writer
        .wait_for(|h| *h == ConnectionHealth::Inhibited)
        .await
        .unwrap();

    // One failed publish discovered the outage; nothing more is attempted.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(pipe.exchange.publish_attempts(), 3);
    // The reader is stuck on its handoff, so the rest stays queued.
    assert!(pipe.queue.remaining().len() >= 1);

    pipe.exchange.set_reachable(true);
    eventually("all publishes", || pipe.exchange.published_count() == 5).await;

    assert_eq!(
        pipe.exchange.published_bodies(),
        bodies(&["a", "b", "c", "d", "e"])
    );
    assert_eq!(pipe.exchange.max_live_connections(), 1);

    pipe.coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_queue_outage_stops_pops_until_reconnected() {
    let pipe = start_mock_pipe(&[]).await;
    let mut reader = pipe.coordinator.reader_health();

    pipe.queue.set_reachable(false);
    reader
        .wait_for(|h| *h == ConnectionHealth::Inhibited)
        .await
        .unwrap();

    let pops = pipe.queue.pop_count();
    eventually("several reconnect attempts", || {
        pipe.queue.connect_attempts() >= 10
    })
    .await;
    assert_eq!(pipe.queue.pop_count(), pops, "popped while inhibited");

    pipe.queue.set_reachable(true);
    pipe.queue.push(["x"]);
    eventually("relayed after recovery", || {
        pipe.exchange.published_count() == 1
    })
    .await;
    assert_eq!(*reader.borrow(), ConnectionHealth::Active);
    assert_eq!(pipe.queue.max_live_connections(), 1);

    pipe.coordinator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_both_endpoints_recover() {
    let pipe = start_mock_pipe(&[]).await;
    let mut reader = pipe.coordinator.reader_health();
    let mut writer = pipe.coordinator.writer_health();

    pipe.queue.set_reachable(false);
    pipe.exchange.set_reachable(false);
    reader
        .wait_for(|h| *h == ConnectionHealth::Inhibited)
        .await
        .unwrap();

    pipe.queue.set_reachable(true);
    pipe.queue.push(["1", "2"]);
    writer
        .wait_for(|h| *h == ConnectionHealth::Inhibited)
        .await
        .unwrap();

    pipe.exchange.set_reachable(true);
    eventually("both relayed", || pipe.exchange.published_count() == 2).await;
    assert_eq!(pipe.exchange.published_bodies(), bodies(&["1", "2"]));

    pipe.coordinator.shutdown().await.unwrap();
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test]
async fn test_shutdown_mid_stream_loses_and_duplicates_nothing() {
    let events: Vec<Event> = (0..200)
        .map(|i| Event::from(format!("event-{}", i).into_bytes()))
        .collect();

    let pipe = start_mock_pipe(&[]).await;
    pipe.queue.push(events.clone());
    eventually("some publishes", || pipe.exchange.published_count() >= 10).await;

    pipe.coordinator.shutdown().await.unwrap();

    let mut seen: Vec<Event> = pipe
        .exchange
        .published()
        .into_iter()
        .map(|p| p.event)
        .collect();
    seen.extend(pipe.queue.remaining());
    assert_eq!(seen, events);

    assert_eq!(pipe.queue.live_connections(), 0);
    assert_eq!(pipe.exchange.live_connections(), 0);
}

#[tokio::test]
async fn test_shutdown_stops_all_activity() {
    let pipe = start_mock_pipe(&["a"]).await;
    eventually("published", || pipe.exchange.published_count() == 1).await;

    pipe.coordinator.shutdown().await.unwrap();

    let pops = pipe.queue.pop_count();
    let attempts = pipe.queue.connect_attempts();
    pipe.queue.push(["late"]);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(pipe.queue.pop_count(), pops);
    assert_eq!(pipe.queue.connect_attempts(), attempts);
    assert_eq!(pipe.exchange.published_count(), 1);
}
