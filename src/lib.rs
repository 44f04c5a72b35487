//! amqp-pipe - Redis list → AMQP fanout relay
//!
//! Pops opaque event payloads off a source queue and publishes them, byte for
//! byte, to a fanout exchange. Either endpoint may go away at runtime; the
//! worker facing it stops touching it, reconnects on a fixed delay and picks up
//! where it left off.
//!
//! ```text
//! source queue ──► QueueReader ──► relay (zero capacity) ──► ExchangeWriter ──► exchange
//!                       ▲                                          ▲
//!                       └────────── Cleanup / Done ────────────────┘
//!                                 shutdown::Coordinator
//! ```

pub mod config;
pub mod control;
pub mod event;
pub mod exchange;
pub mod pipe;
pub mod queue;
pub mod relay;
pub mod shutdown;
pub mod utils;
pub mod worker;

pub use event::Event;
