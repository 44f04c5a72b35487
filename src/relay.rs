//! Relay channel: a zero-capacity handoff of events from reader to writer.
//!
//! There is no buffer. The receiving side posts a one-shot slot each time it
//! is ready for an event; the sending side can only hand an event over once it
//! has taken such a slot. While the writer is busy publishing or is waiting
//! for its exchange to come back, no slot is posted and the reader waits.
//!
//! ```text
//! RelayReceiver::recv ──(slot)──► demand ──► RelaySender::reserve
//!        ▲                                          │
//!        └──────────────(event)──── Slot::deliver ◄─┘
//! ```
//!
//! Both halves are cancel-safe:
//! - Dropping a pending [`RelaySender::reserve`] future never consumes the
//!   event, because the event is only given up in [`Slot::deliver`].
//! - Dropping a pending [`RelayReceiver::recv`] future keeps the posted slot
//!   on the receiver, so an event delivered into it is returned by the next
//!   `recv` or by [`RelayReceiver::take_delivered`].

use tokio::sync::{mpsc, oneshot};

use crate::event::Event;

/// The writer side dropped its receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("relay channel closed")]
pub struct RelayClosed;

/// Create a connected sender/receiver pair.
pub fn channel() -> (RelaySender, RelayReceiver) {
    // At most one slot is outstanding at a time: the receiver only posts a new
    // one after the previous one resolved.
    let (demand_tx, demand_rx) = mpsc::unbounded_channel();
    (
        RelaySender { demand: demand_rx },
        RelayReceiver {
            demand: demand_tx,
            slot: None,
        },
    )
}

/// Producer half, owned by the queue reader.
#[derive(Debug)]
pub struct RelaySender {
    demand: mpsc::UnboundedReceiver<oneshot::Sender<Event>>,
}

/// Permission to hand exactly one event to a waiting receiver.
#[derive(Debug)]
pub struct Slot(oneshot::Sender<Event>);

impl Slot {
    /// Hand the event over. Gives the event back if the receiver went away.
    pub fn deliver(self, event: Event) -> Result<(), Event> {
        self.0.send(event)
    }
}

impl RelaySender {
    /// Wait until the receiver is ready to take an event.
    pub async fn reserve(&mut self) -> Result<Slot, RelayClosed> {
        loop {
            let slot = self.demand.recv().await.ok_or(RelayClosed)?;
            if !slot.is_closed() {
                return Ok(Slot(slot));
            }
        }
    }

    /// Wait for the receiver and hand the event over.
    ///
    /// Returns the event if the receiver is gone.
    pub async fn send(&mut self, mut event: Event) -> Result<(), Event> {
        loop {
            let slot = match self.reserve().await {
                Ok(slot) => slot,
                Err(RelayClosed) => return Err(event),
            };
            match slot.deliver(event) {
                Ok(()) => return Ok(()),
                Err(returned) => event = returned,
            }
        }
    }
}

/// Consumer half, owned by the exchange writer.
#[derive(Debug)]
pub struct RelayReceiver {
    demand: mpsc::UnboundedSender<oneshot::Sender<Event>>,
    slot: Option<oneshot::Receiver<Event>>,
}

impl RelayReceiver {
    /// Wait for the next event. `None` once the sender is gone.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            if self.slot.is_none() {
                let (tx, rx) = oneshot::channel();
                self.demand.send(tx).ok()?;
                self.slot = Some(rx);
            }
            let Some(slot) = self.slot.as_mut() else {
                continue;
            };

            let delivered = slot.await;
            self.slot = None;

            // An Err means the sender dropped the slot without using it; ask again.
            if let Ok(event) = delivered {
                return Some(event);
            }
        }
    }

    /// Take an event that was handed over after the last `recv` was abandoned.
    pub fn take_delivered(&mut self) -> Option<Event> {
        let event = self.slot.as_mut()?.try_recv().ok()?;
        self.slot = None;
        Some(event)
    }
}
