//! Opaque event payloads relayed from the queue to the exchange.

use bytes::Bytes;

/// An immutable event body, exactly as it was popped from the source queue.
///
/// The relay never looks inside: the bytes published to the exchange are the
/// bytes that were popped, with no re-encoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Event(Bytes);

impl Event {
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self(body.into())
    }

    /// Raw body bytes.
    pub fn body(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consume the event, yielding the shared body buffer.
    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl From<Vec<u8>> for Event {
    fn from(body: Vec<u8>) -> Self {
        Self(Bytes::from(body))
    }
}

impl From<&'static str> for Event {
    fn from(body: &'static str) -> Self {
        Self(Bytes::from_static(body.as_bytes()))
    }
}

impl AsRef<[u8]> for Event {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
