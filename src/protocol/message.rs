//! Message framing
//!
//! A message is one frame on the wire: a typed header plus an opaque body.
//! Fixed-layout values are appended to and consumed from the body by raw
//! byte copy. Consume pops from the *end* of the body, so values come back
//! in reverse append order; writer and reader must agree on that stack
//! discipline.

use std::fmt;
use std::mem;

use thiserror::Error;
use zerocopy::{AsBytes, FromBytes};

use super::{MessageId, MAX_BODY_SIZE};

/// Errors produced by body mutation.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageError {
    #[error("message body overflow: {appended} bytes would grow the body past {max} bytes")]
    Overflow { appended: usize, max: usize },

    #[error("message body underflow: requested {requested} bytes, {available} available")]
    Underflow { requested: usize, available: usize },
}

/// Header of a message frame.
///
/// Invariant: `size` always equals the body length of the owning message;
/// every body mutation updates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader<T: MessageId> {
    pub id: T,
    pub size: u16,
}

impl<T: MessageId> fmt::Display for MessageHeader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "id: {:?}, size: {}", self.id, self.size)
    }
}

/// A message frame: typed header plus opaque body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message<T: MessageId> {
    pub header: MessageHeader<T>,
    pub body: Vec<u8>,
}

impl<T: MessageId> Message<T> {
    /// Create an empty message with the given tag.
    pub fn new(id: T) -> Self {
        Self {
            header: MessageHeader { id, size: 0 },
            body: Vec::new(),
        }
    }

    /// Create a message carrying an opaque byte blob.
    pub fn with_body(id: T, body: Vec<u8>) -> Result<Self, MessageError> {
        if body.len() > MAX_BODY_SIZE {
            return Err(MessageError::Overflow {
                appended: body.len(),
                max: MAX_BODY_SIZE,
            });
        }
        Ok(Self {
            header: MessageHeader {
                id,
                size: body.len() as u16,
            },
            body,
        })
    }

    /// The message tag.
    pub fn id(&self) -> T {
        self.header.id
    }

    /// Size of the message body in bytes.
    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Append a fixed-layout value to the end of the body.
    ///
    /// The value's raw bytes are copied verbatim; no byte-order conversion is
    /// performed. Fails if the body would exceed [`MAX_BODY_SIZE`].
    pub fn append<V: AsBytes>(&mut self, value: &V) -> Result<(), MessageError> {
        let bytes = value.as_bytes();
        if self.body.len() + bytes.len() > MAX_BODY_SIZE {
            return Err(MessageError::Overflow {
                appended: bytes.len(),
                max: MAX_BODY_SIZE,
            });
        }
        self.body.extend_from_slice(bytes);
        self.header.size = self.body.len() as u16;
        Ok(())
    }

    /// Pop a fixed-layout value off the *end* of the body.
    ///
    /// Values come back in reverse append order (LIFO). Fails instead of
    /// underflowing when fewer than `size_of::<V>()` bytes remain.
    pub fn consume<V: FromBytes>(&mut self) -> Result<V, MessageError> {
        let requested = mem::size_of::<V>();
        let available = self.body.len();
        if available < requested {
            return Err(MessageError::Underflow {
                requested,
                available,
            });
        }

        let tail = self.body.split_off(available - requested);
        self.header.size = self.body.len() as u16;

        V::read_from(tail.as_slice()).ok_or(MessageError::Underflow {
            requested,
            available,
        })
    }
}

impl<T: MessageId> fmt::Display for Message<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "message {{ {} }}", self.header)
    }
}

#[cfg(test)]
mod tests {
    use zerocopy::{AsBytes, FromBytes, FromZeroes};

    use super::*;
    use crate::test_support::Probe;

    #[derive(Debug, Clone, Copy, PartialEq, AsBytes, FromBytes, FromZeroes)]
    #[repr(C)]
    struct Sample {
        a: u32,
        b: f32,
    }

    #[test]
    fn consume_reverses_append_order() {
        let mut message = Message::new(Probe::Data);
        message.append(&1u32).unwrap();
        message.append(&2u16).unwrap();
        message.append(&3u8).unwrap();

        // LIFO: the last value appended is the first one out.
        assert_eq!(message.consume::<u8>().unwrap(), 3);
        assert_eq!(message.consume::<u16>().unwrap(), 2);
        assert_eq!(message.consume::<u32>().unwrap(), 1);
        assert!(message.is_empty());
    }

    #[test]
    fn append_tracks_header_size() {
        let mut message = Message::new(Probe::Data);
        assert_eq!(message.header.size, 0);

        message.append(&Sample { a: 7, b: 0.5 }).unwrap();
        assert_eq!(message.header.size, 8);
        assert_eq!(message.len(), 8);

        let sample: Sample = message.consume().unwrap();
        assert_eq!(sample, Sample { a: 7, b: 0.5 });
        assert_eq!(message.header.size, 0);
    }

    #[test]
    fn consume_underflow_is_an_error() {
        let mut message = Message::new(Probe::Ping);
        message.append(&1u8).unwrap();

        let err = message.consume::<u64>().unwrap_err();
        assert_eq!(
            err,
            MessageError::Underflow {
                requested: 8,
                available: 1,
            }
        );
        // The failed consume must not have disturbed the body.
        assert_eq!(message.len(), 1);
        assert_eq!(message.consume::<u8>().unwrap(), 1);
    }

    #[test]
    fn append_past_body_limit_is_an_error() {
        let mut message = Message::with_body(Probe::Data, vec![0u8; MAX_BODY_SIZE]).unwrap();
        let err = message.append(&0u8).unwrap_err();
        assert!(matches!(err, MessageError::Overflow { appended: 1, .. }));
        assert_eq!(message.len(), MAX_BODY_SIZE);
    }

    #[test]
    fn with_body_rejects_oversized_blob() {
        let err = Message::with_body(Probe::Data, vec![0u8; MAX_BODY_SIZE + 1]).unwrap_err();
        assert!(matches!(err, MessageError::Overflow { .. }));
    }

    #[test]
    fn display_shows_tag_and_size() {
        let mut message = Message::new(Probe::Pong);
        message.append(&0xffu8).unwrap();
        assert_eq!(message.to_string(), "message { id: Pong, size: 1 }");
    }
}
