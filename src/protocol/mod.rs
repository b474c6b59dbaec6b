//! Protocol module - message framing and the wire codec
//!
//! The wire format is a single header immediately followed by the body:
//! - 4 bytes message tag (native byte order)
//! - 2 bytes body length (native byte order)
//! - Variable length body, copied verbatim
//!
//! Header fields use host-native byte order; peers are assumed to run this
//! implementation on compatible hosts. Payload bytes are opaque to this
//! crate and are never reinterpreted or normalized.

mod codec;
mod message;

pub use codec::*;
pub use message::*;

use std::fmt;

/// Size of the wire header: tag(4) + length(2) = 6 bytes.
pub const HEADER_SIZE: usize = 6;

/// Largest body a single message can carry (the length field is 16 bits).
pub const MAX_BODY_SIZE: usize = u16::MAX as usize;

/// Application-defined message tag.
///
/// The embedding application declares its own message-type enumeration and
/// maps it to and from the 32-bit wire tag. `from_wire` returns `None` for
/// tags the application does not recognize, which the decoder surfaces as a
/// [`CodecError::UnknownTag`].
pub trait MessageId: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    fn to_wire(self) -> u32;
    fn from_wire(raw: u32) -> Option<Self>;
}
