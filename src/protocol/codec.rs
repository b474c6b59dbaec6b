//! Wire codec for message frames
//!
//! Handles framing of messages into and out of byte buffers. The decoder is
//! a two-state machine (header, then body) so a frame may arrive split
//! across any number of socket reads.

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;

use super::{Message, MessageHeader, MessageId, HEADER_SIZE};

/// Codec errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    #[error("unknown message tag: {0:#010x}")]
    UnknownTag(u32),
}

/// Encodes messages into the wire format.
pub struct Encoder;

impl Encoder {
    pub fn new() -> Self {
        Self
    }

    /// Encode a message into a buffer: header bytes, then the body verbatim.
    pub fn encode<T: MessageId>(&mut self, message: &Message<T>, buf: &mut BytesMut) {
        buf.reserve(HEADER_SIZE + message.len());
        buf.put_slice(&message.header.id.to_wire().to_ne_bytes());
        buf.put_slice(&message.header.size.to_ne_bytes());
        buf.put_slice(&message.body);
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Decodes messages from the wire format.
pub struct Decoder<T: MessageId> {
    state: DecodeState<T>,
}

#[derive(Clone, Copy)]
enum DecodeState<T: MessageId> {
    Header,
    Body { id: T, length: usize },
}

impl<T: MessageId> Decoder<T> {
    pub fn new() -> Self {
        Self {
            state: DecodeState::Header,
        }
    }

    /// Attempt to decode one frame from the buffer.
    /// Returns `Ok(None)` if more data is needed.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Message<T>>, CodecError> {
        loop {
            match self.state {
                DecodeState::Header => {
                    if buf.len() < HEADER_SIZE {
                        return Ok(None);
                    }

                    let raw = u32::from_ne_bytes([buf[0], buf[1], buf[2], buf[3]]);
                    let id = T::from_wire(raw).ok_or(CodecError::UnknownTag(raw))?;
                    let length = u16::from_ne_bytes([buf[4], buf[5]]) as usize;

                    buf.advance(HEADER_SIZE);
                    self.state = DecodeState::Body { id, length };
                }
                DecodeState::Body { id, length } => {
                    if buf.len() < length {
                        return Ok(None);
                    }

                    let body = buf.split_to(length).to_vec();
                    self.state = DecodeState::Header;

                    return Ok(Some(Message {
                        header: MessageHeader {
                            id,
                            size: length as u16,
                        },
                        body,
                    }));
                }
            }
        }
    }
}

impl<T: MessageId> Default for Decoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Probe;

    #[test]
    fn encode_decode_roundtrip() {
        let mut encoder = Encoder::new();
        let mut decoder = Decoder::new();
        let mut buf = BytesMut::new();

        let mut original = Message::new(Probe::Data);
        original.append(&0xdeadbeefu32).unwrap();
        encoder.encode(&original, &mut buf);

        let decoded = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, original);
        assert!(buf.is_empty());
    }

    #[test]
    fn empty_body_frame() {
        let mut encoder = Encoder::new();
        let mut decoder = Decoder::<Probe>::new();
        let mut buf = BytesMut::new();

        encoder.encode(&Message::new(Probe::Ping), &mut buf);
        assert_eq!(buf.len(), HEADER_SIZE);

        let decoded = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.id(), Probe::Ping);
        assert!(decoded.is_empty());
    }

    #[test]
    fn multiple_messages_decode_in_order() {
        let mut encoder = Encoder::new();
        let mut decoder = Decoder::<Probe>::new();
        let mut buf = BytesMut::new();

        for i in 0..3u32 {
            let mut message = Message::new(Probe::Data);
            message.append(&i).unwrap();
            encoder.encode(&message, &mut buf);
        }

        for i in 0..3u32 {
            let mut decoded = decoder.decode(&mut buf).unwrap().unwrap();
            assert_eq!(decoded.consume::<u32>().unwrap(), i);
        }
        assert!(decoder.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn frame_split_across_reads() {
        let mut encoder = Encoder::new();
        let mut decoder = Decoder::new();
        let mut wire = BytesMut::new();

        let original = Message::with_body(Probe::Data, vec![7u8; 32]).unwrap();
        encoder.encode(&original, &mut wire);

        // Feed the frame one byte at a time; only the last byte completes it.
        let mut buf = BytesMut::new();
        let wire = wire.freeze();
        for (i, byte) in wire.iter().enumerate() {
            buf.put_u8(*byte);
            let decoded = decoder.decode(&mut buf).unwrap();
            if i < wire.len() - 1 {
                assert!(decoded.is_none());
            } else {
                assert_eq!(decoded.unwrap(), original);
            }
        }
    }

    #[test]
    fn unknown_tag_is_an_error() {
        let mut decoder: Decoder<Probe> = Decoder::new();
        let mut buf = BytesMut::new();
        buf.put_slice(&0xffff_ffffu32.to_ne_bytes());
        buf.put_slice(&0u16.to_ne_bytes());

        let err = decoder.decode(&mut buf).unwrap_err();
        assert_eq!(err, CodecError::UnknownTag(0xffff_ffff));
    }
}
