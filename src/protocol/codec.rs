//! Frame codec
//!
//! Byte layouts, all integers little-endian:
//!
//! ```text
//! Set      | 0x01 | key_len u16 | value_len u16 | ttl_ms u64 | key | value |
//! Get      | 0x02 | key_len u16 | key |
//! Join     | 0x03 |
//! Delete   | 0x04 | key_len u16 | key |
//! Response | 0x80 | body_len u32 | JSON record |
//! ```
//!
//! The whole frame length is derived from the fixed-size header and checked
//! against `max_frame_size` before any body bytes are buffered, so a hostile
//! length field can never size an allocation.

use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::config::DEFAULT_MAX_FRAME_SIZE;
use crate::error::ProtocolError;
use crate::protocol::{Command, Frame, Response, Tag};

const SET_HEADER_LEN: usize = 1 + 2 + 2 + 8;
const KEY_HEADER_LEN: usize = 1 + 2;
const JOIN_HEADER_LEN: usize = 1;
const RESPONSE_HEADER_LEN: usize = 1 + 4;

// == Frame Codec ==
/// Encoder and decoder for [`Frame`]s, usable with `FramedRead` / `FramedWrite`.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    fn check_len(&self, len: usize) -> Result<(), ProtocolError> {
        if len > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                len,
                max: self.max_frame_size,
            });
        }
        Ok(())
    }

    fn encode_command(&self, command: &Command, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        match command {
            Command::Set { key, value, ttl } => {
                let key_len = u16_len("key", key)?;
                let value_len = u16_len("value", value)?;
                let frame_len = SET_HEADER_LEN + key.len() + value.len();
                self.check_len(frame_len)?;

                dst.reserve(frame_len);
                dst.put_u8(Tag::Set as u8);
                dst.put_u16_le(key_len);
                dst.put_u16_le(value_len);
                dst.put_u64_le(ttl_millis(*ttl));
                dst.put_slice(key);
                dst.put_slice(value);
            }
            Command::Get { key } | Command::Delete { key } => {
                let key_len = u16_len("key", key)?;
                let frame_len = KEY_HEADER_LEN + key.len();
                self.check_len(frame_len)?;

                dst.reserve(frame_len);
                dst.put_u8(command.tag() as u8);
                dst.put_u16_le(key_len);
                dst.put_slice(key);
            }
            Command::Join => {
                self.check_len(JOIN_HEADER_LEN)?;
                dst.put_u8(Tag::Join as u8);
            }
        }
        Ok(())
    }

    fn encode_response(&self, response: &Response, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let body = serde_json::to_vec(response)?;
        let frame_len = RESPONSE_HEADER_LEN + body.len();
        self.check_len(frame_len)?;
        let body_len = u32::try_from(body.len()).map_err(|_| ProtocolError::FieldTooLong {
            field: "response",
            len: body.len(),
        })?;

        dst.reserve(frame_len);
        dst.put_u8(Tag::Response as u8);
        dst.put_u32_le(body_len);
        dst.put_slice(&body);
        Ok(())
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
        let Some(&first) = src.first() else {
            return Ok(None);
        };
        let tag = Tag::try_from(first)?;

        let header_len = header_len(tag);
        if src.len() < header_len {
            return Ok(None);
        }

        let mut header = &src[1..header_len];
        let body_len = match tag {
            Tag::Set => header.get_u16_le() as usize + header.get_u16_le() as usize,
            Tag::Get | Tag::Delete => header.get_u16_le() as usize,
            Tag::Join => 0,
            Tag::Response => header.get_u32_le() as usize,
        };

        let frame_len = header_len.saturating_add(body_len);
        self.check_len(frame_len)?;
        if src.len() < frame_len {
            // Only reached once the length is known to be within bounds
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(frame_len).freeze();
        frame.advance(1);

        let frame = match tag {
            Tag::Set => {
                let key_len = frame.get_u16_le() as usize;
                let value_len = frame.get_u16_le() as usize;
                let ttl = Duration::from_millis(frame.get_u64_le());
                let key = frame.split_to(key_len);
                let value = frame.split_to(value_len);
                Frame::Command(Command::Set { key, value, ttl })
            }
            Tag::Get => Frame::Command(Command::Get {
                key: read_key(&mut frame),
            }),
            Tag::Delete => Frame::Command(Command::Delete {
                key: read_key(&mut frame),
            }),
            Tag::Join => Frame::Command(Command::Join),
            Tag::Response => {
                frame.advance(4);
                Frame::Response(serde_json::from_slice(&frame)?)
            }
        };

        Ok(Some(frame))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        match &item {
            Frame::Command(command) => self.encode_command(command, dst),
            Frame::Response(response) => self.encode_response(response, dst),
        }
    }
}

fn header_len(tag: Tag) -> usize {
    match tag {
        Tag::Set => SET_HEADER_LEN,
        Tag::Get | Tag::Delete => KEY_HEADER_LEN,
        Tag::Join => JOIN_HEADER_LEN,
        Tag::Response => RESPONSE_HEADER_LEN,
    }
}

fn read_key(frame: &mut Bytes) -> Bytes {
    let key_len = frame.get_u16_le() as usize;
    frame.split_to(key_len)
}

fn u16_len(field: &'static str, bytes: &[u8]) -> Result<u16, ProtocolError> {
    u16::try_from(bytes.len()).map_err(|_| ProtocolError::FieldTooLong {
        field,
        len: bytes.len(),
    })
}

/// Whole milliseconds; sub-millisecond precision is dropped.
/// Whole milliseconds, rounded up so a nonzero TTL never becomes "no expiry".
fn ttl_millis(ttl: Duration) -> u64 {
    let mut millis = ttl.as_millis();
    if ttl.subsec_nanos() % 1_000_000 != 0 {
        millis += 1;
    }
    u64::try_from(millis).unwrap_or(u64::MAX)
}
