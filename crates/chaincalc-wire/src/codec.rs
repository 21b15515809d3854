//! Binary codec for client frames and server responses.
//!
//! Every field is big-endian. A client frame is laid out as
//! `length:u32 | kind:u8 | body`, where `length` counts the kind byte and the
//! body. The chunk body is
//! `replyPort:i32 | order:i32 | requestId:i32 | totalChunks:i32 |
//! unaryLen:i32 [unary] | value:f64 | binaryLen:i32 [binary]`, with a length of
//! `-1` marking an absent operator. A response is `requestId:i32 | value:f64`.

use bytes::{Buf, BufMut, BytesMut};

use crate::errors::DecodeError;
use crate::frame::{Frame, FrameKind, ResponseFrame};
use crate::operand::{Operand, RequestChunk, RequestId};
use crate::operator::{MAX_TAG_LEN, OperatorTag};

const LENGTH_PREFIX: usize = 4;
const KIND_LEN: usize = 1;
const INT_LEN: usize = 4;
const FLOAT_LEN: usize = 8;
const ABSENT_OPERATOR: i32 = -1;

/// Largest frame the protocol produces, length prefix included.
pub const MAX_FRAME_LEN: usize =
    LENGTH_PREFIX + KIND_LEN + 4 * INT_LEN + 2 * (INT_LEN + MAX_TAG_LEN) + FLOAT_LEN;

/// Bytes allowed for each operator tag when sizing incoming frames.
///
/// Larger than any known tag, so a peer sending an unknown tag loses only
/// that request instead of the whole connection.
pub const WIRE_TAG_ALLOWANCE: usize = 32;

const MAX_BODY_LEN: usize =
    KIND_LEN + 4 * INT_LEN + 2 * (INT_LEN + WIRE_TAG_ALLOWANCE) + FLOAT_LEN;

/// Size of a response frame.
pub const RESPONSE_FRAME_LEN: usize = INT_LEN + FLOAT_LEN;

/// Appends the length-prefixed encoding of `frame` to `dst`.
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) {
    let start = dst.len();
    dst.reserve(MAX_FRAME_LEN);
    dst.put_u32(0);
    dst.put_u8(frame.kind() as u8);
    match frame {
        Frame::Chunk(chunk) => put_chunk(chunk, dst),
        Frame::Register { reply_port } | Frame::CloseClient { reply_port } => {
            dst.put_i32(i32::from(*reply_port));
        }
        Frame::Cancel {
            reply_port,
            request_id,
        } => {
            dst.put_i32(i32::from(*reply_port));
            dst.put_i32(request_id.0);
        }
    }
    let body_len = u32::try_from(dst.len() - start - LENGTH_PREFIX).unwrap_or(u32::MAX);
    dst[start..start + LENGTH_PREFIX].copy_from_slice(&body_len.to_be_bytes());
}

fn put_chunk(chunk: &RequestChunk, dst: &mut BytesMut) {
    dst.put_i32(i32::from(chunk.reply_port));
    dst.put_i32(i32::try_from(chunk.order).unwrap_or(i32::MAX));
    dst.put_i32(chunk.request_id.0);
    dst.put_i32(i32::try_from(chunk.total_chunks).unwrap_or(i32::MAX));
    put_operator(chunk.operand.unary, dst);
    dst.put_f64(chunk.operand.value);
    put_operator(chunk.operand.binary, dst);
}

fn put_operator(tag: Option<OperatorTag>, dst: &mut BytesMut) {
    match tag {
        Some(tag) => {
            let name = tag.as_str().as_bytes();
            dst.put_i32(i32::try_from(name.len()).unwrap_or(i32::MAX));
            dst.put_slice(name);
        }
        None => dst.put_i32(ABSENT_OPERATOR),
    }
}

/// Decodes exactly one length-prefixed frame.
pub fn decode_frame(bytes: &[u8]) -> Result<Frame, DecodeError> {
    let Some(prefix) = bytes.get(..LENGTH_PREFIX) else {
        return Err(DecodeError::Incomplete {
            expected: LENGTH_PREFIX,
            actual: bytes.len(),
        });
    };
    let expected = LENGTH_PREFIX + body_length(prefix)?;
    if bytes.len() != expected {
        return Err(DecodeError::Incomplete {
            expected,
            actual: bytes.len(),
        });
    }
    decode_body(&bytes[LENGTH_PREFIX..])
}

/// Encodes a response frame.
#[must_use]
pub fn encode_response(frame: &ResponseFrame) -> [u8; RESPONSE_FRAME_LEN] {
    let mut out = [0_u8; RESPONSE_FRAME_LEN];
    let mut cursor = &mut out[..];
    cursor.put_i32(frame.request_id.0);
    cursor.put_f64(frame.value);
    out
}

/// Decodes a response frame.
#[must_use]
pub fn decode_response(bytes: &[u8; RESPONSE_FRAME_LEN]) -> ResponseFrame {
    let mut buf = &bytes[..];
    let request_id = RequestId(buf.get_i32());
    let value = buf.get_f64();
    ResponseFrame { request_id, value }
}

/// Reassembles frames from a byte stream delivered in arbitrary pieces.
///
/// Bytes are buffered until a whole frame is available, so a frame split
/// across reads decodes the same as one read in full.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Creates a decoder sized for one maximal frame.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(MAX_FRAME_LEN),
        }
    }

    /// Appends bytes read from the connection.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Number of bytes waiting for the rest of their frame.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Yields the next complete frame, or `None` until more bytes arrive.
    ///
    /// A frame that fails with [`DecodeError::UnknownOperator`] is consumed, so
    /// decoding can continue with the frame after it.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, DecodeError> {
        let Some(prefix) = self.buffer.get(..LENGTH_PREFIX) else {
            return Ok(None);
        };
        let frame_len = LENGTH_PREFIX + body_length(prefix)?;
        if self.buffer.len() < frame_len {
            return Ok(None);
        }
        let frame = self.buffer.split_to(frame_len);
        decode_body(&frame[LENGTH_PREFIX..]).map(Some)
    }
}

fn body_length(mut prefix: &[u8]) -> Result<usize, DecodeError> {
    let length = usize::try_from(prefix.get_u32()).unwrap_or(usize::MAX);
    if length == 0 {
        return Err(DecodeError::EmptyFrame);
    }
    if length > MAX_BODY_LEN {
        return Err(DecodeError::FrameTooLarge {
            length,
            max: MAX_BODY_LEN,
        });
    }
    Ok(length)
}

fn decode_body(body: &[u8]) -> Result<Frame, DecodeError> {
    let Some((&kind, rest)) = body.split_first() else {
        return Err(DecodeError::EmptyFrame);
    };
    let kind = FrameKind::try_from(kind).map_err(DecodeError::UnknownKind)?;
    let mut reader = BodyReader { kind, buf: rest };
    let frame = match kind {
        FrameKind::Chunk => Frame::Chunk(reader.chunk()?),
        FrameKind::Register => Frame::Register {
            reply_port: reader.port("reply port")?,
        },
        FrameKind::Cancel => Frame::Cancel {
            reply_port: reader.port("reply port")?,
            request_id: RequestId(reader.int("request id")?),
        },
        FrameKind::CloseClient => Frame::CloseClient {
            reply_port: reader.port("reply port")?,
        },
    };
    reader.finish()?;
    Ok(frame)
}

struct BodyReader<'a> {
    kind: FrameKind,
    buf: &'a [u8],
}

impl BodyReader<'_> {
    fn int(&mut self, field: &'static str) -> Result<i32, DecodeError> {
        if self.buf.remaining() < INT_LEN {
            return Err(self.truncated(field));
        }
        Ok(self.buf.get_i32())
    }

    fn float(&mut self, field: &'static str) -> Result<f64, DecodeError> {
        if self.buf.remaining() < FLOAT_LEN {
            return Err(self.truncated(field));
        }
        Ok(self.buf.get_f64())
    }

    fn port(&mut self, field: &'static str) -> Result<u16, DecodeError> {
        let raw = self.int(field)?;
        u16::try_from(raw)
            .ok()
            .filter(|port| *port != 0)
            .ok_or(DecodeError::InvalidPort(raw))
    }

    fn chunk(&mut self) -> Result<RequestChunk, DecodeError> {
        let reply_port = self.port("reply port")?;
        let order = self.int("order")?;
        let request_id = RequestId(self.int("request id")?);
        let total = self.int("total chunks")?;
        let (Ok(order_index), Ok(total_chunks)) = (u32::try_from(order), u32::try_from(total))
        else {
            return Err(DecodeError::OrderOutOfRange { order, total });
        };
        if order_index >= total_chunks {
            return Err(DecodeError::OrderOutOfRange { order, total });
        }
        let unary = self.operator("unary operator", reply_port, request_id)?;
        let value = self.float("value")?;
        let binary = self.operator("binary operator", reply_port, request_id)?;
        Ok(RequestChunk {
            reply_port,
            order: order_index,
            request_id,
            total_chunks,
            operand: Operand {
                unary,
                value,
                binary,
            },
        })
    }

    fn operator(
        &mut self,
        field: &'static str,
        reply_port: u16,
        request_id: RequestId,
    ) -> Result<Option<OperatorTag>, DecodeError> {
        let raw_len = self.int(field)?;
        if raw_len == ABSENT_OPERATOR {
            return Ok(None);
        }
        let Ok(len) = usize::try_from(raw_len) else {
            return Err(DecodeError::InvalidOperatorLength(raw_len));
        };
        if len == 0 {
            return Err(DecodeError::InvalidOperatorLength(raw_len));
        }
        if self.buf.remaining() < len {
            return Err(self.truncated(field));
        }
        let (tag, rest) = self.buf.split_at(len);
        self.buf = rest;
        std::str::from_utf8(tag)
            .ok()
            .and_then(|name| name.parse::<OperatorTag>().ok())
            .map(Some)
            .ok_or_else(|| DecodeError::UnknownOperator {
                reply_port,
                request_id,
                tag: String::from_utf8_lossy(tag).into_owned(),
            })
    }

    fn finish(self) -> Result<(), DecodeError> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(DecodeError::TrailingBytes {
                kind: self.kind,
                count: self.buf.len(),
            })
        }
    }

    fn truncated(&self, field: &'static str) -> DecodeError {
        DecodeError::Truncated {
            kind: self.kind,
            field,
        }
    }
}
