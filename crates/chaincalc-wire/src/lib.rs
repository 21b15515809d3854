//! Shared wire types for the chaincalc client and server.
//!
//! A calculation is a chain of [`Operand`]s. The client ships each operand as
//! a self-describing [`RequestChunk`] so the server can reassemble the chain
//! regardless of the order in which chunks arrive. This crate owns the fixed
//! operator set, the in-memory model, and the binary codec used on every TCP
//! connection between the two sides.
//!
//! ## Framing
//!
//! Client-to-server traffic is a stream of [`Frame`]s, each prefixed by a
//! big-endian `u32` length and a one-byte kind. [`FrameDecoder`] buffers
//! partial reads so a frame split across TCP segments decodes the same as one
//! delivered whole. Server-to-client traffic is a stream of fixed-size
//! [`ResponseFrame`]s.

mod codec;
mod errors;
mod frame;
mod operand;
mod operator;

pub use codec::{
    FrameDecoder, MAX_FRAME_LEN, RESPONSE_FRAME_LEN, WIRE_TAG_ALLOWANCE, decode_frame,
    decode_response, encode_frame, encode_response,
};
pub use errors::{DecodeError, OperatorError};
pub use frame::{Frame, FrameKind, ResponseFrame};
pub use operand::{Operand, RequestChunk, RequestId, RequestKey};
pub use operator::{BinaryOp, MAX_TAG_LEN, OperatorTag, UnaryOp};
