//! Frames exchanged between client and server.

use strum::Display;

use crate::operand::{RequestChunk, RequestId};

/// Kind byte following the length prefix of a client frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum FrameKind {
    /// Carries one [`RequestChunk`].
    Chunk = 1,
    /// Names the reply port the sending connection listens for results on.
    Register = 2,
    /// Cancels one request.
    Cancel = 3,
    /// Cancels every request of a client and closes its reply connection.
    CloseClient = 4,
}

impl TryFrom<u8> for FrameKind {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Chunk),
            2 => Ok(Self::Register),
            3 => Ok(Self::Cancel),
            4 => Ok(Self::CloseClient),
            other => Err(other),
        }
    }
}

/// Client-to-server frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Frame {
    /// One operand of a request.
    Chunk(RequestChunk),
    /// The sending connection wants results for `reply_port`.
    Register {
        /// Port the client receives results on.
        reply_port: u16,
    },
    /// Stop work on a request and never answer it.
    Cancel {
        /// Reply port of the owning client.
        reply_port: u16,
        /// Request to cancel.
        request_id: RequestId,
    },
    /// Cancel everything for a client and drop its reply connection.
    CloseClient {
        /// Reply port of the closing client.
        reply_port: u16,
    },
}

impl Frame {
    /// Kind byte for the frame.
    #[must_use]
    pub const fn kind(&self) -> FrameKind {
        match self {
            Self::Chunk(_) => FrameKind::Chunk,
            Self::Register { .. } => FrameKind::Register,
            Self::Cancel { .. } => FrameKind::Cancel,
            Self::CloseClient { .. } => FrameKind::CloseClient,
        }
    }
}

/// Server-to-client frame carrying a finished result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResponseFrame {
    /// Request the value answers.
    pub request_id: RequestId,
    /// Reduced value.
    pub value: f64,
}
