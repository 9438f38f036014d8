//! Frame codec for the duplex channel.
//!
//! Every message on a channel is a compact binary envelope:
//!
//! ```text
//! byte 0        kind tag (0x00 data, 0x01 error, 0x02 ok)
//! bytes 1..3    id length, u16 big-endian
//! bytes 3..3+n  id (opaque token)
//! bytes 3+n..   body (binary-safe, may be empty)
//! ```
//!
//! `decode(encode(f)) == f` for every valid frame.

use thiserror::Error;

/// Sentinel id used when a frame is not correlated with a request, so
/// error replies can still be associated with the channel itself.
pub const SENTINEL_ID: &[u8] = b"streamgate";

const HEADER_LEN: usize = 3;

const TAG_DATA: u8 = 0x00;
const TAG_ERROR: u8 = 0x01;
const TAG_OK: u8 = 0x02;

/// Errors from encoding or decoding a wire frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The buffer is shorter than the fixed header.
    #[error("frame truncated: {len} bytes, need at least {HEADER_LEN}")]
    TruncatedHeader { len: usize },

    /// The kind tag is not one of the known values.
    #[error("unknown frame kind tag {0:#04x}")]
    UnknownKind(u8),

    /// The declared id length runs past the end of the buffer.
    #[error("frame truncated: id length {id_len} exceeds remaining {remaining} bytes")]
    TruncatedId { id_len: usize, remaining: usize },

    /// The id does not fit the u16 length field.
    #[error("frame id too long: {0} bytes")]
    IdTooLong(usize),
}

/// Message kind carried by a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Stream payload, inbound (a write request) or outbound (a push).
    Data,
    /// Structured error, correlated by id when one was given.
    Error,
    /// Acknowledgement of a successfully applied inbound data frame.
    Ok,
}

impl FrameKind {
    const fn tag(self) -> u8 {
        match self {
            Self::Data => TAG_DATA,
            Self::Error => TAG_ERROR,
            Self::Ok => TAG_OK,
        }
    }

    const fn from_tag(tag: u8) -> Result<Self, FrameError> {
        match tag {
            TAG_DATA => Ok(Self::Data),
            TAG_ERROR => Ok(Self::Error),
            TAG_OK => Ok(Self::Ok),
            other => Err(FrameError::UnknownKind(other)),
        }
    }
}

/// The minimal envelope used for framing messages over the duplex channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Opaque correlation token; [`SENTINEL_ID`] when uncorrelated.
    pub id: Vec<u8>,
    pub kind: FrameKind,
    pub body: Vec<u8>,
}

impl Frame {
    /// Build a data frame.
    pub fn data(id: impl Into<Vec<u8>>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            kind: FrameKind::Data,
            body: body.into(),
        }
    }

    /// Build an ok reply correlated with `id`.
    pub fn ok(id: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            kind: FrameKind::Ok,
            body: Vec::new(),
        }
    }

    /// Build an error frame; `id` falls back to the sentinel when absent.
    pub fn error(id: Option<Vec<u8>>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.unwrap_or_else(|| SENTINEL_ID.to_vec()),
            kind: FrameKind::Error,
            body: body.into(),
        }
    }

    /// Encode into the wire representation.
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        let id_len =
            u16::try_from(self.id.len()).map_err(|_| FrameError::IdTooLong(self.id.len()))?;

        let mut buf = Vec::with_capacity(HEADER_LEN + self.id.len() + self.body.len());
        buf.push(self.kind.tag());
        buf.extend_from_slice(&id_len.to_be_bytes());
        buf.extend_from_slice(&self.id);
        buf.extend_from_slice(&self.body);
        Ok(buf)
    }

    /// Decode from the wire representation.
    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        if buf.len() < HEADER_LEN {
            return Err(FrameError::TruncatedHeader { len: buf.len() });
        }

        let kind = FrameKind::from_tag(buf[0])?;
        let id_len = usize::from(u16::from_be_bytes([buf[1], buf[2]]));
        let rest = &buf[HEADER_LEN..];
        if id_len > rest.len() {
            return Err(FrameError::TruncatedId {
                id_len,
                remaining: rest.len(),
            });
        }

        Ok(Self {
            id: rest[..id_len].to_vec(),
            kind,
            body: rest[id_len..].to_vec(),
        })
    }
}
