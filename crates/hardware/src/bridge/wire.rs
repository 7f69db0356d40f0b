//! Bridge wire format.
//!
//! Everything on the socket is little-endian. Two kinds of records exist:
//!
//! # Introduction record (32 bytes, exchanged once per connection)
//!
//! ```text
//! [magic:u32][version:u16][role:u8][flags:u8][link_latency:u64][reserved:16]
//! ```
//!
//! # Frame (16-byte header followed by `body_len` bytes)
//!
//! ```text
//! [msg_type:u8][reserved:3][body_len:u32][timestamp:u64][body...]
//! ```
//!
//! The timestamp is the logical time at which the frame becomes visible to the
//! receiver (sender clock plus link latency).

use std::io::{self, Read, Write};

use crate::common::error::{FrameError, HandshakeError, TransportError};

/// Introduction magic, `"FMEM"` in little-endian byte order.
pub const INTRO_MAGIC: u32 = u32::from_le_bytes(*b"FMEM");

/// Protocol version carried in the introduction record.
pub const PROTOCOL_VERSION: u16 = 1;

/// Size of an introduction record in bytes.
pub const INTRO_LEN: usize = 32;

/// Size of a frame header in bytes.
pub const FRAME_HEADER_LEN: usize = 16;

/// Largest accepted frame body.
pub const MAX_BODY_LEN: u32 = 4096;

const FLAG_SYNC_REQUIRED: u8 = 1 << 0;

/// Frame message types.
pub mod msg {
    /// Logical-time synchronization; empty body.
    pub const SYNC: u8 = 0x01;
    /// Orderly shutdown; empty body.
    pub const TERMINATE: u8 = 0x02;
    /// Host to memory: read request.
    pub const H2M_READ: u8 = 0x60;
    /// Host to memory: write request.
    pub const H2M_WRITE: u8 = 0x61;
    /// Memory to host: read completion.
    pub const M2H_READ_COMPLETE: u8 = 0x60;
    /// Memory to host: write completion.
    pub const M2H_WRITE_COMPLETE: u8 = 0x61;
}

/// Which end of the bridge a record came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// The emulator side that issues requests.
    Host = 1,
    /// The memory backend that answers them.
    Memory = 2,
}

impl Role {
    const fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::Host),
            2 => Some(Self::Memory),
            _ => None,
        }
    }
}

/// Introduction record exchanged during connection establishment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Intro {
    /// Role of the sender.
    pub role: Role,
    /// Sender requires logical-time synchronization.
    pub sync_required: bool,
    /// Sender's link latency, informational.
    pub link_latency: u64,
}

impl Intro {
    /// Encodes the record.
    pub fn encode(&self) -> [u8; INTRO_LEN] {
        let mut buf = [0u8; INTRO_LEN];
        buf[0..4].copy_from_slice(&INTRO_MAGIC.to_le_bytes());
        buf[4..6].copy_from_slice(&PROTOCOL_VERSION.to_le_bytes());
        buf[6] = self.role as u8;
        buf[7] = if self.sync_required {
            FLAG_SYNC_REQUIRED
        } else {
            0
        };
        buf[8..16].copy_from_slice(&self.link_latency.to_le_bytes());
        buf
    }

    /// Decodes and validates a record.
    ///
    /// # Errors
    ///
    /// `BadMagic`, `VersionMismatch`, or `RoleMismatch` for an unknown role byte.
    pub fn decode(buf: &[u8; INTRO_LEN]) -> Result<Self, HandshakeError> {
        let magic = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        if magic != INTRO_MAGIC {
            return Err(HandshakeError::BadMagic(magic));
        }
        let version = u16::from_le_bytes([buf[4], buf[5]]);
        if version != PROTOCOL_VERSION {
            return Err(HandshakeError::VersionMismatch {
                local: PROTOCOL_VERSION,
                remote: version,
            });
        }
        let role = Role::from_u8(buf[6]).ok_or(HandshakeError::RoleMismatch(buf[6]))?;
        let mut latency = [0u8; 8];
        latency.copy_from_slice(&buf[8..16]);
        Ok(Self {
            role,
            sync_required: buf[7] & FLAG_SYNC_REQUIRED != 0,
            link_latency: u64::from_le_bytes(latency),
        })
    }
}

/// Sends `local`, then receives and validates the peer's record.
///
/// Both sides write before they read, so the exchange cannot deadlock on the
/// fixed-size records. There is no retry.
///
/// # Errors
///
/// Any I/O failure (including EOF from a peer that closed), a malformed record,
/// a peer with the wrong role, or disagreeing sync requirements.
pub fn exchange_intro<S: Read + Write>(
    stream: &mut S,
    local: &Intro,
    expected_peer: Role,
) -> Result<Intro, HandshakeError> {
    stream.write_all(&local.encode())?;
    stream.flush()?;

    let mut buf = [0u8; INTRO_LEN];
    stream.read_exact(&mut buf)?;
    let remote = Intro::decode(&buf)?;

    if remote.role != expected_peer {
        return Err(HandshakeError::RoleMismatch(remote.role as u8));
    }
    if remote.sync_required != local.sync_required {
        return Err(HandshakeError::SyncMismatch {
            local: local.sync_required,
            remote: remote.sync_required,
        });
    }
    Ok(remote)
}

/// One received frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Message type discriminant (see [`msg`]).
    pub msg_type: u8,
    /// Logical time at which the frame became visible.
    pub timestamp: u64,
    /// Message body.
    pub body: Vec<u8>,
}

/// Writes one frame with a single `write_all`.
///
/// # Errors
///
/// `FrameError::Oversized` (as `InvalidInput`) if the body exceeds [`MAX_BODY_LEN`],
/// or any socket error.
pub fn write_frame<W: Write>(
    writer: &mut W,
    msg_type: u8,
    timestamp: u64,
    body: &[u8],
) -> io::Result<()> {
    let body_len = u32::try_from(body.len())
        .ok()
        .filter(|len| *len <= MAX_BODY_LEN)
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                FrameError::Oversized(body.len().min(u32::MAX as usize) as u32),
            )
        })?;

    let mut buf = Vec::with_capacity(FRAME_HEADER_LEN + body.len());
    buf.push(msg_type);
    buf.extend_from_slice(&[0u8; 3]);
    buf.extend_from_slice(&body_len.to_le_bytes());
    buf.extend_from_slice(&timestamp.to_le_bytes());
    buf.extend_from_slice(body);
    writer.write_all(&buf)?;
    writer.flush()
}

/// Reads one frame, blocking until it is complete.
///
/// # Errors
///
/// `Closed` on EOF, `TimedOut` if a read timeout set on the socket expires,
/// `Frame(Oversized)` for an absurd length, `Io` otherwise.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Frame, TransportError> {
    let mut header = [0u8; FRAME_HEADER_LEN];
    reader.read_exact(&mut header).map_err(classify_io)?;

    let msg_type = header[0];
    let body_len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    if body_len > MAX_BODY_LEN {
        return Err(FrameError::Oversized(body_len).into());
    }
    let mut ts = [0u8; 8];
    ts.copy_from_slice(&header[8..16]);

    let mut body = vec![0u8; body_len as usize];
    reader.read_exact(&mut body).map_err(classify_io)?;

    Ok(Frame {
        msg_type,
        timestamp: u64::from_le_bytes(ts),
        body,
    })
}

/// Maps socket errors onto the transport taxonomy.
pub(crate) fn classify_io(err: io::Error) -> TransportError {
    match err.kind() {
        io::ErrorKind::UnexpectedEof
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::BrokenPipe => TransportError::Closed,
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => TransportError::TimedOut,
        _ => TransportError::Io(err),
    }
}
