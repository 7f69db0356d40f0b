//! Error taxonomy for the memory window and its bridge.
//!
//! Errors are layered the way failures propagate upward:
//! 1. **Wire:** `FrameError` and `HandshakeError` describe malformed bytes on the socket.
//! 2. **Transport:** `ConnectError` (setup) and `TransportError` (a live session).
//! 3. **Protocol:** `ProtocolError` for completions that do not match the request.
//! 4. **Bridge:** `BridgeError` joins the above with the single-outstanding rule.
//! 5. **Device:** `ConfigError`, `RealizeError`, and the per-access `AccessError`.
//!
//! None of these are retried anywhere. Setup errors abort construction; access
//! errors fail exactly one transaction.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Invalid window or socket configuration, detected before realize.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The window has no bytes.
    #[error("memory window size must be non-zero")]
    ZeroSize,

    /// `base + size` does not fit in the 64-bit physical address space.
    #[error("memory window {base:#x}+{size:#x} overflows the address space")]
    WindowOverflow {
        /// Requested base address.
        base: u64,
        /// Requested size in bytes.
        size: u64,
    },

    /// Bridging was requested but no socket path was given.
    #[error("bridged memory window requires a socket path")]
    MissingSocketPath,

    /// Bridging was requested but nothing exists at the socket path.
    #[error("socket path {0} is not reachable")]
    SocketUnreachable(PathBuf),

    /// A memory window is already attached to this system.
    #[error("a memory window is already configured")]
    WindowExists,

    /// The configuration document could not be parsed.
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// The configuration file could not be read.
    #[error("cannot read configuration: {0}")]
    Io(#[from] io::Error),
}

/// Failure while realizing a configured window.
#[derive(Debug, Error)]
pub enum RealizeError {
    /// The local backing buffer could not be allocated.
    #[error("cannot allocate {size:#x} bytes for the window buffer: {source}")]
    Allocation {
        /// Requested buffer size in bytes.
        size: u64,
        /// Underlying OS error.
        source: io::Error,
    },

    /// The bridge to the memory backend could not be established.
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// `realize` was called on a window that is already live.
    #[error("memory window is already realized")]
    AlreadyRealized,
}

/// Failure while bringing up a bridge transport. Fatal to that attempt.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// Another transport already holds the bridge slot.
    #[error("a bridge transport is already connected")]
    AlreadyConnected,

    /// Connection parameters were rejected before any I/O.
    #[error("bridge initialization failed: {0}")]
    Init(&'static str),

    /// The socket connect call failed.
    #[error("cannot connect to {}: {source}", .path.display())]
    Connect {
        /// Socket path that was dialled.
        path: PathBuf,
        /// Underlying OS error.
        source: io::Error,
    },

    /// The socket connected but does not report a peer.
    #[error("socket reports no connected peer")]
    NotConnected,

    /// The introduction exchange failed.
    #[error("bridge handshake failed: {0}")]
    Handshake(#[from] HandshakeError),
}

/// Failure during the introduction-record exchange.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// Reading or writing the introduction record failed (including early EOF).
    #[error("introduction exchange I/O: {0}")]
    Io(#[from] io::Error),

    /// The peer's record does not start with the protocol magic.
    #[error("bad introduction magic {0:#010x}")]
    BadMagic(u32),

    /// The peer speaks a different protocol version.
    #[error("protocol version mismatch: local {local}, remote {remote}")]
    VersionMismatch {
        /// Version sent by this side.
        local: u16,
        /// Version received from the peer.
        remote: u16,
    },

    /// The peer introduced itself with an unexpected role.
    #[error("unexpected peer role {0:#04x}")]
    RoleMismatch(u8),

    /// One side requires synchronization and the other does not.
    #[error("sync mode mismatch: local requires {local}, remote requires {remote}")]
    SyncMismatch {
        /// Whether this side requires synchronization.
        local: bool,
        /// Whether the peer requires synchronization.
        remote: bool,
    },
}

/// Malformed frame on an established connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// The frame announces a body larger than the protocol allows.
    #[error("frame body of {0} bytes exceeds the maximum")]
    Oversized(u32),

    /// The body is too short for the message type it claims to be.
    #[error("frame body truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Minimum body length for the message type.
        expected: usize,
        /// Body length received.
        actual: usize,
    },
}

/// Failure on an established bridge session.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer closed the connection.
    #[error("bridge connection closed by peer")]
    Closed,

    /// The peer sent a terminate message.
    #[error("bridge terminated by peer")]
    Terminated,

    /// A caller-configured poll timeout elapsed.
    #[error("timed out waiting for the bridge peer")]
    TimedOut,

    /// Socket I/O failed.
    #[error("bridge I/O: {0}")]
    Io(#[from] io::Error),

    /// A frame could not be decoded.
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// A completion that does not answer the outstanding request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// A read completion carried fewer bytes than requested.
    #[error("read completion carried {actual} bytes, expected {expected}")]
    ShortPayload {
        /// Bytes requested.
        expected: usize,
        /// Bytes received.
        actual: usize,
    },

    /// The completion type is unknown or does not match the request.
    #[error("unexpected completion type {0:#04x}")]
    UnexpectedKind(u8),

    /// The completion is stamped before the request it answers was sent.
    #[error("completion at t={completion} precedes request at t={request}")]
    CausalityViolation {
        /// Timestamp of the request frame.
        request: u64,
        /// Timestamp of the completion frame.
        completion: u64,
    },

    /// A write payload length did not match the declared access length.
    #[error("payload of {actual} bytes does not match access length {expected}")]
    PayloadLength {
        /// Declared access length.
        expected: usize,
        /// Payload bytes supplied.
        actual: usize,
    },
}

/// Failure of one bridged request.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The peer answered with something unexpected.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A request was submitted while another is still outstanding.
    #[error("request {outstanding} is still outstanding")]
    Reentrancy {
        /// Identifier of the unresolved request.
        outstanding: u64,
    },

    /// A completion was awaited with no request outstanding.
    #[error("no request is outstanding")]
    Idle,

    /// An earlier failure left the bridge unusable.
    #[error("bridge is unusable after an earlier failure")]
    Poisoned,
}

/// Failure of one memory transaction against the window.
#[derive(Debug, Error)]
pub enum AccessError {
    /// The access runs past the end of the window.
    #[error("access {offset:#x}+{len} out of bounds for window of {size:#x} bytes")]
    OutOfBounds {
        /// Window-relative offset.
        offset: u64,
        /// Access length in bytes.
        len: usize,
        /// Window size in bytes.
        size: u64,
    },

    /// The access length is not a bus granularity.
    #[error("invalid access size {0}; expected 1, 2, 4 or 8")]
    InvalidAccessSize(usize),

    /// The window has not been realized.
    #[error("memory window is not realized")]
    NotRealized,

    /// The bridged backend could not complete the access.
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}
