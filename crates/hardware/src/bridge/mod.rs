//! Socket bridge to an external memory backend.
//!
//! This module forwards window accesses to another process. It provides:
//! 1. **Wire:** Introduction records and length-prefixed, timestamped frames.
//! 2. **Transport:** Connection lifecycle, handshake, send and blocking poll.
//! 3. **Protocol:** Read/write requests and their completions, one in flight.
//! 4. **Peer:** A reference memory backend speaking the other end of the protocol.

/// Reference memory backend (listener side).
pub mod peer;

/// Memory request/response protocol over a `Link`.
pub mod protocol;

/// Connection lifecycle and frame I/O.
pub mod transport;

/// Introduction record and frame encoding.
pub mod wire;

pub use peer::{MemoryBackend, MemoryPeer, PeerSession, PeerStats, VecBackend};
pub use protocol::{Completion, MemProtocol, MemRequest, RequestKind};
pub use transport::{BridgeParams, BridgeTransport, Link, SyncMode};
pub use wire::{Frame, Intro, Role};
