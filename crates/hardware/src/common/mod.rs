//! Common types used throughout the memory window and bridge.
//!
//! This module provides the building blocks shared by every component:
//! 1. **Constants:** Window defaults, link latency, and report limits.
//! 2. **Memory Access:** Access sizes, transaction status, and returned words.
//! 3. **Error Handling:** The layered error taxonomy from wire to device.
//! 4. **Slots:** Claim-once leases that make singletons explicit.

/// Common constants used throughout the crate.
pub mod constants;

/// Memory transaction type definitions.
pub mod data;

/// Error types for configuration, transport, protocol, and access failures.
pub mod error;

/// Claim-once resource slots.
pub mod slot;

pub use data::{AccessSize, MemTx, Word};
pub use error::{
    AccessError, BridgeError, ConfigError, ConnectError, FrameError, HandshakeError,
    ProtocolError, RealizeError, TransportError,
};
pub use slot::{Slot, SlotLease};
