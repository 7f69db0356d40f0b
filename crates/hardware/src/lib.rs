//! Far-off memory window and co-simulation bridge.
//!
//! This crate attaches a memory region to a simulated physical address space
//! and optionally backs it by an external memory simulator. It provides:
//! 1. **Window:** A device mapping `[base, base + size)` onto a local buffer or the bridge.
//! 2. **Bridge:** Unix-socket transport, introduction handshake, and read/write request protocol.
//! 3. **System:** Owner of the window and its single-instance slots; absolute-address dispatch.
//! 4. **Profiler:** Hot-block execution counts and instruction throughput reporting.
//! 5. **Configuration:** JSON-deserializable settings for all of the above.

/// Socket bridge to the external memory backend (wire, transport, protocol, peer).
pub mod bridge;
/// Common types (access sizes, transaction status, errors, slots, constants).
pub mod common;
/// Configuration (defaults, window, socket, profiler sections).
pub mod config;
/// Hot-block execution profiler.
pub mod profiler;
/// System and its devices (window, MMIO trait).
pub mod soc;

/// Root configuration type; use `Config::default()` or deserialize from JSON.
pub use crate::config::Config;
/// Hot-block table; construct with `HotBlocks::new`.
pub use crate::profiler::HotBlocks;
/// Top-level system; construct with `System::new` or `System::from_config`.
pub use crate::soc::System;
