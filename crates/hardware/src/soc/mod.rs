//! System-on-Chip components.
//!
//! This module organizes what the host attaches to its physical address space:
//! the memory window device, the trait the dispatcher calls it through, and the
//! `System` that owns the window and its single-instance slots.

/// System construction and address dispatch.
pub mod builder;

/// Memory window device and backing storage.
pub mod memory;

/// Device trait definitions for MMIO access.
pub mod traits;

pub use builder::System;
pub use memory::{MemoryWindow, WindowMode};
pub use traits::MmioDevice;
