//! Device trait for memory-mapped I/O.
//!
//! This module defines the `MmioDevice` trait through which the host address
//! space dispatches transactions. It provides:
//! 1. **Identification:** `name` and `address_range` for routing.
//! 2. **Access:** Sized reads and writes at device-relative offsets, reported as `MemTx`.
//! 3. **Lifecycle:** `reset` on system reset.

use crate::common::data::MemTx;

/// A device mapped into the simulated physical address space.
///
/// Values cross the trait as `u64` holding `size` bytes, least-significant
/// first. Failures never panic; they are reported as [`MemTx::Error`] and the
/// host raises a bus error.
pub trait MmioDevice: Send {
    /// Returns a short name for this device.
    fn name(&self) -> &str;

    /// Returns `(base_address, size_in_bytes)`.
    fn address_range(&self) -> (u64, u64);

    /// Restores the power-on state.
    fn reset(&mut self);

    /// Reads `size` bytes at `offset`; the value is zero-extended.
    fn mem_read(&mut self, offset: u64, size: u32) -> (MemTx, u64);

    /// Writes the low `size` bytes of `value` at `offset`.
    fn mem_write(&mut self, offset: u64, size: u32, value: u64) -> MemTx;
}
