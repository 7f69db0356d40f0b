//! Far-off memory window.
//!
//! This module implements the window device. It provides:
//! 1. **Buffer:** Lazily mapped, zero-initialized storage for local windows.
//! 2. **Window:** The device that maps a local buffer or the bridge at a physical base address.

/// Window backing storage (`mmap` or `Vec`).
pub mod buffer;

/// Window device, its mode, and `MmioDevice` implementation.
pub mod window;

pub use buffer::WindowBuffer;
pub use window::{MemoryWindow, WindowMode};
