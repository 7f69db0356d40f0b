//! System construction and top-level `System` type.
//!
//! The system owns what the host attaches to its physical address space. It performs:
//! 1. **Window setup:** Configures at most one memory window from configuration.
//! 2. **Realize:** Allocates the window buffer or connects its bridge.
//! 3. **Dispatch:** Routes absolute-address transactions to the window.
//! 4. **Teardown:** Closes the bridge and frees both single-instance slots.

use tracing::{info, warn};

use crate::common::data::MemTx;
use crate::common::error::{ConfigError, RealizeError};
use crate::common::slot::{Slot, SlotLease};
use crate::config::Config;
use crate::soc::memory::{MemoryWindow, WindowMode};
use crate::soc::traits::MmioDevice;

struct Attached {
    window: MemoryWindow,
    _lease: SlotLease,
}

/// Top-level system instance.
///
/// Holds the window slot (one memory window per system), the bridge slot (one
/// bridge transport per system), and the attached window if any.
pub struct System {
    window_slot: Slot,
    bridge_slot: Slot,
    attached: Option<Attached>,
}

impl Default for System {
    fn default() -> Self {
        Self::new()
    }
}

impl System {
    /// Creates an empty system with both slots free.
    pub fn new() -> Self {
        Self {
            window_slot: Slot::new("memory-window"),
            bridge_slot: Slot::new("bridge-transport"),
            attached: None,
        }
    }

    /// Builds a system with the window described by `config` (configured, not realized).
    ///
    /// # Errors
    ///
    /// Any `ConfigError` from the window section.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let mut system = Self::new();
        system.add_window(config.window.base, config.window.size, config.window_mode()?)?;
        Ok(system)
    }

    /// Configures and attaches the memory window.
    ///
    /// # Errors
    ///
    /// * `WindowExists` - a window is already attached.
    /// * Everything [`MemoryWindow::configure`] reports.
    pub fn add_window(&mut self, base: u64, size: u64, mode: WindowMode) -> Result<(), ConfigError> {
        let lease = self.window_slot.claim().ok_or(ConfigError::WindowExists)?;
        let window = MemoryWindow::configure(base, size, mode)?;
        self.attached = Some(Attached {
            window,
            _lease: lease,
        });
        Ok(())
    }

    /// Realizes the attached window; a system without one has nothing to do.
    ///
    /// # Errors
    ///
    /// Everything [`MemoryWindow::realize`] reports.
    pub fn realize(&mut self) -> Result<(), RealizeError> {
        match &mut self.attached {
            Some(attached) => attached.window.realize(&self.bridge_slot),
            None => Ok(()),
        }
    }

    /// Returns the attached window.
    pub fn window(&self) -> Option<&MemoryWindow> {
        self.attached.as_ref().map(|a| &a.window)
    }

    /// Returns the attached window mutably.
    pub fn window_mut(&mut self) -> Option<&mut MemoryWindow> {
        self.attached.as_mut().map(|a| &mut a.window)
    }

    /// Returns the slot guarding this system's bridge transport.
    pub const fn bridge_slot(&self) -> &Slot {
        &self.bridge_slot
    }

    /// Reads `size` bytes at physical address `addr`.
    ///
    /// Addresses outside every attached device report [`MemTx::Error`].
    pub fn read(&mut self, addr: u64, size: u32) -> (MemTx, u64) {
        match self.route(addr) {
            Some((device, offset)) => device.mem_read(offset, size),
            None => {
                warn!(addr = format_args!("{addr:#x}"), size, "read from unmapped address");
                (MemTx::Error, 0)
            }
        }
    }

    /// Writes the low `size` bytes of `value` at physical address `addr`.
    pub fn write(&mut self, addr: u64, size: u32, value: u64) -> MemTx {
        match self.route(addr) {
            Some((device, offset)) => device.mem_write(offset, size, value),
            None => {
                warn!(addr = format_args!("{addr:#x}"), size, "write to unmapped address");
                MemTx::Error
            }
        }
    }

    /// Resets every attached device.
    pub fn reset(&mut self) {
        if let Some(attached) = &mut self.attached {
            MmioDevice::reset(&mut attached.window);
        }
    }

    /// Tears down and detaches the window, freeing both slots.
    ///
    /// Returns `false` if no window was attached.
    pub fn detach_window(&mut self) -> bool {
        match self.attached.take() {
            Some(attached) => {
                attached.window.teardown();
                info!("memory window detached");
                true
            }
            None => false,
        }
    }

    fn route(&mut self, addr: u64) -> Option<(&mut dyn MmioDevice, u64)> {
        let attached = self.attached.as_mut()?;
        if !attached.window.contains(addr) {
            return None;
        }
        let offset = addr - attached.window.base();
        Some((&mut attached.window as &mut dyn MmioDevice, offset))
    }
}

impl Drop for System {
    fn drop(&mut self) {
        let _ = self.detach_window();
    }
}

impl std::fmt::Debug for System {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("System")
            .field("window", &self.window())
            .field("bridge_slot", &self.bridge_slot)
            .finish()
    }
}
