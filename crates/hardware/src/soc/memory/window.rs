//! Far-off memory window.
//!
//! A `MemoryWindow` occupies `[base, base + size)` of the simulated physical
//! address space. Accesses arrive window-relative and are served either from a
//! local zero-initialized buffer or, when bridged, by the external memory
//! backend over the socket protocol.
//!
//! Lifecycle:
//! 1. **Configure:** Validate placement and mode; nothing is allocated or dialled.
//! 2. **Realize:** Allocate the buffer or connect the bridge.
//! 3. **Access:** Size check, bounds check, then dispatch.
//! 4. **Teardown:** Close the bridge (if any) and release the buffer.

use tracing::{debug, error, info, warn};

use crate::bridge::wire::msg;
use crate::bridge::{BridgeParams, BridgeTransport, Completion, MemProtocol, RequestKind};
use crate::common::data::{AccessSize, MemTx, Word};
use crate::common::error::{AccessError, BridgeError, ConfigError, ProtocolError, RealizeError};
use crate::common::slot::Slot;
use crate::soc::memory::buffer::WindowBuffer;
use crate::soc::traits::MmioDevice;

/// How a window is backed.
#[derive(Clone, Debug)]
pub enum WindowMode {
    /// Local zero-initialized buffer.
    Local,
    /// External memory backend reached through the bridge.
    Bridged(BridgeParams),
}

enum Backing {
    Unrealized,
    Local(WindowBuffer),
    Bridged(MemProtocol<BridgeTransport>),
}

/// Memory window device.
pub struct MemoryWindow {
    base: u64,
    size: u64,
    mode: WindowMode,
    backing: Backing,
}

impl MemoryWindow {
    /// Validates the window placement and mode.
    ///
    /// # Errors
    ///
    /// * `ZeroSize` - `size` is zero.
    /// * `WindowOverflow` - `base + size` does not fit in 64 bits.
    /// * `MissingSocketPath` - bridged with an empty path.
    /// * `SocketUnreachable` - bridged and nothing exists at the path.
    pub fn configure(base: u64, size: u64, mode: WindowMode) -> Result<Self, ConfigError> {
        if size == 0 {
            return Err(ConfigError::ZeroSize);
        }
        if base.checked_add(size).is_none() {
            return Err(ConfigError::WindowOverflow { base, size });
        }
        if let WindowMode::Bridged(params) = &mode {
            if params.socket_path.as_os_str().is_empty() {
                return Err(ConfigError::MissingSocketPath);
            }
            if !params.socket_path.exists() {
                return Err(ConfigError::SocketUnreachable(params.socket_path.clone()));
            }
        }
        debug!(base = format_args!("{base:#x}"), size = format_args!("{size:#x}"), "memory window configured");
        Ok(Self {
            base,
            size,
            mode,
            backing: Backing::Unrealized,
        })
    }

    /// Allocates the local buffer or connects the bridge.
    ///
    /// `bridge_slot` guards the single bridge transport of the owning system.
    ///
    /// # Errors
    ///
    /// * `AlreadyRealized` - called twice.
    /// * `Allocation` - the buffer could not be allocated.
    /// * `Connect` - the bridge could not be established.
    pub fn realize(&mut self, bridge_slot: &Slot) -> Result<(), RealizeError> {
        if !matches!(self.backing, Backing::Unrealized) {
            return Err(RealizeError::AlreadyRealized);
        }
        self.backing = match &self.mode {
            WindowMode::Local => {
                let buffer = usize::try_from(self.size)
                    .map_err(|_| io_too_large())
                    .and_then(WindowBuffer::new)
                    .map_err(|source| RealizeError::Allocation {
                        size: self.size,
                        source,
                    })?;
                Backing::Local(buffer)
            }
            WindowMode::Bridged(params) => {
                let transport = BridgeTransport::connect(bridge_slot, params.clone())?;
                Backing::Bridged(MemProtocol::new(transport))
            }
        };
        info!(
            base = format_args!("{:#x}", self.base),
            size = format_args!("{:#x}", self.size),
            bridged = self.is_bridged(),
            "memory window realized"
        );
        Ok(())
    }

    /// Returns the base address.
    pub const fn base(&self) -> u64 {
        self.base
    }

    /// Returns the size in bytes.
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Returns the configured mode.
    pub const fn mode(&self) -> &WindowMode {
        &self.mode
    }

    /// Returns `true` if accesses go to the external backend.
    pub const fn is_bridged(&self) -> bool {
        matches!(self.mode, WindowMode::Bridged(_))
    }

    /// Returns `true` once `realize` has succeeded.
    pub const fn is_realized(&self) -> bool {
        !matches!(self.backing, Backing::Unrealized)
    }

    /// Returns `true` if `addr` falls inside the window.
    pub const fn contains(&self, addr: u64) -> bool {
        addr >= self.base && addr - self.base < self.size
    }

    /// Returns the bridge transport of a realized bridged window.
    pub fn transport(&self) -> Option<&BridgeTransport> {
        match &self.backing {
            Backing::Bridged(protocol) => Some(protocol.link()),
            _ => None,
        }
    }

    /// Returns the bridge transport mutably, e.g. to advance its clock.
    pub fn transport_mut(&mut self) -> Option<&mut BridgeTransport> {
        match &mut self.backing {
            Backing::Bridged(protocol) => Some(protocol.link_mut()),
            _ => None,
        }
    }

    /// Reads `len` bytes at window offset `offset`.
    ///
    /// # Errors
    ///
    /// `InvalidAccessSize`, `OutOfBounds`, `NotRealized`, or `Bridge` when the
    /// backend fails. Nothing is touched unless the access is valid.
    ///
    /// # Panics
    ///
    /// If a bridged request is issued while another is outstanding.
    pub fn read(&mut self, offset: u64, len: usize) -> Result<Word, AccessError> {
        let size = self.check(offset, len)?;
        match &mut self.backing {
            Backing::Unrealized => Err(AccessError::NotRealized),
            Backing::Local(buffer) => Ok(Word::from_slice(buffer.read_slice(offset as usize, len))),
            Backing::Bridged(protocol) => {
                match protocol.request(RequestKind::Read, offset, size, None) {
                    Ok(Completion::ReadComplete(data)) => Ok(Word::from_slice(&data)),
                    Ok(Completion::WriteComplete) => Err(bridge_failure(
                        offset,
                        ProtocolError::UnexpectedKind(msg::M2H_WRITE_COMPLETE).into(),
                    )),
                    Err(err) => Err(bridge_failure(offset, err)),
                }
            }
        }
    }

    /// Writes `data` at window offset `offset`.
    ///
    /// # Errors
    ///
    /// As for [`read`](Self::read).
    ///
    /// # Panics
    ///
    /// If a bridged request is issued while another is outstanding.
    pub fn write(&mut self, offset: u64, data: &[u8]) -> Result<(), AccessError> {
        let size = self.check(offset, data.len())?;
        match &mut self.backing {
            Backing::Unrealized => Err(AccessError::NotRealized),
            Backing::Local(buffer) => {
                buffer.write_slice(offset as usize, data);
                Ok(())
            }
            Backing::Bridged(protocol) => protocol
                .request(RequestKind::Write, offset, size, Some(data))
                .map(|_| ())
                .map_err(|err| bridge_failure(offset, err)),
        }
    }

    /// Re-zeroes a local window; bridged windows are left alone.
    pub fn reset(&mut self) {
        if let Backing::Local(buffer) = &mut self.backing {
            buffer.zero();
            debug!("memory window reset");
        }
    }

    /// Closes the bridge (if any) and releases the window.
    pub fn teardown(self) {
        if let Backing::Bridged(protocol) = self.backing {
            protocol.into_link().close();
        }
        info!(base = format_args!("{:#x}", self.base), "memory window torn down");
    }

    fn check(&self, offset: u64, len: usize) -> Result<AccessSize, AccessError> {
        let size = AccessSize::try_from(len)?;
        let in_bounds = offset
            .checked_add(len as u64)
            .is_some_and(|end| end <= self.size);
        if !in_bounds {
            warn!(
                offset = format_args!("{offset:#x}"),
                len,
                size = format_args!("{:#x}", self.size),
                "access outside memory window"
            );
            return Err(AccessError::OutOfBounds {
                offset,
                len,
                size: self.size,
            });
        }
        Ok(size)
    }
}

fn io_too_large() -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::OutOfMemory,
        "window does not fit in the host address space",
    )
}

fn bridge_failure(offset: u64, err: BridgeError) -> AccessError {
    if let BridgeError::Reentrancy { outstanding } = err {
        panic!("bridged access at {offset:#x} issued while request {outstanding} is outstanding");
    }
    error!(offset = format_args!("{offset:#x}"), %err, "bridged access failed");
    AccessError::Bridge(err)
}

impl MmioDevice for MemoryWindow {
    fn name(&self) -> &str {
        "far-memory"
    }

    fn address_range(&self) -> (u64, u64) {
        (self.base, self.size)
    }

    fn reset(&mut self) {
        Self::reset(self);
    }

    fn mem_read(&mut self, offset: u64, size: u32) -> (MemTx, u64) {
        match self.read(offset, size as usize) {
            Ok(word) => (MemTx::Ok, word.to_u64()),
            Err(_) => (MemTx::Error, 0),
        }
    }

    fn mem_write(&mut self, offset: u64, size: u32, value: u64) -> MemTx {
        let len = size as usize;
        if AccessSize::try_from(len).is_err() {
            warn!(len, "invalid access size");
            return MemTx::Error;
        }
        let bytes = value.to_le_bytes();
        match self.write(offset, &bytes[..len]) {
            Ok(()) => MemTx::Ok,
            Err(_) => MemTx::Error,
        }
    }
}

impl std::fmt::Debug for MemoryWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryWindow")
            .field("base", &format_args!("{:#x}", self.base))
            .field("size", &format_args!("{:#x}", self.size))
            .field("bridged", &self.is_bridged())
            .field("realized", &self.is_realized())
            .finish()
    }
}
