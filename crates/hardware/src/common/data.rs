//! Memory transaction types.
//!
//! This module defines the vocabulary shared by the window device and the host
//! address-space dispatcher:
//! 1. **Access size:** The bus granularities a transaction may use (1, 2, 4, 8 bytes).
//! 2. **Transaction status:** The `Ok`/`Error` result reported to the host.
//! 3. **Word:** An up-to-8-byte value moved least-significant byte first.

use std::fmt;

use super::error::AccessError;

/// Width of one memory transaction in bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccessSize {
    /// One byte.
    Byte = 1,
    /// Two bytes.
    Half = 2,
    /// Four bytes.
    Word = 4,
    /// Eight bytes.
    Double = 8,
}

impl AccessSize {
    /// All valid sizes, smallest first.
    pub const ALL: [Self; 4] = [Self::Byte, Self::Half, Self::Word, Self::Double];

    /// Returns the size in bytes.
    #[inline]
    pub const fn bytes(self) -> usize {
        self as usize
    }
}

impl TryFrom<usize> for AccessSize {
    type Error = AccessError;

    fn try_from(len: usize) -> Result<Self, Self::Error> {
        match len {
            1 => Ok(Self::Byte),
            2 => Ok(Self::Half),
            4 => Ok(Self::Word),
            8 => Ok(Self::Double),
            other => Err(AccessError::InvalidAccessSize(other)),
        }
    }
}

/// Status of a memory transaction as seen by the host dispatcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemTx {
    /// The access completed.
    Ok,
    /// The access failed; the host raises a bus error.
    Error,
}

impl MemTx {
    /// Returns `true` for [`MemTx::Ok`].
    #[inline]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// Bytes returned by a read, at most eight, least-significant first.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Word {
    bytes: [u8; 8],
    len: u8,
}

impl Word {
    /// Copies `data` into a word. `data` must be at most 8 bytes long.
    pub(crate) fn from_slice(data: &[u8]) -> Self {
        let mut bytes = [0u8; 8];
        bytes[..data.len()].copy_from_slice(data);
        Self {
            bytes,
            len: data.len() as u8,
        }
    }

    /// Returns the valid bytes of this word.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// Returns the number of valid bytes.
    #[inline]
    pub const fn len(&self) -> usize {
        self.len as usize
    }

    /// Returns `true` if the word holds no bytes.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Zero-extends the word into a `u64`, treating byte 0 as least significant.
    #[inline]
    pub const fn to_u64(&self) -> u64 {
        u64::from_le_bytes(self.bytes)
    }
}

impl fmt::Debug for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Word({:02x?})", self.as_bytes())
    }
}
