//! Window backing buffer.
//!
//! This module provides a safe wrapper around the raw allocation behind a local
//! memory window. On Unix the bytes come from an anonymous private `mmap`, so
//! pages are only materialized when touched and a multi-gigabyte window costs
//! nothing until it is used. Other platforms fall back to a zeroed `Vec`.

use std::io;
use std::slice;

/// Zero-initialized byte storage for a local window.
///
/// Accessors take `&self`/`&mut self` like a slice; callers bounds-check
/// against the window size first and the slice indexing below panics on a
/// violation.
pub struct WindowBuffer {
    ptr: *mut u8,
    size: usize,
    is_mmap: bool,
}

// SAFETY: the buffer exclusively owns its allocation and hands out borrows
// tied to `&self`/`&mut self`, exactly like a `Box<[u8]>`.
unsafe impl Send for WindowBuffer {}
// SAFETY: shared access is read-only; mutation requires `&mut self`.
unsafe impl Sync for WindowBuffer {}

impl WindowBuffer {
    /// Allocates `size` zeroed bytes.
    ///
    /// # Errors
    ///
    /// The OS error if the mapping fails, or `OutOfMemory` if the fallback
    /// allocation cannot be reserved.
    pub fn new(size: usize) -> io::Result<Self> {
        if size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "window buffer must be non-empty",
            ));
        }

        #[cfg(unix)]
        {
            #[cfg(target_os = "linux")]
            let flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE;
            #[cfg(not(target_os = "linux"))]
            let flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;

            // SAFETY: anonymous mapping with no fixed address; the result is checked below.
            let ptr = unsafe {
                libc::mmap(
                    std::ptr::null_mut(),
                    size,
                    libc::PROT_READ | libc::PROT_WRITE,
                    flags,
                    -1,
                    0,
                )
            };
            if ptr == libc::MAP_FAILED {
                return Err(io::Error::last_os_error());
            }

            Ok(Self {
                ptr: ptr.cast::<u8>(),
                size,
                is_mmap: true,
            })
        }

        #[cfg(not(unix))]
        {
            let mut vec: Vec<u8> = Vec::new();
            vec.try_reserve_exact(size)
                .map_err(|_| io::Error::from(io::ErrorKind::OutOfMemory))?;
            vec.resize(size, 0);
            let mut vec = std::mem::ManuallyDrop::new(vec);
            Ok(Self {
                ptr: vec.as_mut_ptr(),
                size,
                is_mmap: false,
            })
        }
    }

    /// Returns the size of the buffer in bytes.
    pub const fn len(&self) -> usize {
        self.size
    }

    /// Always `false`; empty buffers are rejected at construction.
    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Returns the whole buffer as a slice.
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: `ptr` is valid for `size` initialized bytes for the lifetime of `self`.
        unsafe { slice::from_raw_parts(self.ptr, self.size) }
    }

    /// Returns the whole buffer as a mutable slice.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, and `&mut self` guarantees exclusivity.
        unsafe { slice::from_raw_parts_mut(self.ptr, self.size) }
    }

    /// Reads `len` bytes at `offset`.
    pub fn read_slice(&self, offset: usize, len: usize) -> &[u8] {
        &self.as_slice()[offset..offset + len]
    }

    /// Writes `data` at `offset`.
    pub fn write_slice(&mut self, offset: usize, data: &[u8]) {
        self.as_mut_slice()[offset..offset + data.len()].copy_from_slice(data);
    }

    /// Re-zeroes every byte without reallocating.
    ///
    /// On Linux the pages are handed back with `MADV_DONTNEED`, which makes
    /// the private anonymous mapping read as zero again. Everywhere else, or
    /// if the advice is refused, the bytes are cleared by hand.
    pub fn zero(&mut self) {
        #[cfg(target_os = "linux")]
        {
            if self.is_mmap {
                // SAFETY: the range is exactly our own mapping.
                let rc = unsafe { libc::madvise(self.ptr.cast(), self.size, libc::MADV_DONTNEED) };
                if rc == 0 {
                    return;
                }
            }
        }
        self.as_mut_slice().fill(0);
    }
}

impl Drop for WindowBuffer {
    fn drop(&mut self) {
        if self.is_mmap {
            #[cfg(unix)]
            // SAFETY: `ptr`/`size` came from a successful `mmap` and are unmapped once.
            unsafe {
                let _ = libc::munmap(self.ptr.cast(), self.size);
            }
        } else {
            #[cfg(not(unix))]
            // SAFETY: `ptr` came from a `Vec` with capacity and length `size`.
            unsafe {
                drop(Vec::from_raw_parts(self.ptr, self.size, self.size));
            }
        }
    }
}

impl std::fmt::Debug for WindowBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowBuffer")
            .field("size", &self.size)
            .field("is_mmap", &self.is_mmap)
            .finish()
    }
}
