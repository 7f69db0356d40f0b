//! Single-occupancy slots.
//!
//! A `Slot` guards a resource that may exist at most once per owner (one memory
//! window per system, one bridge transport per system). Claiming the slot hands
//! out a `SlotLease`; the slot becomes free again when the lease is dropped, so
//! a new resource may be created after the old one is closed.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A named, claim-once resource slot.
pub struct Slot {
    name: &'static str,
    occupied: Arc<AtomicBool>,
}

impl Slot {
    /// Creates a free slot.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            occupied: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Claims the slot, or returns `None` if a lease is still live.
    pub fn claim(&self) -> Option<SlotLease> {
        self.occupied
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SlotLease {
                name: self.name,
                occupied: Arc::clone(&self.occupied),
            })
    }

    /// Returns `true` while a lease is live.
    pub fn is_occupied(&self) -> bool {
        self.occupied.load(Ordering::Acquire)
    }

    /// Returns the slot name.
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("name", &self.name)
            .field("occupied", &self.is_occupied())
            .finish()
    }
}

/// Proof of occupancy; frees the slot on drop.
pub struct SlotLease {
    name: &'static str,
    occupied: Arc<AtomicBool>,
}

impl SlotLease {
    /// Returns the name of the slot this lease holds.
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for SlotLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotLease").field("name", &self.name).finish()
    }
}

impl Drop for SlotLease {
    fn drop(&mut self) {
        self.occupied.store(false, Ordering::Release);
    }
}
