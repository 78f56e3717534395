//! Bindless texture handle bookkeeping.
//!
//! Models the driver contract for bindless (resident) texture handles: a
//! handle is acquired once, made resident exactly once before any shader may
//! read through it, and made non-resident exactly once when its texture is
//! destroyed. Violating that pairing is undefined behavior on a real driver,
//! so here it surfaces as [`AtelierError::ResidencyViolation`].

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::errors::{AtelierError, Result};

/// Opaque 64-bit handle as stored in the texture-handle storage buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindlessHandle(u64);

impl BindlessHandle {
    #[inline]
    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Residency {
    Acquired,
    Resident,
    Retired,
}

/// Issues handles and enforces the resident/non-resident lifecycle.
pub struct BindlessAllocator {
    next: AtomicU64,
    states: Mutex<FxHashMap<BindlessHandle, Residency>>,
}

impl Default for BindlessAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl BindlessAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            // 0 is reserved as a null handle.
            next: AtomicU64::new(1),
            states: Mutex::new(FxHashMap::default()),
        }
    }

    /// Issues a fresh handle in the `Acquired` state.
    pub fn acquire(&self) -> BindlessHandle {
        let handle = BindlessHandle(self.next.fetch_add(1, Ordering::Relaxed));
        self.states.lock().insert(handle, Residency::Acquired);
        handle
    }

    /// Transitions `handle` from acquired to resident.
    pub fn make_resident(&self, handle: BindlessHandle) -> Result<()> {
        let mut states = self.states.lock();
        match states.get(&handle) {
            Some(Residency::Acquired) => {
                states.insert(handle, Residency::Resident);
                Ok(())
            }
            Some(Residency::Resident) => Err(AtelierError::ResidencyViolation(
                "handle is already resident",
            )),
            Some(Residency::Retired) => Err(AtelierError::ResidencyViolation(
                "handle was already retired",
            )),
            None => Err(AtelierError::ResidencyViolation(
                "handle was never acquired",
            )),
        }
    }

    /// Transitions `handle` from resident to retired. A retired handle can
    /// never become resident again.
    pub fn make_non_resident(&self, handle: BindlessHandle) -> Result<()> {
        let mut states = self.states.lock();
        match states.get(&handle) {
            Some(Residency::Resident) => {
                states.insert(handle, Residency::Retired);
                Ok(())
            }
            Some(Residency::Acquired) => Err(AtelierError::ResidencyViolation(
                "handle was never made resident",
            )),
            Some(Residency::Retired) => Err(AtelierError::ResidencyViolation(
                "handle was already retired",
            )),
            None => Err(AtelierError::ResidencyViolation(
                "handle was never acquired",
            )),
        }
    }

    /// Number of currently resident handles.
    #[must_use]
    pub fn resident_count(&self) -> usize {
        self.states
            .lock()
            .values()
            .filter(|s| **s == Residency::Resident)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn residency_is_exactly_once() {
        let alloc = BindlessAllocator::new();
        let h = alloc.acquire();

        alloc.make_resident(h).unwrap();
        assert!(alloc.make_resident(h).is_err());

        alloc.make_non_resident(h).unwrap();
        assert!(alloc.make_non_resident(h).is_err());
        assert!(alloc.make_resident(h).is_err());
        assert_eq!(alloc.resident_count(), 0);
    }

    #[test]
    fn non_resident_before_resident_is_an_error() {
        let alloc = BindlessAllocator::new();
        let h = alloc.acquire();
        assert!(matches!(
            alloc.make_non_resident(h),
            Err(AtelierError::ResidencyViolation(_))
        ));
    }

    #[test]
    fn handles_are_unique_and_nonzero() {
        let alloc = BindlessAllocator::new();
        let a = alloc.acquire();
        let b = alloc.acquire();
        assert_ne!(a, b);
        assert_ne!(a.as_u64(), 0);
    }
}
