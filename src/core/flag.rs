//! Sticky flags shared between interrupt and foreground context

use core::sync::atomic::{AtomicBool, Ordering};

/// One-bit flag set from interrupt context and read by the foreground loop.
///
/// The flag stays set until someone clears it; readers always see the
/// latest value, nothing is cached.
#[derive(Debug)]
pub struct StickyFlag(AtomicBool);

impl StickyFlag {
    pub const fn new(value: bool) -> Self {
        Self(AtomicBool::new(value))
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub fn assign(&self, value: bool) {
        self.0.store(value, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Store `value` and return the previous state
    pub fn replace(&self, value: bool) -> bool {
        self.0.swap(value, Ordering::AcqRel)
    }

    /// Read and clear in one step
    pub fn take(&self) -> bool {
        self.replace(false)
    }
}

impl Default for StickyFlag {
    fn default() -> Self {
        Self::new(false)
    }
}
