use std::sync::atomic::{AtomicBool, Ordering};

/// Marks a cycle as running for as long as the guard lives
///
/// Acquisition fails when another holder already owns the flag, so a slow
/// cycle is never overlapped by the next tick or a manual trigger.
pub struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    pub fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
