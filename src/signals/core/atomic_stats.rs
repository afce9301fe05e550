/*!
 * Lock-Free Signal Statistics
 * Uses atomic counters for zero-contention stats tracking in hot paths
 */

use super::types::ProcSignalStats;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Atomic signal statistics for lock-free updates
///
/// Process-local. Never touched from the OS signal context.
#[repr(C, align(64))]
pub struct AtomicProcSignalStats {
    signals_sent: AtomicU64,
    send_failures: AtomicU64,
    deferred_passes: AtomicU64,
    handlers_invoked: AtomicU64,
    pending_dropped: AtomicU64,
    handlers_registered: AtomicUsize,
}

impl AtomicProcSignalStats {
    #[inline]
    pub const fn new() -> Self {
        Self {
            signals_sent: AtomicU64::new(0),
            send_failures: AtomicU64::new(0),
            deferred_passes: AtomicU64::new(0),
            handlers_invoked: AtomicU64::new(0),
            pending_dropped: AtomicU64::new(0),
            handlers_registered: AtomicUsize::new(0),
        }
    }

    #[inline(always)]
    pub fn inc_sent(&self) {
        self.signals_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_send_failures(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_passes(&self) {
        self.deferred_passes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_invoked(&self) {
        self.handlers_invoked.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_dropped(&self) {
        self.pending_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_registered(&self) {
        self.handlers_registered.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of current stats (no locks required)
    ///
    /// # Note
    /// Values may not be perfectly consistent with each other due to concurrent updates,
    /// but each individual value is accurate. This is acceptable for monitoring.
    #[inline]
    pub fn snapshot(&self) -> ProcSignalStats {
        ProcSignalStats {
            signals_sent: self.signals_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            deferred_passes: self.deferred_passes.load(Ordering::Relaxed),
            handlers_invoked: self.handlers_invoked.load(Ordering::Relaxed),
            pending_dropped: self.pending_dropped.load(Ordering::Relaxed),
            handlers_registered: self.handlers_registered.load(Ordering::Relaxed),
        }
    }
}

impl Default for AtomicProcSignalStats {
    fn default() -> Self {
        Self::new()
    }
}
