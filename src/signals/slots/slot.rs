/*!
 * Process Slot
 * Per-process pending-flag record living in shared memory
 */

use crate::core::limits::NUM_PROCSIGNALS;
use crate::core::types::{Pid, EMPTY_PID};
use crate::signals::core::types::ProcSignalReason;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

/// Shared per-process record
///
/// All-zero bytes are a valid, unowned slot, which lets the registry hand out
/// freshly mapped anonymous memory without initialising it.
///
/// Any process may raise flags here; only the owner clears them.
#[repr(C, align(64))]
pub struct ProcessSlot {
    pid: AtomicI32,
    flags: [AtomicBool; NUM_PROCSIGNALS],
}

impl ProcessSlot {
    pub const fn new() -> Self {
        Self {
            pid: AtomicI32::new(EMPTY_PID),
            flags: [const { AtomicBool::new(false) }; NUM_PROCSIGNALS],
        }
    }

    /// Pid of the owning process, `EMPTY_PID` if unowned
    #[inline]
    pub fn pid(&self) -> Pid {
        self.pid.load(Ordering::Acquire)
    }

    /// Whether the slot is owned by a live process
    #[inline]
    pub fn is_owned(&self) -> bool {
        self.pid() != EMPTY_PID
    }

    /// Zero the flags, then publish `pid` as owner
    pub(crate) fn claim(&self, pid: Pid) {
        for flag in &self.flags {
            flag.store(false, Ordering::Relaxed);
        }
        self.pid.store(pid, Ordering::Release);
    }

    /// Reset the owner to empty if it is still `pid`
    ///
    /// Returns the pid found in the slot when it belongs to someone else.
    pub(crate) fn release(&self, pid: Pid) -> Result<(), Pid> {
        self.pid
            .compare_exchange(pid, EMPTY_PID, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
    }

    /// Set the pending flag for `reason`
    #[inline]
    pub fn raise(&self, reason: ProcSignalReason) {
        self.flags[reason.index()].store(true, Ordering::SeqCst);
    }

    /// Consume the pending flag for `reason`
    ///
    /// Async-signal-safe. Returns whether the flag was set.
    #[inline]
    pub fn check_and_clear(&self, reason: ProcSignalReason) -> bool {
        self.flags[reason.index()].swap(false, Ordering::SeqCst)
    }

    /// Peek at the pending flag for `reason` without consuming it
    #[inline]
    pub fn is_pending(&self, reason: ProcSignalReason) -> bool {
        self.flags[reason.index()].load(Ordering::SeqCst)
    }
}

impl Default for ProcessSlot {
    fn default() -> Self {
        Self::new()
    }
}
