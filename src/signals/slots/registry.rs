/*!
 * Slot Registry
 *
 * Shared array of process slots, mapped `MAP_SHARED | MAP_ANONYMOUS` so that
 * every process forked after creation sees the same slots.
 *
 * # Ownership
 *
 * - Each process claims exactly one slot at start (`init`) and releases it
 *   on exit through the returned `SlotGuard`
 * - Any process may raise flags in any slot, but only through `send`
 * - Only the owner consumes its flags
 */

use super::notifier::{KillNotifier, ProcessNotifier};
use super::slot::ProcessSlot;
use crate::core::config::ProcSignalConfig;
use crate::core::errors::{ProcSignalError, SignalResult};
use crate::core::types::{current_pid, Pid, SlotId, EMPTY_PID};
use crate::signals::core::atomic_stats::AtomicProcSignalStats;
use crate::signals::core::types::{ProcSignalReason, ProcSignalStats};
use nix::sys::mman::{mmap_anonymous, munmap, MapFlags, ProtFlags};
use std::mem::size_of;
use std::num::NonZeroUsize;
use std::ptr::NonNull;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shared-memory slot registry
pub struct SlotRegistry {
    base: NonNull<ProcessSlot>,
    num_slots: usize,
    mapped_len: usize,
    notifier: Box<dyn ProcessNotifier>,
    stats: AtomicProcSignalStats,
}

// The mapping holds only atomics and is never remapped while the registry lives.
unsafe impl Send for SlotRegistry {}
unsafe impl Sync for SlotRegistry {}

impl SlotRegistry {
    /// Map a registry of `num_slots` slots notifying with SIGUSR1
    pub fn create(num_slots: usize) -> SignalResult<Self> {
        Self::with_notifier(num_slots, Box::new(KillNotifier::default()))
    }

    /// Map a registry sized and signalled according to `config`
    pub fn from_config(config: &ProcSignalConfig) -> SignalResult<Self> {
        let notifier = KillNotifier::new(config.notify_signal.as_signal());
        Self::with_notifier(config.max_slots, Box::new(notifier))
    }

    /// Map a registry with a custom notifier
    pub fn with_notifier(
        num_slots: usize,
        notifier: Box<dyn ProcessNotifier>,
    ) -> SignalResult<Self> {
        let bytes = size_of::<ProcessSlot>() * num_slots;
        let length = NonZeroUsize::new(bytes).ok_or(ProcSignalError::EmptyRegistry)?;

        // Fresh anonymous pages are zeroed, which is an unowned slot with no flags.
        let mapping = unsafe {
            mmap_anonymous(
                None,
                length,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
            )
        }
        .map_err(|errno| ProcSignalError::SharedMemory { bytes, errno })?;

        info!(
            num_slots,
            bytes,
            notifier = notifier.name(),
            "Process signal slot registry mapped"
        );

        Ok(Self {
            base: mapping.cast::<ProcessSlot>(),
            num_slots,
            mapped_len: bytes,
            notifier,
            stats: AtomicProcSignalStats::new(),
        })
    }

    /// Number of slots
    #[inline]
    pub fn len(&self) -> usize {
        self.num_slots
    }

    /// Always false; a registry has at least one slot
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_slots == 0
    }

    /// All slots
    #[inline]
    pub fn slots(&self) -> &[ProcessSlot] {
        unsafe { std::slice::from_raw_parts(self.base.as_ptr(), self.num_slots) }
    }

    /// Slot at `index`
    pub fn slot(&self, index: SlotId) -> SignalResult<&ProcessSlot> {
        self.slots()
            .get(index)
            .ok_or(ProcSignalError::SlotOutOfRange {
                index,
                max: self.num_slots,
            })
    }

    /// Claim slot `slot_index` for the calling process
    ///
    /// Zeroes the slot's flags and records the caller's pid. Dropping the
    /// returned guard releases the slot.
    pub fn init(self: &Arc<Self>, slot_index: SlotId) -> SignalResult<SlotGuard> {
        let slot = self.slot(slot_index)?;
        let pid = current_pid();

        let previous = slot.pid();
        if previous != EMPTY_PID && previous != pid {
            warn!(
                pid,
                slot = slot_index,
                previous,
                "Taking over process signal slot that is not empty"
            );
        }

        slot.claim(pid);
        debug!(pid, slot = slot_index, "Process signal slot claimed");

        Ok(SlotGuard {
            registry: Arc::clone(self),
            index: slot_index,
            pid,
        })
    }

    /// Release slot `slot_index` held by `pid`
    ///
    /// A slot already taken over by another process is left untouched.
    pub fn cleanup(&self, slot_index: SlotId, pid: Pid) {
        let Ok(slot) = self.slot(slot_index) else {
            warn!(pid, slot = slot_index, "Cleanup of out-of-range slot ignored");
            return;
        };

        match slot.release(pid) {
            Ok(()) => debug!(pid, slot = slot_index, "Process signal slot released"),
            Err(EMPTY_PID) => {
                debug!(pid, slot = slot_index, "Process signal slot already released")
            }
            Err(owner) => warn!(
                pid,
                slot = slot_index,
                owner,
                "Releasing process signal slot, but it contains a different pid"
            ),
        }
    }

    /// Index of the slot owned by `pid`, newest slots first
    pub fn find(&self, pid: Pid) -> Option<SlotId> {
        if pid == EMPTY_PID {
            return None;
        }
        self.slots().iter().rposition(|slot| slot.pid() == pid)
    }

    /// Raise `reason` for `pid` and notify it
    ///
    /// With a slot id, the slot's recorded owner must equal `pid`; a mismatch
    /// means the target exited and the slot was released or reused. Without
    /// one, the registry is scanned for `pid`.
    ///
    /// # Panics
    ///
    /// If `reason` is the invalid sentinel.
    pub fn send(
        &self,
        pid: Pid,
        reason: ProcSignalReason,
        slot_id: Option<SlotId>,
    ) -> SignalResult<()> {
        assert!(reason.is_valid(), "cannot send invalid signal reason {}", reason);

        let result = self.resolve(pid, slot_id).and_then(|slot| {
            // The target may exit between the check and the raise; a reused slot
            // then sees one spurious flag, which its owner tolerates.
            slot.raise(reason);
            self.notifier.notify(pid)
        });

        match &result {
            Ok(()) => {
                self.stats.inc_sent();
                debug!(pid, %reason, slot = ?slot_id, "Process signal sent");
            }
            Err(e) => {
                self.stats.inc_send_failures();
                debug!(pid, %reason, slot = ?slot_id, error = %e, "Process signal send failed");
            }
        }

        result
    }

    fn resolve(&self, pid: Pid, slot_id: Option<SlotId>) -> SignalResult<&ProcessSlot> {
        let gone = ProcSignalError::TargetGone { pid, slot: slot_id };
        match slot_id {
            Some(index) => {
                let slot = self.slot(index)?;
                if pid == EMPTY_PID || slot.pid() != pid {
                    return Err(gone);
                }
                Ok(slot)
            }
            None => {
                let index = self.find(pid).ok_or(gone)?;
                self.slot(index)
            }
        }
    }

    /// Send counters for this process
    pub fn stats(&self) -> ProcSignalStats {
        self.stats.snapshot()
    }
}

impl Drop for SlotRegistry {
    fn drop(&mut self) {
        if let Err(errno) = unsafe { munmap(self.base.cast(), self.mapped_len) } {
            warn!(error = %errno, "Failed to unmap process signal slot registry");
        }
    }
}

/// Claimed slot, released on drop
///
/// # Example
///
/// ```ignore
/// let registry = Arc::new(SlotRegistry::create(16)?);
/// let guard = registry.init(3)?;
/// // ... process runs ...
/// drop(guard); // slot 3 is free again
/// ```
pub struct SlotGuard {
    registry: Arc<SlotRegistry>,
    index: SlotId,
    pid: Pid,
}

impl SlotGuard {
    /// Claimed slot
    #[inline]
    pub fn slot(&self) -> &ProcessSlot {
        &self.registry.slots()[self.index]
    }

    /// Index of the claimed slot
    #[inline]
    pub fn index(&self) -> SlotId {
        self.index
    }

    /// Pid recorded as owner
    #[inline]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Registry the slot belongs to
    pub fn registry(&self) -> &Arc<SlotRegistry> {
        &self.registry
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.registry.cleanup(self.index, self.pid);
    }
}
