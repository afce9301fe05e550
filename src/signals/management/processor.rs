/*!
 * Deferred Custom-Signal Processor
 *
 * Execution half of the signal split. Runs in normal context, drains the
 * pending custom flags recorded by the async handler and invokes the bound
 * handlers inside a reusable scratch arena.
 *
 * # Pass structure
 *
 * 1. Hold interrupts so handlers cannot re-enter the pass through a nested
 *    interrupt check
 * 2. Take the scratch arena (created on first use) and reset it
 * 3. For each pending reason in ascending order: clear the flag, then invoke
 *    the handler or drop the flag if none is bound
 * 4. Reset the arena and resume interrupts, also when a handler fails
 *
 * A failing handler ends the pass. Reasons it did not reach stay pending and
 * the interrupt is re-armed so the next poll picks them up.
 */

use crate::core::errors::{ProcSignalError, SignalResult};
use crate::core::limits::NUM_CUSTOM_PROCSIGNALS;
use crate::signals::core::atomic_stats::AtomicProcSignalStats;
use crate::signals::core::types::ProcSignalReason;
use crate::signals::handler::{CustomHandlerTable, InterruptState};
use bumpalo::Bump;
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::{debug, trace};

/// Deferred processor owning the scratch arena
pub struct CustomSignalProcessor {
    scratch: Mutex<Option<Bump>>,
    scratch_capacity: usize,
}

impl CustomSignalProcessor {
    pub fn new(scratch_capacity: usize) -> Self {
        Self {
            scratch: Mutex::new(None),
            scratch_capacity,
        }
    }

    /// Run one deferred pass
    ///
    /// Returns the number of handlers invoked. A handler error ends the pass
    /// early: its own flag is already cleared, later reasons stay pending for
    /// the next pass.
    pub fn process(
        &self,
        state: &InterruptState,
        handlers: &CustomHandlerTable,
        stats: &AtomicProcSignalStats,
    ) -> SignalResult<usize> {
        let pending = state.custom_pending();
        if !pending.any() {
            return Ok(0);
        }

        let _hold = state.hold_interrupts();

        // A handler calling back into the pass directly finds the arena taken.
        let Some(guard) = self.scratch.try_lock() else {
            debug!("Deferred custom signal pass already running, leaving flags pending");
            return Ok(0);
        };
        let scratch = ScratchScope::enter(guard, self.scratch_capacity);
        stats.inc_passes();

        let mut invoked = 0;
        for index in 0..NUM_CUSTOM_PROCSIGNALS {
            // Cleared before the handler runs, so a re-signal lands in a later pass.
            if !pending.take(index) {
                continue;
            }
            let reason = ProcSignalReason::custom(index).unwrap_or(ProcSignalReason::INVALID);

            let Some(handler) = handlers.get_by_index(index) else {
                stats.inc_dropped();
                debug!(%reason, "Dropping pending custom signal without handler");
                continue;
            };

            trace!(%reason, "Invoking custom signal handler");
            stats.inc_invoked();
            if let Err(source) = handler.invoke(scratch.arena()) {
                // The caller already consumed interrupt_pending for this pass.
                if pending.any() {
                    state.rearm();
                }
                return Err(ProcSignalError::HandlerFailed { reason, source });
            }
            invoked += 1;
        }

        Ok(invoked)
    }

    /// Whether the scratch arena has been created yet
    pub fn scratch_created(&self) -> bool {
        self.scratch.lock().is_some()
    }

    /// Bytes currently reserved by the scratch arena
    pub fn scratch_allocated_bytes(&self) -> usize {
        self.scratch
            .lock()
            .as_ref()
            .map(Bump::allocated_bytes)
            .unwrap_or(0)
    }
}

/// Scratch arena borrowed for one pass, reset on entry and on drop
struct ScratchScope<'a> {
    arena: MappedMutexGuard<'a, Bump>,
}

impl<'a> ScratchScope<'a> {
    fn enter(guard: MutexGuard<'a, Option<Bump>>, capacity: usize) -> Self {
        let mut arena = MutexGuard::map(guard, |slot| {
            slot.get_or_insert_with(|| Bump::with_capacity(capacity))
        });
        arena.reset();
        Self { arena }
    }

    #[inline]
    fn arena(&self) -> &Bump {
        &self.arena
    }
}

impl Drop for ScratchScope<'_> {
    fn drop(&mut self) {
        self.arena.reset();
    }
}
