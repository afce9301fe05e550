/*!
 * Async Signal Handler
 *
 * Detection half of the split between the OS signal context and deferred
 * processing.
 *
 * # Signal context rules
 *
 * Code reachable from `procsignal_handler` only reads and writes fixed-size
 * atomics that exist before the handler is installed, and sets the wake
 * latch. It never allocates, blocks, logs or calls a registered handler.
 */

use crate::core::errors::{ProcSignalError, SignalResult};
use crate::core::limits::{NUM_BUILTIN_PROCSIGNALS, NUM_CUSTOM_PROCSIGNALS};
use crate::core::sync::latch::WakeLatch;
use crate::core::types::current_pid;
use crate::signals::core::types::{BuiltinReason, ProcSignalReason};
use crate::signals::slots::ProcessSlot;
use nix::errno::Errno;
use nix::libc;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU32, Ordering};
use tracing::{debug, info, warn};

/// Custom reasons received but not yet processed by the deferred pass
pub struct PendingCustomFlags {
    flags: [AtomicBool; NUM_CUSTOM_PROCSIGNALS],
}

impl PendingCustomFlags {
    pub const fn new() -> Self {
        Self {
            flags: [const { AtomicBool::new(false) }; NUM_CUSTOM_PROCSIGNALS],
        }
    }

    /// Mark the custom reason at `index` pending (async-signal-safe)
    #[inline]
    pub fn set(&self, index: usize) {
        self.flags[index].store(true, Ordering::SeqCst);
    }

    /// Consume the flag at `index`
    #[inline]
    pub fn take(&self, index: usize) -> bool {
        self.flags[index].swap(false, Ordering::SeqCst)
    }

    #[inline]
    pub fn is_set(&self, index: usize) -> bool {
        self.flags[index].load(Ordering::SeqCst)
    }

    /// Whether any custom reason is pending
    pub fn any(&self) -> bool {
        self.flags.iter().any(|flag| flag.load(Ordering::SeqCst))
    }

    /// Number of pending custom reasons
    pub fn count(&self) -> usize {
        self.flags
            .iter()
            .filter(|flag| flag.load(Ordering::SeqCst))
            .count()
    }
}

impl Default for PendingCustomFlags {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide interrupt flags shared between signal and normal context
pub struct InterruptState {
    interrupt_pending: AtomicBool,
    holdoff: AtomicU32,
    builtin: [AtomicBool; NUM_BUILTIN_PROCSIGNALS],
    custom: PendingCustomFlags,
    latch: WakeLatch,
}

impl InterruptState {
    pub fn new() -> SignalResult<Self> {
        Ok(Self {
            interrupt_pending: AtomicBool::new(false),
            holdoff: AtomicU32::new(0),
            builtin: [const { AtomicBool::new(false) }; NUM_BUILTIN_PROCSIGNALS],
            custom: PendingCustomFlags::new(),
            latch: WakeLatch::new()?,
        })
    }

    /// Whether some interrupt is waiting for the next poll
    #[inline]
    pub fn interrupt_pending(&self) -> bool {
        self.interrupt_pending.load(Ordering::SeqCst)
    }

    /// Consume the interrupt-pending flag
    #[inline]
    pub fn take_interrupt_pending(&self) -> bool {
        self.interrupt_pending.swap(false, Ordering::SeqCst)
    }

    /// Consume the flag of a built-in reason
    #[inline]
    pub fn take_builtin(&self, reason: BuiltinReason) -> bool {
        self.builtin[reason.index()].swap(false, Ordering::SeqCst)
    }

    /// Pending custom flags
    #[inline]
    pub fn custom_pending(&self) -> &PendingCustomFlags {
        &self.custom
    }

    /// Wake primitive set by every signal
    #[inline]
    pub fn latch(&self) -> &WakeLatch {
        &self.latch
    }

    /// Suspend interrupt processing until the guard drops
    ///
    /// Guards nest; processing resumes when the last one is dropped.
    pub fn hold_interrupts(&self) -> HoldoffGuard<'_> {
        self.holdoff.fetch_add(1, Ordering::SeqCst);
        HoldoffGuard { state: self }
    }

    /// Whether interrupt processing is currently suspended
    #[inline]
    pub fn interrupts_held(&self) -> bool {
        self.holdoff.load(Ordering::SeqCst) > 0
    }

    /// Flag the interrupt again for work a pass left behind
    pub(crate) fn rearm(&self) {
        self.interrupt_pending.store(true, Ordering::SeqCst);
        self.latch.set();
    }

    fn raise_builtin(&self, reason: BuiltinReason) {
        self.builtin[reason.index()].store(true, Ordering::SeqCst);
        self.interrupt_pending.store(true, Ordering::SeqCst);
    }

    fn raise_custom(&self, index: usize) {
        self.custom.set(index);
        self.interrupt_pending.store(true, Ordering::SeqCst);
    }
}

/// Resumes interrupt processing on drop
pub struct HoldoffGuard<'a> {
    state: &'a InterruptState,
}

impl Drop for HoldoffGuard<'_> {
    fn drop(&mut self) {
        self.state.holdoff.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Move every flag raised in `slot` into `state` and wake the process
///
/// This is the whole body of the OS signal handler. Built-in reasons only
/// get their interrupt flag set; custom reasons are recorded for the
/// deferred pass. The latch is set even if no flag was found, since the OS
/// may have merged several notifications.
pub fn handle_proc_signal(state: &InterruptState, slot: &ProcessSlot) {
    for builtin in BuiltinReason::ALL {
        if slot.check_and_clear(builtin.into()) {
            state.raise_builtin(builtin);
        }
    }

    for index in 0..NUM_CUSTOM_PROCSIGNALS {
        if let Some(reason) = ProcSignalReason::custom(index) {
            if slot.check_and_clear(reason) {
                state.raise_custom(index);
            }
        }
    }

    state.latch.set();
}

// Targets of the installed OS handler. Null while no process slot is attached.
static ACTIVE_STATE: AtomicPtr<InterruptState> = AtomicPtr::new(ptr::null_mut());
static ACTIVE_SLOT: AtomicPtr<ProcessSlot> = AtomicPtr::new(ptr::null_mut());

extern "C" fn procsignal_handler(_signo: libc::c_int) {
    let saved_errno = Errno::last_raw();

    let state = ACTIVE_STATE.load(Ordering::Acquire);
    let slot = ACTIVE_SLOT.load(Ordering::Acquire);
    if !state.is_null() && !slot.is_null() {
        // Both pointers stay valid until `deactivate` nulls them.
        let (state, slot) = unsafe { (&*state, &*slot) };
        handle_proc_signal(state, slot);
    }

    Errno::set_raw(saved_errno);
}

/// Install the OS handler for `signal`
pub(crate) fn install_os_handler(signal: Signal) -> SignalResult<()> {
    let action = SigAction::new(
        SigHandler::Handler(procsignal_handler),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    unsafe { sigaction(signal, &action) }.map_err(ProcSignalError::InstallFailed)?;
    info!(%signal, "Process signal handler installed");
    Ok(())
}

/// Point the OS handler at `state` and `slot`
///
/// Both must outlive the matching `deactivate` call.
pub(crate) fn activate(state: &InterruptState, slot: &ProcessSlot) {
    ACTIVE_STATE.store(state as *const _ as *mut _, Ordering::Release);
    ACTIVE_SLOT.store(slot as *const _ as *mut _, Ordering::Release);
    debug!("Process signal handler activated");
}

/// Detach the OS handler from `state` and `slot`
///
/// Does nothing if a later `activate` pointed the handler elsewhere. Later
/// notifications only leave flags in the slot.
pub(crate) fn deactivate(state: &InterruptState, slot: &ProcessSlot) {
    let slot_ptr = slot as *const _ as *mut ProcessSlot;
    let state_ptr = state as *const _ as *mut InterruptState;

    let detached = ACTIVE_SLOT
        .compare_exchange(slot_ptr, ptr::null_mut(), Ordering::AcqRel, Ordering::Acquire)
        .is_ok();
    if !detached {
        debug!("Process signal handler owned by a newer attachment, leaving it active");
        return;
    }
    let _ = ACTIVE_STATE.compare_exchange(
        state_ptr,
        ptr::null_mut(),
        Ordering::AcqRel,
        Ordering::Acquire,
    );
    debug!("Process signal handler deactivated");
}

/// Whether the OS handler currently targets `slot`
#[cfg(test)]
pub(crate) fn is_active_slot(slot: &ProcessSlot) -> bool {
    ptr::eq(ACTIVE_SLOT.load(Ordering::Acquire), slot)
}

static EXIT_HOOK_REGISTERED: AtomicBool = AtomicBool::new(false);

/// Release the active slot when the process exits without unwinding
///
/// Runs from `exit(3)`. The release only succeeds while the slot still holds
/// this process's pid, so a forked child inheriting the hook and a slot that
/// was already released by `Drop` are both left alone.
extern "C" fn release_active_slot() {
    let slot = ACTIVE_SLOT.swap(ptr::null_mut(), Ordering::AcqRel);
    ACTIVE_STATE.store(ptr::null_mut(), Ordering::Release);
    if slot.is_null() {
        return;
    }
    // The mapping outlives the attachment that published this pointer.
    let slot = unsafe { &*slot };
    let _ = slot.release(current_pid());
}

/// Register the process-exit hook once per process
pub(crate) fn register_exit_hook() {
    if EXIT_HOOK_REGISTERED.swap(true, Ordering::SeqCst) {
        return;
    }
    if unsafe { libc::atexit(release_active_slot) } != 0 {
        EXIT_HOOK_REGISTERED.store(false, Ordering::SeqCst);
        warn!("Could not register process signal exit hook, relying on drop only");
        return;
    }
    debug!("Process signal exit hook registered");
}

#[cfg(test)]
pub(crate) fn run_exit_hook() {
    release_active_slot();
}
