/*!
 * Process Signal Context
 *
 * Process-lifetime owner of the custom handler table, the interrupt flags
 * and the deferred processor, plus the process-wide singleton and the
 * free-function API extensions call into.
 */

use super::processor::CustomSignalProcessor;
use crate::core::config::ProcSignalConfig;
use crate::core::errors::{ProcSignalError, SignalResult};
use crate::core::types::{current_pid, Pid, SlotId};
use crate::monitoring::PassSpan;
use crate::signals::core::atomic_stats::AtomicProcSignalStats;
use crate::signals::core::types::{BuiltinReason, ProcSignalReason, ProcSignalStats};
use crate::signals::handler::interrupt::{
    activate, deactivate, install_os_handler, register_exit_hook,
};
use crate::signals::handler::{handle_proc_signal, CustomHandlerTable, HandlerFn, InterruptState};
use crate::signals::slots::{SlotGuard, SlotRegistry};
use arc_swap::ArcSwapOption;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{info, warn};

/// Per-process signal context
pub struct ProcSignalContext {
    config: ProcSignalConfig,
    state: Arc<InterruptState>,
    handlers: CustomHandlerTable,
    processor: CustomSignalProcessor,
    stats: AtomicProcSignalStats,
    attached: Arc<ArcSwapOption<SlotRegistry>>,
}

impl ProcSignalContext {
    pub fn new(config: ProcSignalConfig) -> SignalResult<Self> {
        let processor = CustomSignalProcessor::new(config.scratch_capacity);
        Ok(Self {
            state: Arc::new(InterruptState::new()?),
            handlers: CustomHandlerTable::new(),
            processor,
            stats: AtomicProcSignalStats::new(),
            attached: Arc::new(ArcSwapOption::empty()),
            config,
        })
    }

    pub fn config(&self) -> &ProcSignalConfig {
        &self.config
    }

    /// Interrupt flags shared with the OS handler
    pub fn state(&self) -> &Arc<InterruptState> {
        &self.state
    }

    /// Bind `handler` to the first free custom reason
    ///
    /// Call during single-threaded initialisation, before other processes
    /// can send the returned reason. Returns `ProcSignalReason::INVALID`
    /// when all custom reasons are taken.
    pub fn register_custom_handler(&self, handler: HandlerFn) -> ProcSignalReason {
        let reason = self.handlers.register(handler);
        if reason.is_valid() {
            self.stats.inc_registered();
        }
        reason
    }

    /// Bind or replace the handler of a custom reason
    ///
    /// # Panics
    ///
    /// If `reason` is outside the custom range.
    pub fn assign_custom_handler(
        &self,
        reason: ProcSignalReason,
        handler: HandlerFn,
    ) -> Option<HandlerFn> {
        let previous = self.handlers.assign(reason, handler);
        if previous.is_none() {
            self.stats.inc_registered();
        }
        previous
    }

    /// Handler bound to a custom reason
    ///
    /// # Panics
    ///
    /// If `reason` is outside the custom range.
    pub fn get_custom_handler(&self, reason: ProcSignalReason) -> Option<HandlerFn> {
        self.handlers.get(reason)
    }

    /// Run the deferred pass over pending custom reasons
    ///
    /// Safe to call with nothing pending.
    pub fn check_and_handle_custom_signals(&self) -> SignalResult<()> {
        let mut span = PassSpan::new(current_pid());
        let result = {
            let _entered = span.enter();
            self.processor
                .process(&self.state, &self.handlers, &self.stats)
        };
        if let Ok(invoked) = &result {
            span.record_invoked(*invoked);
        }
        result.map(|_| ())
    }

    /// Minimal interrupt check
    ///
    /// Does nothing while interrupts are held or nothing is pending. Otherwise
    /// hands every raised built-in reason to `dispatch`, then runs the
    /// deferred custom pass.
    pub fn process_interrupts<F>(&self, mut dispatch: F) -> SignalResult<()>
    where
        F: FnMut(BuiltinReason),
    {
        if self.state.interrupts_held() || !self.state.take_interrupt_pending() {
            return Ok(());
        }

        for builtin in BuiltinReason::ALL {
            if self.state.take_builtin(builtin) {
                dispatch(builtin);
            }
        }

        self.check_and_handle_custom_signals()
    }

    /// Block until a signal arrives or the timeout elapses, then reset the latch
    ///
    /// Returns `true` if woken by a signal.
    pub fn wait_for_signal(&self, timeout: Option<Duration>) -> SignalResult<bool> {
        let latch = self.state.latch();
        let woken = latch.wait(timeout)?;
        latch.reset();
        Ok(woken)
    }

    /// Claim `slot_index` in `registry` and start receiving signals
    ///
    /// Installs the OS handler before the slot is published, so no sender can
    /// reach this process while the default disposition is still in place.
    /// Dropping the returned attachment stops delivery and releases the slot;
    /// a process that exits without dropping it releases the slot from an
    /// `atexit` hook instead.
    pub fn attach(
        &self,
        registry: &Arc<SlotRegistry>,
        slot_index: SlotId,
    ) -> SignalResult<ProcSignalAttachment> {
        install_os_handler(self.config.notify_signal.as_signal())?;
        let slot = registry.init(slot_index)?;

        activate(&self.state, slot.slot());
        register_exit_hook();
        // Flags raised between claiming the slot and activation.
        handle_proc_signal(&self.state, slot.slot());
        self.attached.store(Some(Arc::clone(registry)));

        info!(
            pid = slot.pid(),
            slot = slot_index,
            "Process attached to signal slot registry"
        );

        Ok(ProcSignalAttachment {
            slot,
            state: Arc::clone(&self.state),
            attached: Arc::clone(&self.attached),
        })
    }

    /// Send `reason` to `pid` through the registry this process is attached to
    pub fn send(
        &self,
        pid: Pid,
        reason: ProcSignalReason,
        slot_id: Option<SlotId>,
    ) -> SignalResult<()> {
        let registry = self
            .attached
            .load_full()
            .ok_or(ProcSignalError::NotAttached)?;
        registry.send(pid, reason, slot_id)
    }

    /// Registry this process is currently attached to
    pub fn attached_registry(&self) -> Option<Arc<SlotRegistry>> {
        self.attached.load_full()
    }

    /// Number of custom reasons claimed in this process
    pub fn bound_custom_handlers(&self) -> usize {
        self.handlers.bound_count()
    }

    /// Get snapshot of deferred-pass statistics
    pub fn stats(&self) -> ProcSignalStats {
        self.stats.snapshot()
    }
}

/// Active slot of this process
///
/// The exit hook: dropping it detaches the OS handler, then releases the slot.
pub struct ProcSignalAttachment {
    slot: SlotGuard,
    state: Arc<InterruptState>,
    attached: Arc<ArcSwapOption<SlotRegistry>>,
}

impl ProcSignalAttachment {
    pub fn slot_index(&self) -> SlotId {
        self.slot.index()
    }

    pub fn pid(&self) -> Pid {
        self.slot.pid()
    }

    pub fn registry(&self) -> &Arc<SlotRegistry> {
        self.slot.registry()
    }
}

impl Drop for ProcSignalAttachment {
    fn drop(&mut self) {
        deactivate(&self.state, self.slot.slot());
        self.attached.store(None);
        info!(
            pid = self.slot.pid(),
            slot = self.slot.index(),
            "Process detached from signal slot registry"
        );
    }
}

static PROC_SIGNALS: OnceLock<ProcSignalContext> = OnceLock::new();

/// Initialise the process-wide context with an explicit configuration
///
/// Returns the existing context if one was already created.
pub fn init_proc_signals(config: ProcSignalConfig) -> SignalResult<&'static ProcSignalContext> {
    if let Some(existing) = PROC_SIGNALS.get() {
        warn!("Process signal context already initialised, keeping existing configuration");
        return Ok(existing);
    }
    let context = ProcSignalContext::new(config)?;
    Ok(PROC_SIGNALS.get_or_init(|| context))
}

/// Process-wide context, created from the environment on first use
///
/// # Panics
///
/// If the wake latch cannot be created on first use.
pub fn proc_signals() -> &'static ProcSignalContext {
    PROC_SIGNALS.get_or_init(|| {
        ProcSignalContext::new(ProcSignalConfig::from_env())
            .unwrap_or_else(|e| panic!("cannot initialise process signal context: {}", e))
    })
}

/// Claim the first free custom reason for `handler` in this process
pub fn register_custom_proc_signal_handler(handler: HandlerFn) -> ProcSignalReason {
    proc_signals().register_custom_handler(handler)
}

/// Bind `handler` to `reason`, returning the previously bound handler
pub fn assign_custom_proc_signal_handler(
    reason: ProcSignalReason,
    handler: HandlerFn,
) -> Option<HandlerFn> {
    proc_signals().assign_custom_handler(reason, handler)
}

/// Handler currently bound to `reason`
pub fn get_custom_proc_signal_handler(reason: ProcSignalReason) -> Option<HandlerFn> {
    proc_signals().get_custom_handler(reason)
}

/// Run the deferred custom pass of this process
pub fn check_and_handle_custom_signals() -> SignalResult<()> {
    proc_signals().check_and_handle_custom_signals()
}

/// Signal `pid` through the registry the process-wide context is attached to
pub fn send_proc_signal(
    pid: Pid,
    reason: ProcSignalReason,
    slot_id: Option<SlotId>,
) -> SignalResult<()> {
    proc_signals().send(pid, reason, slot_id)
}
