/*!
 * Shared helpers for signal tests
 */

use proc_signal::{
    handle_proc_signal, CustomHandler, HandlerFn, ProcSignalConfig, ProcSignalContext,
    ProcessNotifier, SignalResult, SlotRegistry,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Notifier that only counts, leaving delivery to the test
#[derive(Clone, Default)]
pub struct CountingNotifier {
    pub notified: Arc<AtomicUsize>,
}

impl ProcessNotifier for CountingNotifier {
    fn notify(&self, _pid: i32) -> SignalResult<()> {
        self.notified.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}

pub fn registry(slots: usize) -> (Arc<SlotRegistry>, CountingNotifier) {
    let notifier = CountingNotifier::default();
    let registry = SlotRegistry::with_notifier(slots, Box::new(notifier.clone())).unwrap();
    (Arc::new(registry), notifier)
}

pub fn context() -> ProcSignalContext {
    ProcSignalContext::new(ProcSignalConfig::default().with_scratch_capacity(4096)).unwrap()
}

/// Handler that counts its invocations
pub fn counting_handler() -> (HandlerFn, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let handler = CustomHandler::new(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    (handler, calls)
}

/// Do what the OS handler does when the notification for `slot` arrives
pub fn deliver(ctx: &ProcSignalContext, registry: &SlotRegistry, slot: usize) {
    handle_proc_signal(ctx.state(), registry.slot(slot).unwrap());
}
