/*!
 * Signals Module
 * Multiplexes many signal reasons onto one OS notification signal per process
 */

pub mod core;
pub mod handler;
pub mod management;
pub mod slots;

// Re-export public API
pub use self::core::{AtomicProcSignalStats, BuiltinReason, ProcSignalReason, ProcSignalStats};
pub use handler::{
    handle_proc_signal, CustomHandler, CustomHandlerTable, HandlerFn, HoldoffGuard,
    InterruptState, PendingCustomFlags,
};
pub use management::*;
pub use slots::{KillNotifier, ProcessNotifier, ProcessSlot, SlotGuard, SlotRegistry};
