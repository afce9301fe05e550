/*!
 * Signal Handler - Detection and Handler Table
 * Async signal handler and the custom handler registry
 */

mod custom;
pub(crate) mod interrupt;

// Re-export public API
pub use custom::{CustomHandler, CustomHandlerTable, HandlerFn};
pub use interrupt::{handle_proc_signal, HoldoffGuard, InterruptState, PendingCustomFlags};
