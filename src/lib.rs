/*!
 * Process Signal Multiplexing Library
 *
 * Lets cooperating processes notify each other of many discrete events
 * while the OS only provides a single payload-free signal per process:
 * - Shared-memory slot registry carrying the actual reasons
 * - Async-signal-safe detection inside the OS handler
 * - Deferred, normal-context dispatch of dynamically registered handlers
 */

pub mod core;
pub mod monitoring;
pub mod signals;

// Re-exports
pub use crate::core::errors::{ProcSignalError, SignalResult};
pub use crate::core::{NotifySignal, ProcSignalConfig};
pub use monitoring::init_tracing;
pub use signals::*;
