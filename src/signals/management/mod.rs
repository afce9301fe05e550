/*!
 * Signal Management - Deferred Processing and Context
 * Deferred custom-signal pass and the process-wide context
 */

mod context;
mod processor;

// Re-export public API
pub use context::{
    assign_custom_proc_signal_handler, check_and_handle_custom_signals,
    get_custom_proc_signal_handler, init_proc_signals, proc_signals,
    register_custom_proc_signal_handler, send_proc_signal, ProcSignalAttachment,
    ProcSignalContext,
};
pub use processor::CustomSignalProcessor;
