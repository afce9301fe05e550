/*!
 * Error Types
 * Centralized error handling with thiserror and miette diagnostics
 */

use crate::core::types::{Pid, SlotId};
use crate::signals::core::types::ProcSignalReason;
use miette::Diagnostic;
use nix::errno::Errno;
use thiserror::Error;

/// Signal operation result
pub type SignalResult<T> = Result<T, ProcSignalError>;

/// Errors raised by the slot registry, the OS glue and the deferred pass
///
/// Handler failures carry the handler's own `anyhow::Error`, so this type is
/// not serializable.
#[derive(Error, Debug, Diagnostic)]
pub enum ProcSignalError {
    #[error("Slot {index} out of range (registry has {max} slots)")]
    #[diagnostic(
        code(procsignal::slot_out_of_range),
        help("Slot indices are assigned at process start and must be below the configured slot count.")
    )]
    SlotOutOfRange { index: SlotId, max: usize },

    #[error("Slot registry must contain at least one slot")]
    #[diagnostic(
        code(procsignal::empty_registry),
        help("Set PROCSIGNAL_MAX_SLOTS to a positive value.")
    )]
    EmptyRegistry,

    #[error("Process {pid} no longer owns a signal slot")]
    #[diagnostic(
        code(procsignal::target_gone),
        help("The target exited and its slot was released or reused. Re-resolve the target before sending.")
    )]
    TargetGone { pid: Pid, slot: Option<SlotId> },

    #[error("Failed to notify process {pid}: {errno}")]
    #[diagnostic(code(procsignal::notify_failed))]
    NotifyFailed { pid: Pid, errno: Errno },

    #[error("Failed to map shared slot registry ({bytes} bytes): {errno}")]
    #[diagnostic(
        code(procsignal::shared_memory),
        help("Check RLIMIT_AS and available memory.")
    )]
    SharedMemory { bytes: usize, errno: Errno },

    #[error("Process is not attached to a slot registry")]
    #[diagnostic(
        code(procsignal::not_attached),
        help("Call attach() on the process signal context before sending through it.")
    )]
    NotAttached,

    #[error("Failed to install notification signal handler: {0}")]
    #[diagnostic(code(procsignal::install_failed))]
    InstallFailed(Errno),

    #[error("Wake latch failure: {0}")]
    #[diagnostic(code(procsignal::latch))]
    Latch(Errno),

    #[error("Handler for custom signal {reason} failed")]
    #[diagnostic(
        code(procsignal::handler_failed),
        help("The pending flag for this reason was already cleared; a new signal schedules it again.")
    )]
    HandlerFailed {
        reason: ProcSignalReason,
        #[source]
        source: anyhow::Error,
    },
}

impl ProcSignalError {
    /// Whether the error means the target process is gone rather than a local fault
    pub fn is_target_gone(&self) -> bool {
        matches!(
            self,
            ProcSignalError::TargetGone { .. }
                | ProcSignalError::NotifyFailed {
                    errno: Errno::ESRCH,
                    ..
                }
        )
    }
}
