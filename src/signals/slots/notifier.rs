/*!
 * Process Notifier
 * OS-level wake-up of a target process after its flag is raised
 */

use crate::core::errors::{ProcSignalError, SignalResult};
use crate::core::types::Pid;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid as NixPid;

/// Delivers the payload-free notification to a process
///
/// The flag in shared memory is authoritative; a notification that is lost or
/// coalesced by the OS is recovered on the target's next poll.
pub trait ProcessNotifier: Send + Sync {
    /// Notify `pid` that at least one of its flags changed
    fn notify(&self, pid: Pid) -> SignalResult<()>;

    /// Get notifier name for debugging
    fn name(&self) -> &'static str;
}

/// Notifier backed by `kill(2)`
#[derive(Debug, Clone, Copy)]
pub struct KillNotifier {
    signal: Signal,
}

impl KillNotifier {
    pub fn new(signal: Signal) -> Self {
        Self { signal }
    }

    /// Signal this notifier sends
    pub fn signal(&self) -> Signal {
        self.signal
    }
}

impl Default for KillNotifier {
    fn default() -> Self {
        Self::new(Signal::SIGUSR1)
    }
}

impl ProcessNotifier for KillNotifier {
    fn notify(&self, pid: Pid) -> SignalResult<()> {
        kill(NixPid::from_raw(pid), self.signal)
            .map_err(|errno| ProcSignalError::NotifyFailed { pid, errno })
    }

    fn name(&self) -> &'static str {
        "kill"
    }
}
