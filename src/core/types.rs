/*!
 * Core Types
 * Common types used across the signal subsystem
 */

/// OS process ID type
///
/// Matches the width the OS uses for `pid_t`, so slot records can be
/// compared and passed to `kill(2)` without conversion.
pub type Pid = i32;

/// Index of a process slot in the shared slot registry
pub type SlotId = usize;

/// Pid recorded in a slot that is not owned by any process
pub const EMPTY_PID: Pid = 0;

/// Pid of the calling process
#[inline]
pub fn current_pid() -> Pid {
    nix::unistd::getpid().as_raw()
}
