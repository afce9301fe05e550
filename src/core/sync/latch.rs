/*!
 * Wake Latch
 *
 * Cross-context wake primitive built on a non-blocking self-pipe.
 *
 * # Design
 *
 * `set()` only touches an atomic flag and issues a single `write(2)`, both of
 * which are async-signal-safe, so it may be called from inside an OS signal
 * handler. `wait()` polls the read end and drains it; the atomic flag is the
 * authoritative state, the pipe only interrupts a blocked `poll(2)`.
 */

use crate::core::errors::{ProcSignalError, SignalResult};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::libc;
use nix::unistd::pipe2;
use std::os::fd::{AsRawFd, OwnedFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Self-pipe latch
pub struct WakeLatch {
    is_set: AtomicBool,
    read_fd: OwnedFd,
    write_fd: OwnedFd,
}

impl WakeLatch {
    /// Create a latch in the reset state
    pub fn new() -> SignalResult<Self> {
        let (read_fd, write_fd) =
            pipe2(OFlag::O_NONBLOCK | OFlag::O_CLOEXEC).map_err(ProcSignalError::Latch)?;
        Ok(Self {
            is_set: AtomicBool::new(false),
            read_fd,
            write_fd,
        })
    }

    /// Set the latch and wake any waiter
    ///
    /// Async-signal-safe: no allocation, no locks.
    #[inline]
    pub fn set(&self) {
        if self.is_set.swap(true, Ordering::SeqCst) {
            return;
        }
        let byte = 0u8;
        // A full pipe already guarantees the waiter wakes up, so the result is ignored
        unsafe {
            libc::write(
                self.write_fd.as_raw_fd(),
                &byte as *const u8 as *const libc::c_void,
                1,
            );
        }
    }

    /// Clear the latch
    ///
    /// Callers reset before re-checking their condition, then wait.
    #[inline]
    pub fn reset(&self) {
        self.is_set.store(false, Ordering::SeqCst);
    }

    /// Whether the latch is currently set
    #[inline]
    pub fn is_set(&self) -> bool {
        self.is_set.load(Ordering::SeqCst)
    }

    /// Block until the latch is set or the timeout elapses
    ///
    /// Returns `true` if the latch is set, `false` on timeout.
    pub fn wait(&self, timeout: Option<Duration>) -> SignalResult<bool> {
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            if self.is_set() {
                return Ok(true);
            }

            let timeout_ms: libc::c_int = match deadline {
                None => -1,
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(false);
                    }
                    let remaining = deadline - now;
                    remaining.as_millis().clamp(1, libc::c_int::MAX as u128) as libc::c_int
                }
            };

            let mut pfd = libc::pollfd {
                fd: self.read_fd.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            };
            let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
            if rc < 0 {
                let errno = Errno::last();
                if errno == Errno::EINTR {
                    continue;
                }
                return Err(ProcSignalError::Latch(errno));
            }
            if rc > 0 {
                self.drain();
            }
        }
    }

    fn drain(&self) {
        let mut buf = [0u8; 64];
        loop {
            let n = unsafe {
                libc::read(
                    self.read_fd.as_raw_fd(),
                    buf.as_mut_ptr() as *mut libc::c_void,
                    buf.len(),
                )
            };
            if n <= 0 {
                break;
            }
        }
    }
}
