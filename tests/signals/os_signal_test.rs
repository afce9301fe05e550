/*!
 * OS Signal Tests
 * Real SIGUSR1 delivery to this test process
 */

use crate::support::{context, counting_handler};
use pretty_assertions::assert_eq;
use nix::errno::Errno;
use nix::sys::signal::{raise, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{fork, ForkResult};
use proc_signal::{ProcSignalError, SlotRegistry};
use serial_test::serial;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

const WAIT: Option<Duration> = Some(Duration::from_secs(5));

#[test]
#[serial]
fn test_signal_self_end_to_end() {
    let ctx = context();
    let registry = Arc::new(SlotRegistry::create(4).unwrap());
    let (handler, calls) = counting_handler();
    let reason = ctx.register_custom_handler(handler);

    let attachment = ctx.attach(&registry, 3).unwrap();
    assert_eq!(registry.find(attachment.pid()), Some(3));
    assert!(Arc::ptr_eq(&ctx.attached_registry().unwrap(), &registry));
    // Attaching sweeps the slot once, which sets the latch.
    ctx.state().latch().reset();

    registry.send(attachment.pid(), reason, Some(3)).unwrap();
    registry.send(attachment.pid(), reason, None).unwrap();
    ctx.send(attachment.pid(), reason, Some(3)).unwrap();

    assert!(ctx.wait_for_signal(WAIT).unwrap());
    ctx.process_interrupts(|_| {}).unwrap();

    assert!(calls.load(Ordering::SeqCst) >= 1);

    // Late notifications can only add passes, never invocations past the sends.
    ctx.check_and_handle_custom_signals().unwrap();
    assert!(calls.load(Ordering::SeqCst) <= 3);
    assert_eq!(registry.stats().signals_sent, 3);
    drop(attachment);
    assert!(!registry.slots()[3].is_owned());
}

#[test]
#[serial]
fn test_detached_process_is_unreachable() {
    let ctx = context();
    let registry = Arc::new(SlotRegistry::create(2).unwrap());
    let (handler, calls) = counting_handler();
    let reason = ctx.register_custom_handler(handler);

    let pid = {
        let attachment = ctx.attach(&registry, 0).unwrap();
        attachment.pid()
    };
    assert!(!registry.slots()[0].is_owned());
    // Attaching sweeps the slot once, which sets the latch.
    ctx.state().latch().reset();

    let err = registry.send(pid, reason, Some(0)).unwrap_err();
    assert!(matches!(err, ProcSignalError::TargetGone { .. }));
    let err = ctx.send(pid, reason, None).unwrap_err();
    assert!(matches!(err, ProcSignalError::NotAttached));
    assert!(!ctx.wait_for_signal(Some(Duration::from_millis(50))).unwrap());

    ctx.check_and_handle_custom_signals().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
#[serial]
fn test_handler_preserves_errno() {
    let ctx = context();
    let registry = Arc::new(SlotRegistry::create(1).unwrap());
    let attachment = ctx.attach(&registry, 0).unwrap();
    ctx.state().latch().reset();

    Errno::set_raw(Errno::ENOTTY as i32);
    raise(Signal::SIGUSR1).unwrap();
    let after = Errno::last_raw();

    assert_eq!(after, Errno::ENOTTY as i32);
    assert!(ctx.state().latch().is_set());
    drop(attachment);
}

#[test]
#[serial]
fn test_exit_without_drop_releases_slot() {
    let ctx = context();
    let registry = Arc::new(SlotRegistry::create(2).unwrap());

    match unsafe { fork() }.unwrap() {
        ForkResult::Child => {
            let code = match ctx.attach(&registry, 1) {
                Ok(attachment) => {
                    // exit(3) skips destructors; only the exit hook runs.
                    std::mem::forget(attachment);
                    0
                }
                Err(_) => 1,
            };
            std::process::exit(code);
        }
        ForkResult::Parent { child } => {
            let status = waitpid(child, None).unwrap();
            assert_eq!(status, WaitStatus::Exited(child, 0));
            assert!(!registry.slots()[1].is_owned());
            assert_eq!(registry.find(child.as_raw()), None);
        }
    }
}

#[test]
#[serial]
fn test_dropping_older_attachment_keeps_newer_active() {
    let older_ctx = context();
    let newer_ctx = context();
    let registry = Arc::new(SlotRegistry::create(2).unwrap());

    let older = older_ctx.attach(&registry, 0).unwrap();
    let newer = newer_ctx.attach(&registry, 1).unwrap();
    drop(older);
    newer_ctx.state().latch().reset();

    let (handler, calls) = counting_handler();
    let reason = newer_ctx.register_custom_handler(handler);
    registry.send(newer.pid(), reason, Some(1)).unwrap();

    assert!(newer_ctx.wait_for_signal(WAIT).unwrap());
    newer_ctx.check_and_handle_custom_signals().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    drop(newer);
}
