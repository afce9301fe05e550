/*!
 * Deferred Dispatch Tests
 * Send, detection and the deferred pass working together
 */

use crate::support::{context, counting_handler, deliver, registry};
use pretty_assertions::assert_eq;
use proc_signal::{
    BuiltinReason, CustomHandler, ProcSignalContext, ProcSignalError, ProcSignalReason,
    SlotRegistry,
};
use proptest::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};

#[test]
fn test_repeated_sends_coalesce_into_one_invocation() {
    let ctx = context();
    let (registry, notifier) = registry(4);
    let guard = registry.init(2).unwrap();
    let (handler, calls) = counting_handler();
    let reason = ctx.register_custom_handler(handler);

    for _ in 0..3 {
        registry.send(guard.pid(), reason, Some(2)).unwrap();
    }
    deliver(&ctx, &registry, 2);

    ctx.check_and_handle_custom_signals().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(notifier.notified.load(Ordering::SeqCst), 3);
    assert_eq!(registry.stats().signals_sent, 3);

    // Flag consumed: a second pass invokes nothing
    ctx.check_and_handle_custom_signals().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_send_without_slot_id_scans_registry() {
    let ctx = context();
    let (registry, _) = registry(8);
    let guard = registry.init(5).unwrap();
    let (handler, calls) = counting_handler();
    let reason = ctx.register_custom_handler(handler);

    registry.send(guard.pid(), reason, None).unwrap();
    assert!(registry.slots()[5].is_pending(reason));

    deliver(&ctx, &registry, 5);
    ctx.check_and_handle_custom_signals().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_unbound_reason_is_dropped() {
    let ctx = context();
    let (registry, _) = registry(2);
    let guard = registry.init(0).unwrap();
    let unbound = ProcSignalReason::custom(30).unwrap();

    registry.send(guard.pid(), unbound, Some(0)).unwrap();
    deliver(&ctx, &registry, 0);
    assert!(ctx.state().custom_pending().is_set(30));

    ctx.check_and_handle_custom_signals().unwrap();
    assert!(!ctx.state().custom_pending().any());
    assert_eq!(ctx.stats().pending_dropped, 1);
    assert_eq!(ctx.stats().handlers_invoked, 0);
}

#[test]
fn test_idle_pass_changes_nothing() {
    let ctx = context();
    let (handler, calls) = counting_handler();
    let reason = ctx.register_custom_handler(handler.clone());

    ctx.check_and_handle_custom_signals().unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(!ctx.state().custom_pending().any());
    assert!(Arc::ptr_eq(&ctx.get_custom_handler(reason).unwrap(), &handler));
    assert_eq!(ctx.bound_custom_handlers(), 1);
    assert_eq!(ctx.stats().deferred_passes, 0);
}

#[test]
fn test_resignal_from_handler_runs_in_next_pass() {
    let ctx = context();
    let (registry, _) = registry(2);
    let guard = registry.init(1).unwrap();
    let pid = guard.pid();
    let reason = ProcSignalReason::custom(3).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));

    let handler = {
        let registry = Arc::clone(&registry);
        let state = Arc::clone(ctx.state());
        let calls = Arc::clone(&calls);
        CustomHandler::new(move |_| {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                registry.send(pid, reason, Some(1))?;
                proc_signal::handle_proc_signal(&state, registry.slot(1)?);
            }
            Ok(())
        })
    };
    ctx.assign_custom_handler(reason, handler);

    registry.send(pid, reason, Some(1)).unwrap();
    deliver(&ctx, &registry, 1);

    ctx.check_and_handle_custom_signals().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(ctx.state().custom_pending().is_set(3));

    ctx.check_and_handle_custom_signals().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(!ctx.state().custom_pending().any());
}

#[test]
fn test_nested_pass_from_handler_leaves_flags_pending() {
    let ctx = Arc::new(context());
    let (first_handler, first_calls) = counting_handler();
    let first = ctx.register_custom_handler(first_handler);
    let first_index = first.custom_index().unwrap();

    let outer: Arc<OnceLock<Weak<ProcSignalContext>>> = Arc::new(OnceLock::new());
    let nested_ok = Arc::new(AtomicBool::new(false));
    let nesting = {
        let outer = Arc::clone(&outer);
        let nested_ok = Arc::clone(&nested_ok);
        CustomHandler::new(move |_| {
            let Some(ctx) = outer.get().and_then(Weak::upgrade) else {
                return Ok(());
            };
            // Lower reason, so the running pass has already walked past it.
            ctx.state().custom_pending().set(first_index);
            ctx.check_and_handle_custom_signals()?;
            nested_ok.store(true, Ordering::SeqCst);
            Ok(())
        })
    };
    let nesting = ctx.register_custom_handler(nesting);
    let _ = outer.set(Arc::downgrade(&ctx));

    ctx.state()
        .custom_pending()
        .set(nesting.custom_index().unwrap());
    ctx.check_and_handle_custom_signals().unwrap();

    assert!(nested_ok.load(Ordering::SeqCst));
    assert_eq!(first_calls.load(Ordering::SeqCst), 0);
    assert!(ctx.state().custom_pending().is_set(first_index));
    assert_eq!(ctx.stats().deferred_passes, 1);

    ctx.check_and_handle_custom_signals().unwrap();
    assert_eq!(first_calls.load(Ordering::SeqCst), 1);
    assert!(!ctx.state().custom_pending().any());
}

#[test]
fn test_handlers_run_in_ascending_reason_order() {
    let ctx = context();
    let (registry, _) = registry(1);
    let guard = registry.init(0).unwrap();
    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

    let mut reasons = Vec::new();
    for tag in 0..4usize {
        let order = Arc::clone(&order);
        reasons.push(ctx.register_custom_handler(CustomHandler::new(move |_| {
            order.lock().push(tag);
            Ok(())
        })));
    }

    for reason in reasons.iter().rev() {
        registry.send(guard.pid(), *reason, Some(0)).unwrap();
    }
    deliver(&ctx, &registry, 0);
    ctx.check_and_handle_custom_signals().unwrap();

    assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
}

#[test]
fn test_builtin_and_custom_share_one_notification() {
    let ctx = context();
    let (registry, _) = registry(1);
    let guard = registry.init(0).unwrap();
    let (handler, calls) = counting_handler();
    let reason = ctx.register_custom_handler(handler);

    registry
        .send(guard.pid(), BuiltinReason::Barrier.into(), Some(0))
        .unwrap();
    registry.send(guard.pid(), reason, Some(0)).unwrap();
    deliver(&ctx, &registry, 0);

    let mut builtins = Vec::new();
    ctx.process_interrupts(|builtin| builtins.push(builtin)).unwrap();
    assert_eq!(builtins, vec![BuiltinReason::Barrier]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_send_to_stale_slot_fails() {
    let (registry, notifier) = registry(3);
    let pid = {
        let guard = registry.init(1).unwrap();
        guard.pid()
    };

    let err = registry
        .send(pid, ProcSignalReason::CUSTOM_FIRST, Some(1))
        .unwrap_err();
    assert!(err.is_target_gone());
    assert!(!registry.slots()[1].is_pending(ProcSignalReason::CUSTOM_FIRST));
    assert_eq!(notifier.notified.load(Ordering::SeqCst), 0);
    assert_eq!(registry.stats().send_failures, 1);
}

#[test]
fn test_send_to_unknown_pid_without_slot_fails() {
    let (registry, _) = registry(3);
    let _guard = registry.init(0).unwrap();

    let err = registry
        .send(i32::MAX, ProcSignalReason::CUSTOM_FIRST, None)
        .unwrap_err();
    assert!(matches!(err, ProcSignalError::TargetGone { slot: None, .. }));
}

#[test]
fn test_send_out_of_range_slot_fails() {
    let (registry, _) = registry(2);
    let err = registry
        .send(1, ProcSignalReason::CUSTOM_FIRST, Some(7))
        .unwrap_err();
    assert!(matches!(err, ProcSignalError::SlotOutOfRange { index: 7, max: 2 }));
}

#[test]
fn test_failing_handler_surfaces_error() {
    let ctx = context();
    let (registry, _) = registry(1);
    let guard = registry.init(0).unwrap();
    let reason = ctx.register_custom_handler(CustomHandler::new(|_| {
        Err(anyhow::anyhow!("reload failed"))
    }));

    registry.send(guard.pid(), reason, Some(0)).unwrap();
    deliver(&ctx, &registry, 0);

    let err = ctx.check_and_handle_custom_signals().unwrap_err();
    assert!(matches!(err, ProcSignalError::HandlerFailed { reason: r, .. } if r == reason));
    assert!(!ctx.state().interrupts_held());
}

fn send_k_times(
    ctx: &ProcSignalContext,
    registry: &SlotRegistry,
    reason: ProcSignalReason,
    k: usize,
    deliver_each: bool,
) {
    let pid = registry.slots()[0].pid();
    for _ in 0..k {
        registry.send(pid, reason, Some(0)).unwrap();
        if deliver_each {
            deliver(ctx, registry, 0);
        }
    }
    deliver(ctx, registry, 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_sends_before_pass_coalesce(
        k in 1usize..32,
        deliver_each in any::<bool>(),
        index in 0usize..64,
    ) {
        let ctx = context();
        let (registry, _) = registry(1);
        let _guard = registry.init(0).unwrap();
        let (handler, calls) = counting_handler();
        let reason = ProcSignalReason::custom(index).unwrap();
        ctx.assign_custom_handler(reason, handler);

        send_k_times(&ctx, &registry, reason, k, deliver_each);
        ctx.check_and_handle_custom_signals().unwrap();

        prop_assert_eq!(calls.load(Ordering::SeqCst), 1);
        prop_assert!(!ctx.state().custom_pending().any());
    }
}
