/*!
 * Process Signal Demo - Main Entry Point
 *
 * Forks a handful of worker processes sharing one slot registry:
 * - Every worker registers the same custom handlers in the same order
 * - The supervisor multiplexes custom and built-in reasons onto SIGUSR1
 * - Workers drain their reasons in the deferred pass and exit on request
 */

use nix::sys::wait::waitpid;
use nix::unistd::{fork, ForkResult, Pid as NixPid};
use proc_signal::{
    init_proc_signals, init_tracing, BuiltinReason, CustomHandler, ProcSignalConfig,
    ProcSignalContext, ProcSignalReason, SlotRegistry,
};
use std::error::Error;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

const WORKERS: usize = 3;
const ROUNDS: u64 = 5;

static RELOADS: AtomicU64 = AtomicU64::new(0);
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// Reasons every process derives by registering in the same order
struct DemoReasons {
    reload: ProcSignalReason,
    shutdown: ProcSignalReason,
}

fn register_demo_handlers(ctx: &ProcSignalContext) -> Result<DemoReasons, Box<dyn Error>> {
    let reload = ctx.register_custom_handler(CustomHandler::new(|scratch| {
        let count = RELOADS.fetch_add(1, Ordering::SeqCst) + 1;
        let mut line = bumpalo::collections::String::new_in(scratch);
        write!(line, "reload #{}", count)?;
        info!(pid = std::process::id(), event = %line, "Custom reload handled");
        Ok(())
    }));
    let shutdown = ctx.register_custom_handler(CustomHandler::new(|_| {
        SHUTDOWN.store(true, Ordering::SeqCst);
        Ok(())
    }));

    if !reload.is_valid() || !shutdown.is_valid() {
        return Err("no free custom signal reasons".into());
    }
    Ok(DemoReasons { reload, shutdown })
}

fn run_worker(
    registry: &Arc<SlotRegistry>,
    slot: usize,
    config: ProcSignalConfig,
) -> Result<(), Box<dyn Error>> {
    // Created after fork so the wake latch is private to this worker.
    let ctx = init_proc_signals(config)?;
    register_demo_handlers(ctx)?;
    let attachment = ctx.attach(registry, slot)?;
    info!(pid = attachment.pid(), slot, "Worker ready");

    while !SHUTDOWN.load(Ordering::SeqCst) {
        ctx.wait_for_signal(Some(Duration::from_secs(5)))?;
        ctx.process_interrupts(|builtin| {
            info!(pid = attachment.pid(), reason = builtin.description(), "Built-in interrupt");
        })?;
    }

    info!(
        pid = attachment.pid(),
        reloads = RELOADS.load(Ordering::SeqCst),
        stats = %serde_json::to_string(&ctx.stats()).unwrap_or_default(),
        "Worker exiting"
    );
    Ok(())
}

fn wait_for_attach(registry: &SlotRegistry, slot: usize, child: NixPid) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if registry.slots()[slot].pid() == child.as_raw() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();

    let config = ProcSignalConfig::from_env();
    info!(config = ?config, "Process signal demo starting");

    // Same registration order as the workers, so the reason numbers agree.
    let template = ProcSignalContext::new(config.clone())?;
    let reasons = register_demo_handlers(&template)?;
    let sizing = config.clone().with_max_slots(config.max_slots.max(WORKERS));
    let registry = Arc::new(SlotRegistry::from_config(&sizing)?);

    let mut children = Vec::with_capacity(WORKERS);
    for slot in 0..WORKERS {
        match unsafe { fork() }? {
            ForkResult::Child => {
                let code = match run_worker(&registry, slot, config.clone()) {
                    Ok(()) => 0,
                    Err(e) => {
                        error!(error = %e, slot, "Worker failed");
                        1
                    }
                };
                std::process::exit(code);
            }
            ForkResult::Parent { child } => children.push((slot, child)),
        }
    }

    for &(slot, child) in &children {
        if !wait_for_attach(&registry, slot, child) {
            warn!(slot, pid = child.as_raw(), "Worker did not attach in time");
        }
    }

    for round in 0..ROUNDS {
        for &(slot, child) in &children {
            let mut sent = registry.send(child.as_raw(), reasons.reload, Some(slot));
            if round == 0 {
                sent = sent.and_then(|()| {
                    registry.send(child.as_raw(), BuiltinReason::CacheCatchup.into(), Some(slot))
                });
            }
            if let Err(e) = sent {
                warn!(pid = child.as_raw(), round, error = %e, "Could not signal worker");
            }
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    for &(slot, child) in &children {
        if let Err(e) = registry.send(child.as_raw(), reasons.shutdown, Some(slot)) {
            warn!(pid = child.as_raw(), error = %e, "Could not signal worker shutdown");
        }
    }

    for (_, child) in children {
        let status = waitpid(child, None)?;
        info!(pid = child.as_raw(), status = ?status, "Worker reaped");
    }

    info!(
        stats = %serde_json::to_string(&registry.stats()).unwrap_or_default(),
        "Process signal demo finished"
    );
    Ok(())
}
