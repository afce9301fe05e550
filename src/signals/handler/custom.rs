/*!
 * Custom Signal Handler Table
 * Binds claimed custom reasons to executable callbacks
 */

use crate::core::limits::NUM_CUSTOM_PROCSIGNALS;
use crate::signals::core::types::ProcSignalReason;
use arc_swap::ArcSwapOption;
use bumpalo::Bump;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

type CallbackFn = dyn Fn(&Bump) -> anyhow::Result<()> + Send + Sync;

/// Executable handler for a custom reason
///
/// Runs in normal context during the deferred pass and receives the pass's
/// scratch arena; everything allocated there is discarded when the pass ends.
pub struct CustomHandler {
    callback: Box<CallbackFn>,
}

impl CustomHandler {
    /// Wrap a callback into a shareable handler
    pub fn new<F>(callback: F) -> HandlerFn
    where
        F: Fn(&Bump) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Arc::new(Self {
            callback: Box::new(callback),
        })
    }

    /// Invoke the callback
    #[inline]
    pub fn invoke(&self, scratch: &Bump) -> anyhow::Result<()> {
        (self.callback)(scratch)
    }
}

impl fmt::Debug for CustomHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomHandler").finish_non_exhaustive()
    }
}

/// Shared handle to a custom handler
pub type HandlerFn = Arc<CustomHandler>;

/// Process-local table of custom handlers
///
/// Entries only ever go from unbound to bound; there is no unbind. Writes
/// are expected during single-threaded initialisation, before the process
/// can be signalled for the reason being bound. Entries are swapped
/// atomically, so no lock guards the table.
pub struct CustomHandlerTable {
    entries: [ArcSwapOption<CustomHandler>; NUM_CUSTOM_PROCSIGNALS],
}

impl CustomHandlerTable {
    pub fn new() -> Self {
        Self {
            entries: std::array::from_fn(|_| ArcSwapOption::empty()),
        }
    }

    /// Bind `handler` to the first free custom reason
    ///
    /// Returns `ProcSignalReason::INVALID` when every custom reason is taken.
    pub fn register(&self, handler: HandlerFn) -> ProcSignalReason {
        let free = self
            .entries
            .iter()
            .position(|entry| entry.load().is_none());

        let Some(index) = free else {
            warn!(
                capacity = NUM_CUSTOM_PROCSIGNALS,
                "No free custom signal reason left"
            );
            return ProcSignalReason::INVALID;
        };

        self.entries[index].store(Some(handler));
        let reason = custom_reason(index);
        info!(%reason, "Registered custom signal handler");
        reason
    }

    /// Bind `handler` to `reason`, returning the handler it replaces
    ///
    /// # Panics
    ///
    /// If `reason` is outside the custom range.
    pub fn assign(&self, reason: ProcSignalReason, handler: HandlerFn) -> Option<HandlerFn> {
        let index = expect_custom(reason);
        let previous = self.entries[index].swap(Some(handler));
        debug!(%reason, replaced = previous.is_some(), "Assigned custom signal handler");
        previous
    }

    /// Handler bound to `reason`
    ///
    /// # Panics
    ///
    /// If `reason` is outside the custom range.
    pub fn get(&self, reason: ProcSignalReason) -> Option<HandlerFn> {
        self.entries[expect_custom(reason)].load_full()
    }

    /// Handler bound to the custom reason at `index` of the pool
    #[inline]
    pub(crate) fn get_by_index(&self, index: usize) -> Option<HandlerFn> {
        self.entries.get(index).and_then(|entry| entry.load_full())
    }

    /// Number of bound custom reasons
    pub fn bound_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.load().is_some())
            .count()
    }
}

impl Default for CustomHandlerTable {
    fn default() -> Self {
        Self::new()
    }
}

fn custom_reason(index: usize) -> ProcSignalReason {
    ProcSignalReason::custom(index).unwrap_or(ProcSignalReason::INVALID)
}

fn expect_custom(reason: ProcSignalReason) -> usize {
    match reason.custom_index() {
        Some(index) => index,
        None => panic!("signal reason {} is not in the custom range", reason),
    }
}
