/*!
 * Signal Slots - Shared Registry
 * Cross-process pending flags and the send path
 */

mod notifier;
mod registry;
mod slot;

// Re-export public API
pub use notifier::{KillNotifier, ProcessNotifier};
pub use registry::{SlotGuard, SlotRegistry};
pub use slot::ProcessSlot;
