/*!
 * System Limits and Constants
 *
 * Fixed sizes of the reason space and defaults for the runtime knobs.
 * The reason space is fixed at build time; slot counts and scratch sizing
 * can be overridden through `ProcSignalConfig`.
 */

// =============================================================================
// REASON SPACE
// =============================================================================

/// Built-in reasons known to every process
pub const NUM_BUILTIN_PROCSIGNALS: usize = 11;

/// Generic reasons extensions can claim at runtime
pub const NUM_CUSTOM_PROCSIGNALS: usize = 64;

/// First reason of the custom range
pub const CUSTOM_PROCSIGNAL_FIRST: usize = NUM_BUILTIN_PROCSIGNALS;

/// Pending-flag array length of every process slot
pub const NUM_PROCSIGNALS: usize = NUM_BUILTIN_PROCSIGNALS + NUM_CUSTOM_PROCSIGNALS;

// =============================================================================
// SLOT REGISTRY
// =============================================================================

/// Default number of process slots in the shared registry
pub const DEFAULT_MAX_SLOTS: usize = 128;

/// Hard ceiling for slot counts coming from configuration
/// Keeps a bad environment value from mapping an absurd segment
pub const MAX_SLOTS_LIMIT: usize = 1 << 16;

// =============================================================================
// DEFERRED PROCESSING
// =============================================================================

/// Initial chunk size of the scratch arena (8KB)
/// Handlers doing transient formatting rarely need more per pass
pub const DEFAULT_SCRATCH_CAPACITY: usize = 8 * 1024;
