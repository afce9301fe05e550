/*!
 * Signal Core - Types and Statistics
 * Reason space definitions and lock-free counters
 */

pub mod atomic_stats;
pub mod types;

// Re-export commonly used types
pub use atomic_stats::AtomicProcSignalStats;
pub use types::*;
