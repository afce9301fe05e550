/*!
 * Synchronization Primitives
 * Wake primitives usable from signal context
 */

pub mod latch;

pub use latch::WakeLatch;
