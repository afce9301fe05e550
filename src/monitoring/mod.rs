/*!
 * Monitoring
 * Tracing setup and pass instrumentation
 */

mod tracer;

pub use tracer::{init_tracing, PassSpan};
