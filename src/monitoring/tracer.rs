/*!
 * Structured Tracing
 * Subscriber setup and spans for deferred signal passes
 *
 * Features:
 * - JSON-formatted logs for structured parsing
 * - Per-pass spans with duration and handler counts
 * - Slow-pass warnings
 */

use std::time::{Duration, Instant};
use tracing::{debug, info, span, warn, Level};
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Passes slower than this are reported at warn level
const SLOW_PASS_THRESHOLD: Duration = Duration::from_millis(10);

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - PROCSIGNAL_TRACE_JSON: Enable JSON output (default: false)
///
/// Calling it again after a subscriber is installed is a no-op.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var("PROCSIGNAL_TRACE_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if use_json {
        // JSON output for production/parsing
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_line_number(true)
                    .with_file(true)
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init()
            .is_ok()
    } else {
        // Human-readable output for development
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_line_number(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()
            .is_ok()
    };

    if installed {
        info!(json = use_json, "Structured tracing initialized");
    }
}

/// Span covering one deferred custom-signal pass
pub struct PassSpan {
    span: tracing::Span,
    start: Instant,
    invoked: Option<usize>,
}

impl PassSpan {
    pub fn new(pid: i32) -> Self {
        let span = span!(
            Level::DEBUG,
            "custom_signal_pass",
            pid = pid,
            invoked = tracing::field::Empty,
            duration_us = tracing::field::Empty,
        );
        Self {
            span,
            start: Instant::now(),
            invoked: None,
        }
    }

    /// Enter the span context
    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }

    /// Record how many handlers the pass invoked
    pub fn record_invoked(&mut self, count: usize) {
        self.span.record("invoked", count);
        self.invoked = Some(count);
    }
}

impl Drop for PassSpan {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        let _entered = self.span.enter();
        self.span.record("duration_us", duration.as_micros() as u64);

        if duration > SLOW_PASS_THRESHOLD {
            warn!(
                duration_ms = duration.as_millis() as u64,
                invoked = ?self.invoked,
                slow = true,
                "slow custom signal pass"
            );
        } else if self.invoked.unwrap_or(0) > 0 {
            debug!(
                duration_us = duration.as_micros() as u64,
                invoked = ?self.invoked,
                "custom signal pass completed"
            );
        }
    }
}
