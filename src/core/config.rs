/*!
 * Signal Subsystem Configuration
 *
 * Runtime knobs for the slot registry and the deferred pass
 */

use super::limits::{DEFAULT_MAX_SLOTS, DEFAULT_SCRATCH_CAPACITY, MAX_SLOTS_LIMIT};
use nix::sys::signal::Signal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::warn;

/// OS signal used to multiplex every reason onto
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifySignal {
    Usr1,
    Usr2,
}

impl NotifySignal {
    /// Matching nix signal
    pub fn as_signal(self) -> Signal {
        match self {
            NotifySignal::Usr1 => Signal::SIGUSR1,
            NotifySignal::Usr2 => Signal::SIGUSR2,
        }
    }
}

impl FromStr for NotifySignal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "usr1" | "sigusr1" => Ok(NotifySignal::Usr1),
            "usr2" | "sigusr2" => Ok(NotifySignal::Usr2),
            other => Err(format!("unknown notify signal '{}'", other)),
        }
    }
}

/// Signal subsystem configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcSignalConfig {
    /// Number of process slots in the shared registry
    pub max_slots: usize,
    /// Initial capacity of the deferred pass scratch arena, in bytes
    pub scratch_capacity: usize,
    /// OS signal used for notification
    pub notify_signal: NotifySignal,
}

impl Default for ProcSignalConfig {
    fn default() -> Self {
        Self {
            max_slots: DEFAULT_MAX_SLOTS,
            scratch_capacity: DEFAULT_SCRATCH_CAPACITY,
            notify_signal: NotifySignal::Usr1,
        }
    }
}

impl ProcSignalConfig {
    /// Load configuration from the environment
    ///
    /// Environment variables:
    /// - PROCSIGNAL_MAX_SLOTS: slot count (default: 128)
    /// - PROCSIGNAL_SCRATCH_BYTES: scratch arena capacity (default: 8192)
    /// - PROCSIGNAL_NOTIFY_SIGNAL: `usr1` or `usr2` (default: usr1)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let max_slots = env_or("PROCSIGNAL_MAX_SLOTS", defaults.max_slots);
        let max_slots = if max_slots == 0 || max_slots > MAX_SLOTS_LIMIT {
            warn!(
                max_slots,
                limit = MAX_SLOTS_LIMIT,
                "PROCSIGNAL_MAX_SLOTS out of range, using default"
            );
            defaults.max_slots
        } else {
            max_slots
        };

        Self {
            max_slots,
            scratch_capacity: env_or("PROCSIGNAL_SCRATCH_BYTES", defaults.scratch_capacity),
            notify_signal: env_or("PROCSIGNAL_NOTIFY_SIGNAL", defaults.notify_signal),
        }
    }

    /// Builder-style slot count override
    pub fn with_max_slots(mut self, max_slots: usize) -> Self {
        self.max_slots = max_slots;
        self
    }

    /// Builder-style scratch capacity override
    pub fn with_scratch_capacity(mut self, bytes: usize) -> Self {
        self.scratch_capacity = bytes;
        self
    }
}

fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|e| {
            warn!(key, value = %raw, error = %e, "Invalid configuration value, using default");
            default
        }),
        Err(_) => default,
    }
}
