/*!
 * Signal Reason Types
 * Built-in reasons, the custom reason pool and the invalid sentinel
 */

use crate::core::limits::{
    CUSTOM_PROCSIGNAL_FIRST, NUM_BUILTIN_PROCSIGNALS, NUM_CUSTOM_PROCSIGNALS, NUM_PROCSIGNALS,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reasons every process understands without registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum BuiltinReason {
    /// Shared cache invalidation queue needs catching up
    CacheCatchup = 0,
    /// Asynchronous notification arrived
    Notify = 1,
    /// Message from a parallel worker
    ParallelMessage = 2,
    /// WAL sender asked to stop at the next opportunity
    WalSenderStopping = 3,
    /// Global barrier must be absorbed
    Barrier = 4,
    /// Recovery conflict: database dropped
    ConflictDatabase = 5,
    /// Recovery conflict: tablespace dropped
    ConflictTablespace = 6,
    /// Recovery conflict: lock
    ConflictLock = 7,
    /// Recovery conflict: snapshot
    ConflictSnapshot = 8,
    /// Recovery conflict: buffer pin
    ConflictBufferPin = 9,
    /// Recovery conflict: startup process deadlock
    ConflictStartupDeadlock = 10,
}

impl BuiltinReason {
    /// All built-in reasons in index order
    pub const ALL: [BuiltinReason; NUM_BUILTIN_PROCSIGNALS] = [
        BuiltinReason::CacheCatchup,
        BuiltinReason::Notify,
        BuiltinReason::ParallelMessage,
        BuiltinReason::WalSenderStopping,
        BuiltinReason::Barrier,
        BuiltinReason::ConflictDatabase,
        BuiltinReason::ConflictTablespace,
        BuiltinReason::ConflictLock,
        BuiltinReason::ConflictSnapshot,
        BuiltinReason::ConflictBufferPin,
        BuiltinReason::ConflictStartupDeadlock,
    ];

    /// Index into slot and interrupt flag arrays
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Whether this is one of the recovery conflict reasons
    pub fn is_recovery_conflict(self) -> bool {
        self.index() >= BuiltinReason::ConflictDatabase.index()
    }

    /// Get human-readable description
    pub fn description(self) -> &'static str {
        match self {
            BuiltinReason::CacheCatchup => "cache catchup",
            BuiltinReason::Notify => "notify",
            BuiltinReason::ParallelMessage => "parallel message",
            BuiltinReason::WalSenderStopping => "wal sender stopping",
            BuiltinReason::Barrier => "barrier",
            BuiltinReason::ConflictDatabase => "recovery conflict (database)",
            BuiltinReason::ConflictTablespace => "recovery conflict (tablespace)",
            BuiltinReason::ConflictLock => "recovery conflict (lock)",
            BuiltinReason::ConflictSnapshot => "recovery conflict (snapshot)",
            BuiltinReason::ConflictBufferPin => "recovery conflict (buffer pin)",
            BuiltinReason::ConflictStartupDeadlock => "recovery conflict (startup deadlock)",
        }
    }
}

impl From<BuiltinReason> for ProcSignalReason {
    fn from(reason: BuiltinReason) -> Self {
        ProcSignalReason(reason as u32)
    }
}

/// Identifier of a multiplexed signal reason
///
/// Built-in reasons occupy `0..NUM_BUILTIN_PROCSIGNALS`, followed by exactly
/// `NUM_CUSTOM_PROCSIGNALS` custom reasons. `INVALID` lies outside both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct ProcSignalReason(u32);

impl ProcSignalReason {
    /// Sentinel returned when no custom reason is free
    pub const INVALID: ProcSignalReason = ProcSignalReason(u32::MAX);

    /// First reason of the custom range
    pub const CUSTOM_FIRST: ProcSignalReason = ProcSignalReason(CUSTOM_PROCSIGNAL_FIRST as u32);

    /// Last reason of the custom range
    pub const CUSTOM_LAST: ProcSignalReason =
        ProcSignalReason((CUSTOM_PROCSIGNAL_FIRST + NUM_CUSTOM_PROCSIGNALS - 1) as u32);

    /// Reason from its raw number, `None` if outside the reason space
    pub fn from_raw(raw: u32) -> Option<Self> {
        ((raw as usize) < NUM_PROCSIGNALS).then_some(ProcSignalReason(raw))
    }

    /// Custom reason at `index` within the custom pool
    pub fn custom(index: usize) -> Option<Self> {
        (index < NUM_CUSTOM_PROCSIGNALS)
            .then(|| ProcSignalReason((CUSTOM_PROCSIGNAL_FIRST + index) as u32))
    }

    /// Raw reason number
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Index into a slot's pending-flag array
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Whether the reason is built-in or custom
    #[inline]
    pub const fn is_valid(self) -> bool {
        (self.0 as usize) < NUM_PROCSIGNALS
    }

    /// Whether the reason lies in the custom range
    #[inline]
    pub const fn is_custom(self) -> bool {
        let raw = self.0 as usize;
        raw >= CUSTOM_PROCSIGNAL_FIRST && raw < NUM_PROCSIGNALS
    }

    /// Position within the custom pool
    #[inline]
    pub fn custom_index(self) -> Option<usize> {
        self.is_custom()
            .then(|| self.0 as usize - CUSTOM_PROCSIGNAL_FIRST)
    }

    /// Built-in reason, if this is one
    pub fn builtin(self) -> Option<BuiltinReason> {
        BuiltinReason::ALL.get(self.0 as usize).copied()
    }
}

impl fmt::Display for ProcSignalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(builtin) = self.builtin() {
            write!(f, "{}({})", builtin.description(), self.0)
        } else if let Some(index) = self.custom_index() {
            write!(f, "custom#{}({})", index, self.0)
        } else {
            write!(f, "invalid({})", self.0)
        }
    }
}

/// Snapshot of signal subsystem statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcSignalStats {
    pub signals_sent: u64,
    pub send_failures: u64,
    pub deferred_passes: u64,
    pub handlers_invoked: u64,
    pub pending_dropped: u64,
    pub handlers_registered: usize,
}
