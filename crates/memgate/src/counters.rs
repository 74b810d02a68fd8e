//! The process-wide accounting state: merged counters under their lock, the
//! configured limits, and the advisory watermark.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Per-thread delta magnitude that triggers a merge into the global state.
pub(crate) const SYNC_THRESHOLD: i64 = 100_000;

/// Verdict of a merge, acted on only after the counters lock is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MergeOutcome {
    Admitted,
    OverByteLimit,
    OverCountLimit,
}

#[derive(Debug)]
struct Counters {
    alloc_size: i64,
    alloc_count: i64,
    max_used_size: i64,
}

/// One accounting domain: counters behind a lock, limits and flags beside it.
///
/// The process-wide instance lives in [`STATE`]; tests build their own so they
/// stay isolated from the global facade.
pub(crate) struct AccountingState {
    counters: Mutex<Counters>,
    max_size: AtomicI64,
    max_alloc_count: AtomicI64,
    watermark: AtomicI64,
    out_of_memory: AtomicBool,
    exit_on_oom: AtomicBool,
    oom_message: Mutex<Option<String>>,
}

impl AccountingState {
    pub(crate) const fn new() -> Self {
        Self {
            counters: Mutex::new(Counters {
                alloc_size: 0,
                alloc_count: 0,
                max_used_size: 0,
            }),
            max_size: AtomicI64::new(0),
            max_alloc_count: AtomicI64::new(0),
            watermark: AtomicI64::new(0),
            out_of_memory: AtomicBool::new(false),
            exit_on_oom: AtomicBool::new(false),
            oom_message: Mutex::new(None),
        }
    }

    // The critical sections below are pure arithmetic and cannot panic;
    // recover the guard rather than poisoning every later deallocation.
    fn lock(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Folds thread deltas into the global counters and reports whether a
    /// configured ceiling is now breached. Limit verdicts are only returned
    /// for allocating merges; a free-triggered merge is always admitted, so
    /// releasing memory can never fail.
    pub(crate) fn merge(
        &self,
        delta_size: i64,
        delta_count: i64,
        allocating: bool,
    ) -> MergeOutcome {
        let (over_size, over_count) = {
            let mut counters = self.lock();
            counters.alloc_size += delta_size;
            counters.alloc_count += delta_count;
            if counters.alloc_size > counters.max_used_size {
                counters.max_used_size = counters.alloc_size;
            }
            let max_size = self.max_size.load(Ordering::Relaxed);
            let max_count = self.max_alloc_count.load(Ordering::Relaxed);
            (
                max_size != 0 && counters.alloc_size > max_size,
                max_count != 0 && counters.alloc_count > max_count,
            )
        };
        if allocating {
            if over_size {
                return MergeOutcome::OverByteLimit;
            }
            if over_count {
                return MergeOutcome::OverCountLimit;
            }
        }
        MergeOutcome::Admitted
    }

    pub(crate) fn allocation_size(&self) -> u64 {
        self.lock().alloc_size.max(0) as u64
    }

    pub(crate) fn max_used_memory(&self) -> u64 {
        self.lock().max_used_size.max(0) as u64
    }

    pub(crate) fn allocation_count(&self) -> u64 {
        self.lock().alloc_count.max(0) as u64
    }

    /// Live size, peak, and count in one lock acquisition.
    pub(crate) fn counters_snapshot(&self) -> (u64, u64, u64) {
        let counters = self.lock();
        (
            counters.alloc_size.max(0) as u64,
            counters.max_used_size.max(0) as u64,
            counters.alloc_count.max(0) as u64,
        )
    }

    pub(crate) fn above_high_watermark(&self) -> bool {
        let watermark = self.watermark.load(Ordering::Relaxed);
        if watermark == 0 {
            return false;
        }
        watermark < self.lock().alloc_size
    }

    pub(crate) fn set_max_size(&self, limit: u64) {
        self.max_size.store(clamp_limit(limit), Ordering::Relaxed);
    }

    pub(crate) fn set_max_alloc_count(&self, limit: u64) {
        self.max_alloc_count.store(clamp_limit(limit), Ordering::Relaxed);
    }

    pub(crate) fn set_high_watermark(&self, watermark: u64) {
        self.watermark.store(clamp_limit(watermark), Ordering::Relaxed);
    }

    pub(crate) fn configured_max_size(&self) -> u64 {
        self.max_size.load(Ordering::Relaxed).max(0) as u64
    }

    pub(crate) fn max_alloc_count_limit(&self) -> i64 {
        self.max_alloc_count.load(Ordering::Relaxed)
    }

    pub(crate) fn mark_out_of_memory(&self) {
        self.out_of_memory.store(true, Ordering::Relaxed);
    }

    pub(crate) fn clear_out_of_memory(&self) {
        self.out_of_memory.store(false, Ordering::Relaxed);
    }

    pub(crate) fn is_out_of_memory(&self) -> bool {
        self.out_of_memory.load(Ordering::Relaxed)
    }

    pub(crate) fn set_exit_on_oom(&self, exit: bool, message: Option<&str>) {
        let mut slot = self
            .oom_message
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = message.map(str::to_owned);
        drop(slot);
        self.exit_on_oom.store(exit, Ordering::Relaxed);
    }

    pub(crate) fn exit_on_oom(&self) -> bool {
        self.exit_on_oom.load(Ordering::Relaxed)
    }

    /// Runs `f` on the configured fatal message (or the default) while the
    /// message lock is held, so the fatal path never clones the string.
    pub(crate) fn with_oom_message<R>(&self, f: impl FnOnce(&str) -> R) -> R {
        let slot = self
            .oom_message
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(slot.as_deref().unwrap_or(crate::error::DEFAULT_OOM_MESSAGE))
    }
}

fn clamp_limit(limit: u64) -> i64 {
    limit.min(i64::MAX as u64) as i64
}

/// The process-wide accounting instance behind the crate's free functions.
pub(crate) static STATE: AccountingState = AccountingState::new();

/// Sets the hard ceiling on live heap bytes. 0 removes the limit.
///
/// Applies to merges that start after the store; a merge already holding the
/// counters lock finishes against the previous bound.
pub fn set_max_size(limit: u64) {
    #[cfg(feature = "tracing")]
    tracing::debug!(limit, "max heap size configured");
    STATE.set_max_size(limit);
}

/// Sets the hard ceiling on allocating operations. 0 removes the limit.
///
/// Breaching this ceiling always terminates the process; see
/// [`EXIT_ALLOC_COUNT_EXCEEDED`](crate::EXIT_ALLOC_COUNT_EXCEEDED).
pub fn set_max_alloc_count(limit: u64) {
    #[cfg(feature = "tracing")]
    tracing::debug!(limit, "max allocation count configured");
    STATE.set_max_alloc_count(limit);
}

/// Sets the advisory watermark consulted by [`above_high_watermark`].
/// 0 disables the signal.
pub fn set_high_watermark(watermark: u64) {
    #[cfg(feature = "tracing")]
    tracing::debug!(watermark, "high watermark configured");
    STATE.set_high_watermark(watermark);
}

/// Backpressure signal: true once merged live bytes exceed the watermark.
/// Always false while the watermark is disabled. Purely advisory; nothing in
/// this crate changes behavior when it trips.
pub fn above_high_watermark() -> bool {
    STATE.above_high_watermark()
}

/// Live heap bytes as of the last merge from any thread, clamped at zero.
///
/// Deltas still buffered in other threads are invisible until they cross the
/// synchronization threshold or get flushed.
pub fn get_allocation_size() -> u64 {
    STATE.allocation_size()
}

/// Peak of [`get_allocation_size`] over the process lifetime. Never reset,
/// not even by a finalize/initialize cycle.
pub fn get_max_used_memory() -> u64 {
    STATE.max_used_memory()
}

/// Allocating operations merged so far. Frees do not decrease it: the count
/// ceiling is a circuit breaker on allocation traffic, not a live-block
/// count.
pub fn get_allocation_count() -> u64 {
    STATE.allocation_count()
}

/// The byte ceiling currently in force, 0 when unlimited.
pub fn get_configured_max_size() -> u64 {
    STATE.configured_max_size()
}

/// Sticky flag set by every out-of-memory raise. Cleared only when a fresh
/// session starts via [`initialize`](crate::initialize).
pub fn is_out_of_memory() -> bool {
    STATE.is_out_of_memory()
}

/// Arms or disarms fatal out-of-memory handling.
///
/// While armed, a byte-ceiling breach or host-allocator failure prints
/// `message` (or a default) to stderr and terminates with
/// [`EXIT_OUT_OF_MEMORY`](crate::EXIT_OUT_OF_MEMORY) instead of returning
/// [`OutOfMemory`](crate::OutOfMemory) to the caller.
pub fn exit_when_out_of_memory(exit: bool, message: Option<&str>) {
    #[cfg(feature = "tracing")]
    tracing::debug!(exit, "fatal out-of-memory handling toggled");
    STATE.set_exit_on_oom(exit, message);
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn merge_accumulates_and_tracks_peak() {
        let state = AccountingState::new();
        assert_eq!(state.merge(1000, 1, true), MergeOutcome::Admitted);
        assert_eq!(state.merge(500, 1, true), MergeOutcome::Admitted);
        assert_eq!(state.allocation_size(), 1500);
        assert_eq!(state.allocation_count(), 2);
        state.merge(-1200, 0, false);
        assert_eq!(state.allocation_size(), 300);
        assert_eq!(state.max_used_memory(), 1500);
    }

    #[test]
    fn byte_limit_verdict_requires_an_allocating_merge() {
        let state = AccountingState::new();
        state.set_max_size(1000);
        // A free-side merge may reveal the breach but stays silent.
        assert_eq!(state.merge(1500, 1, false), MergeOutcome::Admitted);
        assert_eq!(state.merge(10, 1, true), MergeOutcome::OverByteLimit);
    }

    #[test]
    fn byte_limit_wins_when_both_ceilings_break() {
        let state = AccountingState::new();
        state.set_max_size(100);
        state.set_max_alloc_count(1);
        assert_eq!(state.merge(500, 5, true), MergeOutcome::OverByteLimit);
    }

    #[test]
    fn count_limit_trips_past_the_bound() {
        let state = AccountingState::new();
        state.set_max_alloc_count(3);
        assert_eq!(state.merge(10, 3, true), MergeOutcome::Admitted);
        assert_eq!(state.merge(10, 1, true), MergeOutcome::OverCountLimit);
    }

    #[test]
    fn zero_bound_means_no_limit() {
        let state = AccountingState::new();
        state.set_max_size(400);
        state.set_max_size(0);
        assert_eq!(state.merge(1_000_000, 1, true), MergeOutcome::Admitted);
    }

    #[test]
    fn negative_live_size_reads_as_zero() {
        let state = AccountingState::new();
        state.merge(-5000, 0, false);
        assert_eq!(state.allocation_size(), 0);
        assert_eq!(state.max_used_memory(), 0);
    }

    #[test]
    fn watermark_is_strict_and_disabled_at_zero() {
        let state = AccountingState::new();
        state.merge(10_000, 1, false);
        assert!(!state.above_high_watermark());
        state.set_high_watermark(9_999);
        assert!(state.above_high_watermark());
        state.set_high_watermark(10_000);
        assert!(!state.above_high_watermark());
    }

    #[test]
    fn sticky_flag_and_fatal_mode_round_trip() {
        let state = AccountingState::new();
        assert!(!state.is_out_of_memory());
        state.mark_out_of_memory();
        assert!(state.is_out_of_memory());
        state.clear_out_of_memory();
        assert!(!state.is_out_of_memory());

        state.set_exit_on_oom(true, Some("boom"));
        assert!(state.exit_on_oom());
        state.with_oom_message(|msg| assert_eq!(msg, "boom"));
        state.set_exit_on_oom(false, None);
        state.with_oom_message(|msg| assert_eq!(msg, crate::error::DEFAULT_OOM_MESSAGE));
    }

    proptest! {
        #[test]
        fn merge_matches_a_sequential_model(
            deltas in proptest::collection::vec(-50_000i64..50_000, 1..64),
        ) {
            let state = AccountingState::new();
            let mut live = 0i64;
            let mut peak = 0i64;
            for delta in deltas {
                state.merge(delta, i64::from(delta > 0), false);
                live += delta;
                peak = peak.max(live);
            }
            prop_assert_eq!(state.allocation_size(), live.max(0) as u64);
            prop_assert_eq!(state.max_used_memory(), peak.max(0) as u64);
        }
    }
}
