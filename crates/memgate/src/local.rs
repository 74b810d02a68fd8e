//! Per-thread delta buffering and the merge trigger.
//!
//! Threads accumulate unlocked deltas and only take the counters lock once
//! the synchronization threshold is crossed. The `single-thread` feature
//! replaces the buffer with direct merges, keeping the same helper surface.

cfg_if::cfg_if! {
    if #[cfg(not(feature = "single-thread"))] {
        use std::cell::Cell;

        use crate::counters::{MergeOutcome, SYNC_THRESHOLD, STATE};

        struct LocalCounters {
            delta_size: Cell<i64>,
            delta_count: Cell<i64>,
        }

        impl LocalCounters {
            fn take(&self) -> (i64, i64) {
                let deltas = (self.delta_size.get(), self.delta_count.get());
                self.delta_size.set(0);
                self.delta_count.set(0);
                deltas
            }
        }

        impl Drop for LocalCounters {
            // A thread can exit with an unmerged residue; publish it so the
            // global total stays equal to the sum of live blocks.
            fn drop(&mut self) {
                let (delta_size, delta_count) = self.take();
                if delta_size != 0 || delta_count != 0 {
                    STATE.merge(delta_size, delta_count, false);
                }
            }
        }

        thread_local! {
            static LOCAL: LocalCounters = const {
                LocalCounters {
                    delta_size: Cell::new(0),
                    delta_count: Cell::new(0),
                }
            };
        }

        /// Records an allocating charge of `delta` bytes (a fresh block's
        /// consumed size, or a resize's growth), merging once the positive
        /// threshold is crossed.
        #[inline]
        pub(crate) fn record_alloc(delta: i64) -> MergeOutcome {
            let merged = LOCAL.try_with(|local| {
                local.delta_size.set(local.delta_size.get() + delta);
                local.delta_count.set(local.delta_count.get() + 1);
                if local.delta_size.get() > SYNC_THRESHOLD {
                    let (delta_size, delta_count) = local.take();
                    STATE.merge(delta_size, delta_count, true)
                } else {
                    MergeOutcome::Admitted
                }
            });
            match merged {
                Ok(outcome) => outcome,
                // The buffer's destructor already ran; account directly.
                Err(_) => STATE.merge(delta, 1, true),
            }
        }

        /// Rolls back a charge recorded by [`record_alloc`] after the block
        /// it covered was denied and released.
        #[inline]
        pub(crate) fn rollback_alloc(delta: i64) {
            let undone = LOCAL.try_with(|local| {
                local.delta_size.set(local.delta_size.get() - delta);
                local.delta_count.set(local.delta_count.get() - 1);
            });
            if undone.is_err() {
                STATE.merge(-delta, -1, false);
            }
        }

        /// Subtracts a freed block's bytes. The threshold check runs
        /// separately in [`sync_after_free`] so the host release happens
        /// between the two.
        #[inline]
        pub(crate) fn record_free(consumed: i64) {
            let recorded = LOCAL.try_with(|local| {
                local.delta_size.set(local.delta_size.get() - consumed);
            });
            if recorded.is_err() {
                STATE.merge(-consumed, 0, false);
            }
        }

        /// Merges after a deallocation once the negative threshold is
        /// crossed. Never evaluates limits.
        #[inline]
        pub(crate) fn sync_after_free() {
            let _ = LOCAL.try_with(|local| {
                if local.delta_size.get() < -SYNC_THRESHOLD {
                    let (delta_size, delta_count) = local.take();
                    STATE.merge(delta_size, delta_count, false);
                }
            });
        }

        /// Folds the host's rounding surplus after a resize into the thread
        /// delta without an admission check.
        #[inline]
        pub(crate) fn record_adjustment(extra: i64) {
            if extra == 0 {
                return;
            }
            let recorded = LOCAL.try_with(|local| {
                local.delta_size.set(local.delta_size.get() + extra);
            });
            if recorded.is_err() {
                STATE.merge(extra, 0, false);
            }
        }

        /// Publishes the calling thread's deltas immediately, regardless of
        /// the threshold.
        ///
        /// A read-side aid: after every worker has flushed (or exited, which
        /// flushes implicitly), [`get_allocation_size`](crate::get_allocation_size)
        /// is exact. Never evaluates limits, so it is safe to call with a
        /// ceiling already breached.
        pub fn flush_thread_counters() {
            let _ = LOCAL.try_with(|local| {
                let (delta_size, delta_count) = local.take();
                if delta_size != 0 || delta_count != 0 {
                    STATE.merge(delta_size, delta_count, false);
                }
            });
        }
    } else {
        use crate::counters::{MergeOutcome, STATE};

        // With one writer there is nothing to buffer: every operation merges
        // directly and sees the policy verdict synchronously.

        #[inline]
        pub(crate) fn record_alloc(delta: i64) -> MergeOutcome {
            STATE.merge(delta, 1, true)
        }

        #[inline]
        pub(crate) fn rollback_alloc(delta: i64) {
            STATE.merge(-delta, -1, false);
        }

        #[inline]
        pub(crate) fn record_free(consumed: i64) {
            STATE.merge(-consumed, 0, false);
        }

        #[inline]
        pub(crate) fn sync_after_free() {}

        #[inline]
        pub(crate) fn record_adjustment(extra: i64) {
            if extra != 0 {
                STATE.merge(extra, 0, false);
            }
        }

        /// Nothing is buffered in the single-thread configuration; reads are
        /// always exact.
        pub fn flush_thread_counters() {}
    }
}
