//! Routing every Rust heap allocation through the admission checks.

use std::alloc::{GlobalAlloc, Layout, System};
use std::ptr;

use crate::counters::{MergeOutcome, STATE};
use crate::error;
use crate::local;

/// Drop-in [`GlobalAlloc`] that delegates to [`System`] and accounts every
/// block against the process-wide ceilings.
///
/// ```ignore
/// #[global_allocator]
/// static GLOBAL: memgate::GateAllocator = memgate::GateAllocator;
/// ```
///
/// A denied allocation is released again and surfaces as null, which Rust's
/// allocation machinery treats as allocation failure (`try_reserve` callers
/// see an error; infallible callers abort). Count exhaustion terminates the
/// process exactly like the facade. Blocks are measured by the host's usable
/// size where the platform reports one, by `Layout::size` otherwise; the
/// `size-header` feature does not apply here, since a header would break the
/// alignment `GlobalAlloc` guarantees.
///
/// The recoverable path never panics and never prints.
pub struct GateAllocator;

unsafe impl GlobalAlloc for GateAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = System.alloc(layout);
        if ptr.is_null() {
            let _ = error::raise_out_of_memory(&STATE, layout.size());
            return ptr;
        }
        let consumed = block_size(ptr, layout) as i64;
        match local::record_alloc(consumed) {
            MergeOutcome::Admitted => ptr,
            MergeOutcome::OverByteLimit => {
                let _ = error::raise_out_of_memory(&STATE, layout.size());
                System.dealloc(ptr, layout);
                local::rollback_alloc(consumed);
                ptr::null_mut()
            }
            MergeOutcome::OverCountLimit => error::fatal_alloc_count_exceeded(&STATE),
        }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        let consumed = block_size(ptr, layout) as i64;
        local::record_free(consumed);
        System.dealloc(ptr, layout);
        local::sync_after_free();
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let old_consumed = block_size(ptr, layout) as i64;
        let growth = new_size as i64 - old_consumed;
        if growth > 0 {
            match local::record_alloc(growth) {
                MergeOutcome::Admitted => {}
                MergeOutcome::OverByteLimit => {
                    let _ = error::raise_out_of_memory(&STATE, new_size);
                    local::rollback_alloc(growth);
                    return ptr::null_mut();
                }
                MergeOutcome::OverCountLimit => error::fatal_alloc_count_exceeded(&STATE),
            }
        }
        let moved = System.realloc(ptr, layout, new_size);
        if moved.is_null() {
            if growth > 0 {
                local::rollback_alloc(growth);
            }
            return moved;
        }
        let actual =
            block_size(moved, Layout::from_size_align_unchecked(new_size, layout.align())) as i64;
        if growth > 0 {
            local::record_adjustment(actual - old_consumed - growth);
        } else {
            // Shrinks bypass admission; apply the whole effect free-side.
            local::record_free(old_consumed - actual);
            local::sync_after_free();
        }
        moved
    }
}

cfg_if::cfg_if! {
    if #[cfg(any(
        target_os = "linux",
        target_os = "android",
        target_os = "freebsd",
        target_os = "macos",
        target_os = "ios"
    ))] {
        #[inline]
        unsafe fn block_size(ptr: *mut u8, _layout: Layout) -> usize {
            crate::usable_size::host_usable_size(ptr.cast())
        }
    } else {
        #[inline]
        unsafe fn block_size(_ptr: *mut u8, layout: Layout) -> usize {
            layout.size()
        }
    }
}
