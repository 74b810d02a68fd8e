//! The allocate/deallocate/reallocate entry points over the host allocator.

use std::ptr::NonNull;

use crate::counters::{MergeOutcome, STATE};
use crate::error::{self, OutOfMemory};
use crate::local;
use crate::usable_size::{ActiveRecovery as Recovery, SizeRecovery};

/// Allocates `size` bytes through the host allocator, admitting the block
/// against the configured ceilings.
///
/// Zero-byte requests are served as one byte so every success is a distinct
/// live block. If the host refuses, the error is raised with the counters
/// untouched. If a triggered merge reports the byte ceiling breached, the
/// fresh block is released and the charge rolled back before the error is
/// raised, so a failed call leaves no residue; with
/// [`exit_when_out_of_memory`](crate::exit_when_out_of_memory) armed the
/// process exits instead. Count exhaustion always terminates the process.
pub fn allocate(size: usize) -> Result<NonNull<u8>, OutOfMemory> {
    let size = size.max(1);
    let Some(total) = size.checked_add(Recovery::OVERHEAD) else {
        return Err(error::raise_out_of_memory(&STATE, size));
    };
    let raw = unsafe { libc::malloc(total) };
    if raw.is_null() {
        return Err(error::raise_out_of_memory(&STATE, total));
    }
    let ptr = unsafe { Recovery::finish_block(raw, total) };
    let consumed = unsafe { Recovery::consumed_size(ptr) } as i64;
    match local::record_alloc(consumed) {
        MergeOutcome::Admitted => Ok(ptr),
        MergeOutcome::OverByteLimit => {
            unsafe { libc::free(raw) };
            local::rollback_alloc(consumed);
            Err(error::raise_out_of_memory(&STATE, total))
        }
        MergeOutcome::OverCountLimit => error::fatal_alloc_count_exceeded(&STATE),
    }
}

/// Releases a block obtained from [`allocate`] or [`reallocate`].
///
/// Never fails: a merge triggered here skips limit evaluation entirely, so
/// cleanup keeps working with a ceiling already breached.
///
/// # Safety
/// `ptr` must have come from this facade and not have been released or
/// resized since.
pub unsafe fn deallocate(ptr: NonNull<u8>) {
    let consumed = Recovery::consumed_size(ptr) as i64;
    let raw = Recovery::raw_block(ptr);
    local::record_free(consumed);
    libc::free(raw);
    local::sync_after_free();
}

/// Resizes a block, returning the same pointer whenever the bytes it already
/// holds accommodate `new_size`.
///
/// The in-place path has no counter effect and cannot fail. A growth is
/// admitted against the ceilings before the host resize runs, so both a
/// denial and a host failure leave the caller's block untouched and valid;
/// the charge is corrected to the true consumed size afterwards.
///
/// # Safety
/// `ptr` must have come from this facade and not have been released. On
/// success the old pointer is invalid unless it was returned unchanged.
pub unsafe fn reallocate(ptr: NonNull<u8>, new_size: usize) -> Result<NonNull<u8>, OutOfMemory> {
    let old_total = Recovery::consumed_size(ptr);
    if old_total - Recovery::OVERHEAD >= new_size {
        return Ok(ptr);
    }
    let Some(new_total) = new_size.checked_add(Recovery::OVERHEAD) else {
        return Err(error::raise_out_of_memory(&STATE, new_size));
    };
    let growth = new_total as i64 - old_total as i64;
    match local::record_alloc(growth) {
        MergeOutcome::Admitted => {}
        MergeOutcome::OverByteLimit => {
            local::rollback_alloc(growth);
            return Err(error::raise_out_of_memory(&STATE, new_total));
        }
        MergeOutcome::OverCountLimit => error::fatal_alloc_count_exceeded(&STATE),
    }
    let moved = libc::realloc(Recovery::raw_block(ptr), new_total);
    if moved.is_null() {
        local::rollback_alloc(growth);
        return Err(error::raise_out_of_memory(&STATE, new_total));
    }
    let new_ptr = Recovery::finish_block(moved, new_total);
    local::record_adjustment(Recovery::consumed_size(new_ptr) as i64 - new_total as i64);
    Ok(new_ptr)
}
