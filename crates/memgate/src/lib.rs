//! Process-wide allocation accounting and admission control.
//!
//! A thin wrapper over the host allocator that tracks the bytes and count of
//! live allocations, enforces configurable hard ceilings, and exposes an
//! advisory high-watermark for backpressure. Threads buffer their deltas
//! locally and only take the global lock once a synchronization threshold is
//! crossed, so the allocation fast path stays unserialized; totals reflect
//! the bytes the allocator really holds (its usable size), not what callers
//! requested.
//!
//! ```
//! memgate::initialize(None);
//! memgate::set_max_size(64 * 1024 * 1024);
//!
//! let block = memgate::allocate(4096).unwrap();
//! // ... use the block ...
//! unsafe { memgate::deallocate(block) };
//!
//! memgate::flush_thread_counters();
//! assert!(!memgate::above_high_watermark());
//! memgate::finalize(false);
//! ```
//!
//! Byte-ceiling breaches surface as a recoverable [`OutOfMemory`] (or
//! terminate the process once [`exit_when_out_of_memory`] arms fatal mode);
//! exhausting the allocation-count ceiling always terminates. Freeing never
//! fails, even when a free-triggered merge reveals a ceiling already
//! breached.
//!
//! Feature flags: `single-thread` drops the per-thread buffering for
//! single-writer processes; `size-header` forces the header-based size
//! recovery used on platforms without a usable-size query; `serde` makes
//! [`UsageSnapshot`] serializable; `tracing` emits lifecycle diagnostics.

mod allocator;
mod counters;
mod error;
mod heap;
mod lifecycle;
mod local;
mod report;
mod usable_size;

pub use allocator::GateAllocator;
pub use counters::{
    above_high_watermark, exit_when_out_of_memory, get_allocation_count, get_allocation_size,
    get_configured_max_size, get_max_used_memory, is_out_of_memory, set_high_watermark,
    set_max_alloc_count, set_max_size,
};
pub use error::{OutOfMemory, EXIT_ALLOC_COUNT_EXCEEDED, EXIT_OUT_OF_MEMORY};
pub use heap::{allocate, deallocate, reallocate};
pub use lifecycle::{add_finalizer, add_initializer, finalize, initialize, set_shutdown_hook};
pub use local::flush_thread_counters;
pub use report::{
    display_max_usage, format_bytes, get_max_memory_size, usage_snapshot, UsageSnapshot,
};
