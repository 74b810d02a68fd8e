//! Failure semantics: the recoverable error value, the fatal exit paths, and
//! the statuses they terminate with.

use std::process;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

use crate::counters::AccountingState;

/// Process exit status used when a byte-ceiling breach or host failure is
/// handled in fatal mode.
pub const EXIT_OUT_OF_MEMORY: i32 = 101;

/// Process exit status used when the allocation-count ceiling is exhausted.
pub const EXIT_ALLOC_COUNT_EXCEEDED: i32 = 112;

/// Message printed by the fatal path when no custom one was configured.
pub(crate) const DEFAULT_OOM_MESSAGE: &str = "ERROR: out of memory";

/// The byte ceiling was breached, or the host allocator refused a request.
///
/// Recoverable unless [`exit_when_out_of_memory`](crate::exit_when_out_of_memory)
/// armed the fatal mode. The value is `Copy` and carries only the failing
/// request size, so building one never allocates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("out of memory ({requested} bytes requested)")]
pub struct OutOfMemory {
    /// Bytes asked of the host allocator by the failing operation.
    pub requested: usize,
}

// Set once a fatal path is entered. Printing the diagnostic can itself
// allocate (stream buffers), and a nested breach must exit instead of
// re-entering the printer.
static IN_FATAL: AtomicBool = AtomicBool::new(false);

fn enter_fatal() -> bool {
    !IN_FATAL.swap(true, Ordering::SeqCst)
}

/// Marks the state out of memory and either returns the recoverable error or,
/// in fatal mode, prints the configured message to stderr and exits.
pub(crate) fn raise_out_of_memory(state: &AccountingState, requested: usize) -> OutOfMemory {
    state.mark_out_of_memory();
    if state.exit_on_oom() {
        fatal_out_of_memory(state);
    }
    OutOfMemory { requested }
}

fn fatal_out_of_memory(state: &AccountingState) -> ! {
    if enter_fatal() {
        state.with_oom_message(|message| eprintln!("{message}"));
    }
    process::exit(EXIT_OUT_OF_MEMORY)
}

/// Count exhaustion is a circuit breaker, never a recoverable error: print
/// the diagnostic and terminate.
pub(crate) fn fatal_alloc_count_exceeded(state: &AccountingState) -> ! {
    if enter_fatal() {
        println!(
            "allocation count limit {} exceeded",
            state.max_alloc_count_limit()
        );
    }
    process::exit(EXIT_ALLOC_COUNT_EXCEEDED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_failing_request() {
        let err = OutOfMemory { requested: 4096 };
        assert_eq!(err.to_string(), "out of memory (4096 bytes requested)");
    }

    #[test]
    fn exit_statuses_stay_distinct() {
        assert_ne!(EXIT_OUT_OF_MEMORY, EXIT_ALLOC_COUNT_EXCEEDED);
    }
}
