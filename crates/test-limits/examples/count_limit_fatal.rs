//! The allocation-count ceiling is a circuit breaker: the allocation past
//! the bound terminates the process with its own status, never a catchable
//! error, with the diagnostic on stdout.

use memgate::{allocate, initialize, set_max_alloc_count};

fn main() {
    initialize(None);
    set_max_alloc_count(3);

    let mut live = Vec::new();
    // Each block is large enough to force a merge, so the count is checked
    // on every allocation.
    for index in 1..=3 {
        live.push(allocate(200_000).expect("within the count ceiling"));
        println!("allocated block {index}");
    }

    let _ = allocate(200_000);
    println!("past the limit");
}
