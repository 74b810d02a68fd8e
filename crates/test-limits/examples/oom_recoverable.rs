//! Byte-ceiling breach in the default (recoverable) mode: the crossing
//! allocation fails, the sticky flag sets, and a repeat initialize leaves it
//! alone.

use memgate::{
    allocate, deallocate, finalize, flush_thread_counters, initialize, is_out_of_memory,
    set_max_size,
};

fn main() {
    initialize(None);
    set_max_size(1_000_000);

    let mut live = Vec::new();
    for index in 1..=10 {
        match allocate(400_000) {
            Ok(block) => live.push(block),
            Err(err) => {
                println!("denied at block {index}: {err}");
                break;
            }
        }
    }
    assert_eq!(live.len(), 2, "two blocks fit under the ceiling");

    assert!(is_out_of_memory());
    println!("sticky flag set");

    initialize(None);
    assert!(is_out_of_memory());
    println!("sticky flag survives re-initialize");

    for block in live {
        unsafe { deallocate(block) };
    }
    flush_thread_counters();
    finalize(false);
}
