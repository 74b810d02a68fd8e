//! A merge triggered by a free must stay silent even when it reveals a
//! ceiling already breached; the next allocating merge raises instead.

use memgate::{
    allocate, deallocate, finalize, flush_thread_counters, get_allocation_size, initialize,
    is_out_of_memory, set_max_size,
};

fn main() {
    initialize(None);

    // Build up usage with no ceiling, then configure one below it.
    let mut live: Vec<_> = (0..6)
        .map(|_| allocate(150_000).expect("no ceiling yet"))
        .collect();
    flush_thread_counters();
    set_max_size(200_000);

    // The freed block exceeds the threshold, so this free merges on its own
    // while usage is still far over the ceiling.
    let victim = live.pop().expect("seeded above");
    unsafe { deallocate(victim) };
    assert!(get_allocation_size() > 200_000, "still breached after the free");
    assert!(!is_out_of_memory(), "free-side merges must not raise");
    println!("free-triggered merge stayed silent");

    match allocate(150_000) {
        Ok(_) => println!("allocation unexpectedly admitted"),
        Err(_) => println!("allocating merge raised"),
    }
    assert!(is_out_of_memory());

    for block in live.drain(..) {
        unsafe { deallocate(block) };
    }
    flush_thread_counters();
    finalize(false);
}
