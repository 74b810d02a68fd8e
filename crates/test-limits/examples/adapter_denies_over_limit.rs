//! With the adapter installed as the global allocator, ordinary collection
//! growth is subject to admission control: `try_reserve` surfaces a denial
//! as an allocation error instead of aborting.

use memgate::{
    flush_thread_counters, get_allocation_size, initialize, is_out_of_memory, set_max_size,
    GateAllocator,
};

#[global_allocator]
static GLOBAL: GateAllocator = GateAllocator;

fn main() {
    initialize(None);
    // Sized up front: growing this vec later could itself be denied.
    let mut chunks: Vec<Vec<u8>> = Vec::with_capacity(40);

    flush_thread_counters();
    let baseline = get_allocation_size();
    set_max_size(baseline + 2_000_000);

    let mut denied = false;
    for _ in 0..40 {
        let mut chunk: Vec<u8> = Vec::new();
        if chunk.try_reserve(500_000).is_err() {
            denied = true;
            break;
        }
        chunk.resize(500_000, 0);
        chunks.push(chunk);
    }

    let sticky = is_out_of_memory();
    // Release everything before printing: with the ceiling still breached,
    // even the stdout buffer could be denied.
    drop(chunks);
    flush_thread_counters();

    assert!(denied, "the ceiling must deny a reserve eventually");
    assert!(sticky);
    println!("try_reserve denied");
    println!("sticky flag set");
}
