//! Fatal mode without a custom message falls back to the default diagnostic.

use memgate::{allocate, exit_when_out_of_memory, initialize, set_max_size};

fn main() {
    initialize(None);
    exit_when_out_of_memory(true, None);
    set_max_size(500_000);

    let mut live = Vec::new();
    for _ in 0..10 {
        match allocate(300_000) {
            Ok(block) => live.push(block),
            Err(_) => {
                println!("past the limit");
                std::process::exit(0);
            }
        }
    }
}
