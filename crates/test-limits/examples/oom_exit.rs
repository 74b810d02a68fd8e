//! Byte-ceiling breach with fatal mode armed: the process must terminate
//! with the out-of-memory status, printing the custom message to stderr.

use memgate::{allocate, exit_when_out_of_memory, initialize, set_max_size};

fn main() {
    initialize(None);
    exit_when_out_of_memory(true, Some("heap budget exhausted"));
    set_max_size(500_000);

    let mut live = Vec::new();
    for _ in 0..10 {
        match allocate(300_000) {
            Ok(block) => live.push(block),
            Err(_) => {
                // Unreachable: the breach exits before an error can surface.
                println!("past the limit");
                std::process::exit(0);
            }
        }
    }
}
