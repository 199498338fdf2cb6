//! Fuzz target for estimator snapshot loading.
//!
//! Snapshots are read back from disk, so a damaged file must fail cleanly.

#![no_main]

use libfuzzer_sys::fuzz_target;
use swap_core::{Swap, SwapSnapshot};

fuzz_target!(|data: &[u8]| {
    if let Ok(snapshot) = serde_json::from_slice::<SwapSnapshot>(data) {
        if let Ok(mut swap) = Swap::from_snapshot(snapshot) {
            swap.cycle();
            let _ = swap.retire_default();
        }
    }
});
