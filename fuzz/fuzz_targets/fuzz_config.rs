//! Fuzz target for estimator configuration parsing.

#![no_main]

use libfuzzer_sys::fuzz_target;
use swap_common::Config;

fuzz_target!(|data: &str| {
    // Parsing and validation should never panic, only return an error
    let _ = Config::from_json(data);
});
