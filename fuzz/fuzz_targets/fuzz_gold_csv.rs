//! Fuzz target for gold label CSV parsing.
//!
//! Tests that `parse_golds` handles arbitrary input without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use swap_core::parse_golds;

fuzz_target!(|data: &[u8]| {
    // Invalid UTF-8 surfaces as a malformed record, never a panic
    let _ = parse_golds(data);
});
