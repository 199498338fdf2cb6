//! Fuzz target for classification record parsing.
//!
//! Tests that `ClassificationParser::parse_line` handles arbitrary input
//! without panicking, for both flat and nested annotation layouts.

#![no_main]

use libfuzzer_sys::fuzz_target;
use swap_common::AnnotationConfig;
use swap_core::ClassificationParser;

fuzz_target!(|data: &str| {
    let flat = ClassificationParser::new(&AnnotationConfig::default());
    let _ = flat.parse_line(data);

    let nested = ClassificationParser::new(&AnnotationConfig {
        task: "T1".to_string(),
        value_key: Some("0.details".to_string()),
        ..AnnotationConfig::default()
    });
    let _ = nested.parse_line(data);
});
