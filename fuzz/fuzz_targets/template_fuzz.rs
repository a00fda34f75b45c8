//! Fuzz target for template scanning.
//!
//! Arbitrary text must never panic the scanner or spec construction, and any
//! template that parses must substitute cleanly when every field has a value.
//!
//! Run with: `cargo +nightly fuzz run template_fuzz`

#![no_main]

use libfuzzer_sys::fuzz_target;
use query_model::{ModelSpec, escape_placeholder_value, template};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if template::field_names(text).is_ok() {
        let filled = template::substitute(text, |_| Some("x"));
        assert!(filled.is_ok(), "parsed template failed to substitute: {text:?}");
    }

    let _ = ModelSpec::new("Fuzz", text);

    // Escaped values come back unchanged after the second pass.
    let escaped = escape_placeholder_value(text);
    let restored = template::substitute(&escaped, |_| None);
    assert_eq!(restored.as_deref(), Ok(text));
});
