#![no_main]

use libfuzzer_sys::fuzz_target;
use pgq_protocol::ConnParams;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        // Anything that parses must render back to an equivalent string.
        if let Ok(params) = ConnParams::parse(s) {
            let rendered = params.to_conninfo();
            let reparsed = ConnParams::parse(&rendered);
            assert!(reparsed.is_ok(), "rendered conninfo failed to parse: {rendered:?}");
        }
    }
});
