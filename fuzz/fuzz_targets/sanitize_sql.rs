#![no_main]

use libfuzzer_sys::fuzz_target;
use pgq_client::instrumentation::{SanitizationConfig, extract_operation};

fuzz_target!(|data: &[u8]| {
    if let Ok(sql) = std::str::from_utf8(data) {
        let config = SanitizationConfig {
            max_length: 64,
            ..SanitizationConfig::default()
        };
        let sanitized = config.sanitize(sql);
        assert!(sanitized.len() <= 64);
        let _ = extract_operation(sql);
    }
});
