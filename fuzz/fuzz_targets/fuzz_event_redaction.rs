//! Fuzz target for log redaction of trigger payloads.
//!
//! Any JSON document is accepted. A `password` planted in `request` is
//! always masked.
//!
//! Run with:
//! cargo +nightly fuzz run fuzz_event_redaction -- -max_total_time=600

#![no_main]

use libfuzzer_sys::fuzz_target;
use serde_json::Value;
use xavyo_user_migration::RedactionPolicy;

const SENTINEL: &str = "fuzz-sentinel-password-7f3a";

fuzz_target!(|data: &[u8]| {
    let Ok(mut value) = serde_json::from_slice::<Value>(data) else {
        return;
    };

    if let Some(object) = value.as_object_mut() {
        let request = object
            .entry("request")
            .or_insert_with(|| Value::Object(Default::default()));
        if let Some(request) = request.as_object_mut() {
            request.insert("password".to_string(), Value::String(SENTINEL.to_string()));
        }
    }

    let redacted = RedactionPolicy::default().redact(&value);
    if value["request"].is_object() {
        assert_eq!(redacted["request"]["password"], "[REDACTED]");
    }
    let _ = RedactionPolicy::default().redact_to_string(&value);
});
