//! Fuzz target for trigger event parsing.
//!
//! Malformed payloads and unknown trigger sources must be rejected without
//! panicking, and the error text must not echo the payload.
//!
//! Run with:
//! cargo +nightly fuzz run fuzz_event_parsing -- -max_total_time=600

#![no_main]

use libfuzzer_sys::fuzz_target;
use serde_json::Value;
use xavyo_user_migration::{MigrationEvent, TriggerKind};

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        match TriggerKind::from_trigger_source(s) {
            Ok(kind) => assert_eq!(kind.as_str(), s),
            Err(e) => {
                let _ = e.client_message(None);
            }
        }
    }

    if let Ok(value) = serde_json::from_slice::<Value>(data) {
        if let Ok(event) = MigrationEvent::from_value(&value) {
            assert!(!event.user_name.trim().is_empty());
            let _ = TriggerKind::from_trigger_source(&event.trigger_source);
        }
    }
});
