//! Fuzz test for mapping rule compilation and matching
//!
//! The first line of the input is a rule pattern, the rest a request path.
//! Compiling any pattern must either succeed or return an error, and a
//! compiled rule must answer any path without panicking.
//!
//! Run with: cargo +nightly fuzz run mapping_rule_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use turnstile_core::{MappingRule, SystemConfig};

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    let (pattern, path) = input.split_once('\n').unwrap_or((input, "/"));

    let Ok(rule) = MappingRule::new("GET", pattern, "hits", 1) else {
        return;
    };

    let matched = rule.matches("GET", path);
    assert!(!rule.matches("DELETE", path), "method must gate the match");

    let config = SystemConfig {
        service_id: "fuzz".to_string(),
        version: 1,
        backend_url: None,
        service_token: "token".to_string(),
        mapping_rules: vec![rule],
        raw: serde_json::Value::Null,
    };

    // Usage exists exactly when the only rule matched
    let usage = config.usage_for("GET", path);
    assert_eq!(usage.is_some(), matched);
    if let Some(usage) = usage {
        assert_eq!(usage.get("hits"), 1);
    }
});
