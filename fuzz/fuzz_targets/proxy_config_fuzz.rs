//! Fuzz test for the system API proxy configuration parser
//!
//! Arbitrary bytes are fed to the parser the system client uses for
//! `latest.json` documents. It must never panic, and a parsed config must
//! carry a service token.
//!
//! Run with: cargo +nightly fuzz run proxy_config_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use turnstile_client::parse_proxy_config;

fuzz_target!(|data: &[u8]| {
    if let Ok(config) = parse_proxy_config(data) {
        assert!(
            !config.service_token.is_empty(),
            "parsed configs must carry a service token"
        );
        for rule in &config.mapping_rules {
            let _ = rule.matches(&rule.http_method, &rule.pattern);
        }
    }
});
