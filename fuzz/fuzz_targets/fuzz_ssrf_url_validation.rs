#![no_main]

use libfuzzer_sys::fuzz_target;

use hotsheet_gateway::security::SsrfProtection;

fuzz_target!(|data: &str| {
    // Must never panic, and anything accepted must satisfy the guard's
    // own post-conditions.
    if let Ok(url) = SsrfProtection::validate_url(data) {
        let parsed = url.as_url();
        assert_eq!(parsed.scheme(), "https");
        assert!(parsed.username().is_empty() && parsed.password().is_none());
        assert!(!url.host().starts_with('['));
        assert!(!url.host().ends_with(".local") && !url.host().ends_with(".internal"));
    }
});
