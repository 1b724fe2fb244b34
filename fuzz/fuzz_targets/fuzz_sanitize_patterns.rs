#![no_main]

use libfuzzer_sys::fuzz_target;

use hotsheet_gateway::security::{sanitize_log, truncate_for_log};
use hotsheet_gateway::server::handlers::{sanitize_brand_name, sanitize_title, strip_code_fence};

fuzz_target!(|data: &str| {
    // Regex-driven sanitizers run on untrusted text; libFuzzer's per-input
    // timeout catches pathological inputs.
    let _ = sanitize_log(data);
    let _ = truncate_for_log(data, 500);
    assert!(sanitize_brand_name(data).chars().count() <= 100);
    let _ = sanitize_title(data);
    let _ = strip_code_fence(data);
});
