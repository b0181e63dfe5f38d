//! Integration Test: Sleep Prohibition
//!
//! Production code must be driven by timers and events, never by sleeping.
//! Periodic work uses `tokio::time::interval`; cancellation uses the
//! shutdown signal.
//!
//! The one exception is the controller's reload settling pause, which must
//! name the settle interval on the same line.

use architectural_enforcement::{scan, sleep_violation};

#[test]
fn test_no_sleep_in_production_code() {
    let violations = scan(sleep_violation);

    if !violations.is_empty() {
        eprintln!("\n❌ sleep() calls found in production code!\n");
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }
        eprintln!("\n✅ Use instead:");
        eprintln!("  - tokio::time::interval(period) with MissedTickBehavior::Skip");
        eprintln!("  - ShutdownSignal::cancelled() in a tokio::select!");
        panic!(
            "\nFound {} sleep violation(s) in production code.",
            violations.len()
        );
    }
}
