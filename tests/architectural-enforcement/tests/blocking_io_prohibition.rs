//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: async production code must not block the runtime.
//! **Required**: `tokio::fs` and `tokio::net` inside async code; `reqwest`'s
//! async client everywhere.
//!
//! Blocking file I/O stays acceptable in plain functions that run before the
//! runtime does real work (log file setup).

use architectural_enforcement::{blocking_io_violation, scan};

#[test]
fn test_no_blocking_io_in_async_code() {
    let violations = scan(blocking_io_violation);

    if !violations.is_empty() {
        eprintln!("\n❌ Blocking I/O found in async production code!\n");
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }
        eprintln!("\n✅ REQUIRED async I/O:");
        eprintln!("  - tokio::fs::read_to_string().await, tokio::fs::write().await");
        eprintln!("  - tokio::net::TcpStream::connect().await");
        eprintln!("  - reqwest::Client (async)");
        panic!(
            "\nFound {} blocking I/O violation(s) in production code.",
            violations.len()
        );
    }
}
