//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code in darkroom MUST NOT call sleep methods.
//! Progress and rendering run on `tokio::time::interval`; everything else
//! waits on I/O.
//! **Exceptions**: retry backoff in the pipeline, simulated latency in the
//! scripted test service, test code.

use std::path::Path;

use architectural_enforcement::{
    code_part, context_contains, read_production_lines, rust_sources, violation, PRODUCTION_DIRS,
};

/// Test that production code does not contain sleep() calls
#[test]
fn test_no_sleep_in_production_code() {
    let violations = find_sleep_violations();

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Sleep calls found in production code!\n");

        for violation in &violations {
            eprintln!("  ❌ {}", violation);
        }

        eprintln!("\n✅ ACCEPTABLE sleep uses:");
        eprintln!("  - Backoff between generate retry attempts");
        eprintln!("  - Scripted service latency (backend/mock.rs)");
        eprintln!("  - Test code (#[cfg(test)] modules, tests/ directories)");
        eprintln!("  - Periodic work using tokio::time::interval()");
        eprintln!("\n❌ FORBIDDEN:");
        eprintln!("  - Sleep in render or progress loops (use interval ticks)");
        eprintln!("  - Sleep as poor man's synchronization");
        eprintln!("  - Sleep to 'wait' for the pipeline (use the watch channel!)");

        panic!(
            "\nFound {} sleep violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}

/// Find all sleep() calls in production code
fn find_sleep_violations() -> Vec<String> {
    let mut violations = Vec::new();
    for dir in PRODUCTION_DIRS {
        for file in rust_sources(dir) {
            check_file(&file, &mut violations);
        }
    }
    violations
}

fn check_file(path: &Path, violations: &mut Vec<String>) {
    let lines = read_production_lines(path);

    for (idx, line) in lines.iter().enumerate() {
        let code = code_part(line);
        if !is_sleep_call(code) {
            continue;
        }

        if is_backoff_context(&lines, idx) {
            continue;
        }

        if path.ends_with("backend/mock.rs") && is_latency_context(&lines, idx) {
            continue;
        }

        violations.push(violation(path, idx + 1, "Sleep call", line));
    }
}

fn is_sleep_call(code: &str) -> bool {
    code.contains("::sleep(") || code.contains(".sleep(") || code.contains("sleep_until(")
}

/// Sleep between retry attempts, with the backoff computed nearby
fn is_backoff_context(lines: &[String], idx: usize) -> bool {
    context_contains(lines, idx, 10, 2, &["backoff", "attempt"])
}

/// Simulated network latency
fn is_latency_context(lines: &[String], idx: usize) -> bool {
    context_contains(lines, idx, 2, 0, &["latency"])
}

#[test]
fn test_sleep_detection() {
    assert!(is_sleep_call("    tokio::time::sleep(Duration::from_millis(10)).await;"));
    assert!(is_sleep_call("std::thread::sleep(d);"));
    assert!(!is_sleep_call("let mut interval = tokio::time::interval(tick);"));
}

#[test]
fn test_backoff_detection() {
    let lines: Vec<String> = [
        "for attempt in 1..=max_attempts {",
        "    let backoff = self.config.backoff_for_attempt(attempt);",
        "    tracing::debug!(backoff_ms = backoff.as_millis(), \"Waiting before retry\");",
        "    if unless_cancelled(token, tokio::time::sleep(backoff)).await.is_none() {",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect();

    assert!(is_backoff_context(&lines, 3));
}

#[test]
fn test_plain_sleep_is_not_backoff() {
    let lines: Vec<String> = [
        "loop {",
        "    render();",
        "    tokio::time::sleep(frame).await;",
        "}",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect();

    assert!(!is_backoff_context(&lines, 2));
    assert!(!is_latency_context(&lines, 2));
}
