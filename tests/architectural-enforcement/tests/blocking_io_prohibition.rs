//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: async functions in darkroom MUST NOT use blocking I/O.
//! **Required**: `tokio::fs` for photo reads, `spawn_blocking` for decoding and
//! for synchronous loaders, reqwest's async client for the network.
//!
//! Plain `fn`s may block; they run before the runtime starts or on the
//! blocking pool (config loading is one of them).

use std::path::Path;

use architectural_enforcement::{
    code_part, enclosing_fn, read_production_lines, rust_sources, violation, Enclosing,
    PRODUCTION_DIRS,
};

/// Test that async production code does not use blocking I/O
#[test]
fn test_no_blocking_io_in_production_code() {
    let violations = find_blocking_io_violations();

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Blocking I/O calls found in async production code!\n");

        for violation in &violations {
            eprintln!("  ❌ {}", violation);
        }

        eprintln!("\n❌ FORBIDDEN blocking I/O in async fns:");
        eprintln!("  - std::fs::read(), std::fs::write(), std::fs::File");
        eprintln!("  - std::net::TcpStream, std::net::TcpListener");
        eprintln!("  - std::process::Command");
        eprintln!("  - reqwest::blocking::*");
        eprintln!("  - image::open() (reads the file synchronously)");
        eprintln!("\n✅ REQUIRED:");
        eprintln!("  - tokio::fs::read().await");
        eprintln!("  - tokio::task::spawn_blocking for decode and sync loaders");

        panic!(
            "\nFound {} blocking I/O violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}

/// Find all blocking I/O calls in async production code
fn find_blocking_io_violations() -> Vec<String> {
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

        // HTTP must stay async everywhere
        if code.contains("reqwest::blocking") {
            violations.push(violation(path, idx + 1, "Blocking HTTP client", line));
            continue;
        }

        if enclosing_fn(&lines, idx) != Enclosing::Async {
            continue;
        }

        if let Some(what) = blocking_call(code) {
            violations.push(violation(path, idx + 1, what, line));
        }
    }
}

fn blocking_call(code: &str) -> Option<&'static str> {
    if code.contains("std::fs::") {
        Some("Blocking file I/O")
    } else if code.contains("std::net::") {
        Some("Blocking network I/O")
    } else if code.contains("std::process::Command") {
        Some("Blocking process I/O")
    } else if code.contains("image::open(") {
        Some("Blocking image read")
    } else if code.contains("std::io::stdin()") {
        Some("Blocking stdin in async")
    } else {
        None
    }
}

#[test]
fn test_blocking_io_detection_in_async() {
    let lines: Vec<String> = [
        "async fn bad_function() {",
        "    let contents = std::fs::read_to_string(\"file.txt\")?;",
        "}",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect();

    assert_eq!(enclosing_fn(&lines, 1), Enclosing::Async);
    assert_eq!(blocking_call(&lines[1]), Some("Blocking file I/O"));
}

#[test]
fn test_sync_function_is_allowed() {
    let lines: Vec<String> = [
        "pub fn load_config_from_path(path: Option<PathBuf>) -> Result<(), ConfigError> {",
        "    let toml_content = std::fs::read_to_string(config_path)?;",
        "}",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect();

    assert_eq!(enclosing_fn(&lines, 1), Enclosing::Sync);
}

#[test]
fn test_async_reads_pass() {
    assert_eq!(blocking_call("let bytes = tokio::fs::read(path).await?;"), None);
    assert_eq!(blocking_call("tokio::task::spawn_blocking(move || decode_still(&bytes))"), None);
}
