//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that enforce architectural principles:
//! - No sleep() calls in production code outside retry backoff
//! - No blocking I/O inside async functions
//!
//! The helpers here locate the production sources of the workspace and strip
//! the parts of a file the rules do not apply to (comments, test modules).

use std::fs;
use std::path::{Path, PathBuf};

/// Production source directories, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["darkroom/core/src", "darkroom/cli/src"];

/// Workspace root, two levels above this package
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
}

/// All `.rs` files under `dir` (relative to the workspace root)
#[must_use]
pub fn rust_sources(dir: &str) -> Vec<PathBuf> {
    let root = workspace_root().join(dir);
    if !root.exists() {
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// Lines of a source file up to its `#[cfg(test)]` module
///
/// Test modules sit at the end of every file in this workspace.
#[must_use]
pub fn production_lines(content: &str) -> Vec<&str> {
    content
        .lines()
        .take_while(|line| !line.trim_start().starts_with("#[cfg(test)]"))
        .collect()
}

/// Read a file and return its production lines, owned
#[must_use]
pub fn read_production_lines(path: &Path) -> Vec<String> {
    match fs::read_to_string(path) {
        Ok(content) => production_lines(&content)
            .into_iter()
            .map(str::to_string)
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// The part of a line before any `//` comment
#[must_use]
pub fn code_part(line: &str) -> &str {
    line.split("//").next().unwrap_or(line)
}

/// Kind of function a line sits in
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Enclosing {
    /// A plain `fn`
    Sync,
    /// An `async fn`
    Async,
    /// Module level, or no function found before an item boundary
    None,
}

fn fn_declaration(line: &str) -> Option<Enclosing> {
    let trimmed = line.trim_start();
    let stripped = trimmed
        .strip_prefix("pub(crate) ")
        .or_else(|| trimmed.strip_prefix("pub "))
        .unwrap_or(trimmed);

    if stripped.starts_with("async fn ") {
        Some(Enclosing::Async)
    } else if stripped.starts_with("fn ") {
        Some(Enclosing::Sync)
    } else {
        None
    }
}

/// Find the function enclosing `lines[idx]` by scanning backwards
pub fn enclosing_fn<S: AsRef<str>>(lines: &[S], idx: usize) -> Enclosing {
    for i in (0..=idx.min(lines.len().saturating_sub(1))).rev() {
        let line = lines[i].as_ref();
        if let Some(kind) = fn_declaration(line) {
            return kind;
        }
        let trimmed = line.trim_start();
        if trimmed.starts_with("mod ") || trimmed.starts_with("impl ") || trimmed.starts_with("impl<") {
            return Enclosing::None;
        }
    }
    Enclosing::None
}

/// Whether any line within `before`/`after` lines of `idx` contains all `needles`
pub fn context_contains<S: AsRef<str>>(
    lines: &[S],
    idx: usize,
    before: usize,
    after: usize,
    needles: &[&str],
) -> bool {
    let end = (idx + after + 1).min(lines.len());
    let window: Vec<String> = lines[idx.saturating_sub(before)..end]
        .iter()
        .map(|l| l.as_ref().to_lowercase())
        .collect();
    needles
        .iter()
        .all(|needle| window.iter().any(|line| line.contains(needle)))
}

/// Format a violation the way the test reports print them
#[must_use]
pub fn violation(path: &Path, line_number: usize, what: &str, line: &str) -> String {
    let shown = path
        .strip_prefix(workspace_root())
        .unwrap_or(path)
        .display()
        .to_string();
    format!("{shown}:{line_number} - {what}: {}", line.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_lines_stop_at_test_module() {
        let src = "fn a() {}\n\n#[cfg(test)]\nmod tests {\n    fn b() {}\n}\n";
        assert_eq!(production_lines(src), vec!["fn a() {}", ""]);
    }

    #[test]
    fn test_enclosing_fn_kinds() {
        let lines = [
            "impl Foo {",
            "    pub async fn run(&self) {",
            "        work().await;",
            "    }",
            "    fn helper() {",
            "        let x = 1;",
            "    }",
            "}",
        ];
        assert_eq!(enclosing_fn(&lines, 2), Enclosing::Async);
        assert_eq!(enclosing_fn(&lines, 5), Enclosing::Sync);
        assert_eq!(enclosing_fn(&lines, 0), Enclosing::None);
    }

    #[test]
    fn test_context_contains() {
        let lines = ["let backoff = step * attempt;", "noop();", "sleep(backoff).await;"];
        assert!(context_contains(&lines, 2, 5, 0, &["backoff", "attempt"]));
        assert!(!context_contains(&lines, 2, 0, 0, &["attempt"]));
    }

    #[test]
    fn test_sources_found() {
        assert!(!rust_sources("darkroom/core/src").is_empty());
    }
}
