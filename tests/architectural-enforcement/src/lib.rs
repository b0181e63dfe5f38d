//! Architectural Enforcement Integration Tests
//!
//! Source scans that keep production code free of blocking calls on the
//! async runtime:
//! - No `sleep()` except the controller's reload settling pause
//! - No blocking file, network or HTTP I/O inside `async` code
//!
//! The scanner is line-based. It strips `//` comments, stops at the first
//! `#[cfg(test)]` of each file, skips the test-double modules, and tracks
//! brace depth to know whether a line sits inside an `async fn` or `async`
//! block.

use std::fs;
use std::path::{Path, PathBuf};

/// Production source roots, relative to the workspace root
pub const SOURCE_DIRS: [&str; 2] = ["steelclock/core/src", "steelclock/daemon/src"];

/// Files that exist only to support tests
pub const TEST_SUPPORT_FILES: [&str; 1] = ["test_utils.rs"];

/// One line of production code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeLine {
    /// 1-based line number
    pub number: usize,
    /// Line with any `//` comment removed
    pub code: String,
    /// Inside an `async fn` body or `async` block
    pub in_async: bool,
}

/// Workspace root (two levels above this package)
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

/// Every production `.rs` file under [`SOURCE_DIRS`]
#[must_use]
pub fn production_sources() -> Vec<PathBuf> {
    let root = workspace_root();
    let mut files = Vec::new();
    for dir in SOURCE_DIRS {
        for entry in walkdir::WalkDir::new(root.join(dir))
            .into_iter()
            .filter_map(Result::ok)
        {
            let path = entry.path();
            let is_rust = path.extension().and_then(|s| s.to_str()) == Some("rs");
            let is_support = path
                .file_name()
                .and_then(|s| s.to_str())
                .is_some_and(|name| TEST_SUPPORT_FILES.contains(&name));
            if is_rust && !is_support {
                files.push(path.to_path_buf());
            }
        }
    }
    files.sort();
    files
}

/// Strip a trailing `//` comment, ignoring `//` inside string literals
fn strip_comment(line: &str) -> &str {
    let mut in_string = false;
    let mut escaped = false;
    let bytes = line.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            _ if escaped => escaped = false,
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'/' if !in_string && bytes.get(i + 1) == Some(&b'/') => return &line[..i],
            _ => {}
        }
    }
    line
}

/// Opening and closing braces outside string literals
fn braces(code: &str) -> impl Iterator<Item = char> + '_ {
    let mut in_string = false;
    let mut escaped = false;
    code.chars().filter(move |&c| {
        if escaped {
            escaped = false;
            return false;
        }
        match c {
            '\\' if in_string => {
                escaped = true;
                false
            }
            '"' => {
                in_string = !in_string;
                false
            }
            '{' | '}' => !in_string,
            _ => false,
        }
    })
}

fn opens_function(code: &str) -> Option<bool> {
    let trimmed = code.trim_start();
    let is_fn = trimmed.starts_with("fn ") || trimmed.contains(" fn ");
    let is_async_block = trimmed.contains("async move {") || trimmed.contains("async {");
    if is_fn {
        Some(trimmed.contains("async fn "))
    } else if is_async_block {
        Some(true)
    } else {
        None
    }
}

/// Production lines of `source`, annotated with their async context
#[must_use]
pub fn analyze(source: &str) -> Vec<CodeLine> {
    let mut out = Vec::new();
    // (is_async, depth of the body)
    let mut scopes: Vec<(bool, usize)> = Vec::new();
    let mut pending: Option<bool> = None;
    let mut depth = 0_usize;

    for (idx, raw) in source.lines().enumerate() {
        if raw.trim_start().starts_with("#[cfg(test)]") {
            break;
        }
        let code = strip_comment(raw);
        if let Some(is_async) = opens_function(code) {
            pending = Some(is_async || pending.unwrap_or(false));
        }

        let in_async = scopes.iter().any(|(is_async, _)| *is_async) || pending == Some(true);
        out.push(CodeLine {
            number: idx + 1,
            code: code.to_string(),
            in_async,
        });

        for brace in braces(code) {
            if brace == '{' {
                depth += 1;
                if let Some(is_async) = pending.take() {
                    scopes.push((is_async, depth));
                }
            } else {
                if scopes.last().is_some_and(|(_, d)| *d == depth) {
                    scopes.pop();
                }
                depth = depth.saturating_sub(1);
            }
        }
        // Declaration without a body (trait method)
        if code.trim_end().ends_with(';') && pending.is_some() && !code.contains('{') {
            pending = None;
        }
    }
    out
}

/// Apply `rule` to every production line; returns `path:line - message: code`
pub fn scan<F>(rule: F) -> Vec<String>
where
    F: Fn(&CodeLine) -> Option<&'static str>,
{
    let root = workspace_root();
    let mut violations = Vec::new();
    for path in production_sources() {
        let Ok(source) = fs::read_to_string(&path) else {
            continue;
        };
        let shown = path.strip_prefix(&root).unwrap_or(&path).display().to_string();
        for line in analyze(&source) {
            if let Some(message) = rule(&line) {
                violations.push(format!(
                    "{shown}:{} - {message}: {}",
                    line.number,
                    line.code.trim()
                ));
            }
        }
    }
    violations
}

/// Sleep rule: production code is timer-driven
///
/// The controller's reload settling pause is allowed when the line names the
/// settle interval.
#[must_use]
pub fn sleep_violation(line: &CodeLine) -> Option<&'static str> {
    let code = &line.code;
    if code.contains("std::thread::sleep") || code.contains("thread::sleep(") {
        return Some("Blocking thread sleep");
    }
    let sleeps = code.contains("::sleep(") || code.contains(".sleep(");
    if sleeps && !code.contains("settle") {
        return Some("sleep() outside the reload settling pause");
    }
    None
}

/// Blocking I/O rule: no std file, network or stdin I/O inside async code
#[must_use]
pub fn blocking_io_violation(line: &CodeLine) -> Option<&'static str> {
    if line.code.contains("reqwest::blocking") {
        return Some("Blocking HTTP client");
    }
    if !line.in_async {
        return None;
    }
    // `tokio::fs::read_to_string(` would otherwise match the bare `fs::` forms
    let code = line.code.replace("tokio::fs::", "");
    let std_fs = code.contains("std::fs::")
        || code.contains("fs::read_to_string(")
        || code.contains("fs::write(");
    if std_fs {
        return Some("Blocking file I/O in async code");
    }
    if code.contains("std::net::") {
        return Some("Blocking network I/O in async code");
    }
    if code.contains("std::io::stdin()") {
        return Some("Blocking stdin in async code");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_async_context_tracking() {
        let source = r#"
fn sync_one() {
    let a = 1;
}

async fn run() {
    let b = "{ not a brace";
    if true {
        work().await;
    }
}

fn spawner() {
    tokio::spawn(async move {
        inner().await;
    });
    after();
}

#[cfg(test)]
mod tests {
    async fn ignored() {}
}
"#;
        let lines = analyze(source);
        let find = |needle: &str| lines.iter().find(|l| l.code.contains(needle)).unwrap();

        assert!(!find("let a").in_async);
        assert!(find("let b").in_async);
        assert!(find("work()").in_async);
        assert!(find("inner()").in_async);
        assert!(!find("after()").in_async);
        assert!(lines.iter().all(|l| !l.code.contains("ignored")));
    }

    #[test]
    fn test_trait_declarations_do_not_leak() {
        let source = "trait T {\n    async fn a(&self);\n}\nfn b() {\n    x();\n}\n";
        let lines = analyze(source);
        assert!(!lines.iter().find(|l| l.code.contains("x()")).unwrap().in_async);
    }

    #[test]
    fn test_comment_stripping() {
        assert_eq!(strip_comment("let a = 1; // sleep(1)"), "let a = 1; ");
        assert_eq!(
            strip_comment(r#"let u = "http://x"; // c"#),
            r#"let u = "http://x"; "#
        );
    }

    #[test]
    fn test_sources_found() {
        let sources = production_sources();
        assert!(sources.iter().any(|p| p.ends_with("controller.rs")));
        assert!(sources.iter().all(|p| !p.ends_with("test_utils.rs")));
    }

    fn line(code: &str, in_async: bool) -> CodeLine {
        CodeLine {
            number: 1,
            code: code.to_string(),
            in_async,
        }
    }

    #[test]
    fn test_tokio_fs_is_allowed_in_async_code() {
        let read = line("    let raw = tokio::fs::read_to_string(path).await?;", true);
        let write = line("    tokio::fs::write(&path, bytes).await?;", true);
        assert_eq!(blocking_io_violation(&read), None);
        assert_eq!(blocking_io_violation(&write), None);
    }

    #[test]
    fn test_std_fs_is_flagged_in_async_code() {
        let qualified = line("    let raw = std::fs::read_to_string(path)?;", true);
        let imported = line("    let raw = fs::read_to_string(path)?;", true);
        assert!(blocking_io_violation(&qualified).is_some());
        assert!(blocking_io_violation(&imported).is_some());
        assert_eq!(blocking_io_violation(&line("    fs::write(p, b)?;", false)), None);
    }

    #[test]
    fn test_blocking_http_is_flagged_everywhere() {
        let sync = line("use reqwest::blocking::Client;", false);
        assert_eq!(blocking_io_violation(&sync), Some("Blocking HTTP client"));
    }

    #[test]
    fn test_sleep_rule() {
        let settle = line("        tokio::time::sleep(self.settle_interval).await;", true);
        let stray = line("        tokio::time::sleep(Duration::from_secs(1)).await;", true);
        let thread = line("    std::thread::sleep(d);", false);
        assert_eq!(sleep_violation(&settle), None);
        assert!(sleep_violation(&stray).is_some());
        assert_eq!(sleep_violation(&thread), Some("Blocking thread sleep"));
    }
}
