//! Handoff artifacts produced when a session terminates (spec.md §6):
//! an in-memory preview embedded in `InteractiveShellResult`, and/or an
//! on-disk snapshot file.

use std::path::PathBuf;

use chrono::Utc;

use crate::types::{HandoffPreview, HandoffWhen};

/// Build the in-memory handoff preview: last `lines` strip-ANSI lines of
/// `raw_text`, bounded by `max_chars` (keeping the tail).
pub fn build_preview(raw_text: &str, lines: usize, max_chars: usize, when: HandoffWhen) -> HandoffPreview {
    let all: Vec<&str> = raw_text.split('\n').collect();
    let take = lines.min(all.len());
    let start = all.len() - take;
    let mut out: Vec<String> = all[start..].iter().map(|s| s.to_string()).collect();
    let mut total: usize = out.iter().map(|l| l.chars().count()).sum();
    let mut truncated = start > 0;
    while total > max_chars && !out.is_empty() {
        let removed = out.remove(0);
        total -= removed.chars().count();
        truncated = true;
    }
    HandoffPreview { lines: out, truncated, when }
}

/// Write the on-disk snapshot file per spec.md §6's header format.
/// `home` is injected for testability instead of always resolving
/// `dirs::home_dir()`.
#[allow(clippy::too_many_arguments)]
pub fn write_snapshot(
    home: &std::path::Path,
    command: &str,
    cwd: &std::path::Path,
    pid: u32,
    exit_code: Option<u32>,
    signal: Option<i32>,
    when: HandoffWhen,
    requested_lines: usize,
    max_chars: usize,
    raw_text: &str,
) -> std::io::Result<PathBuf> {
    let dir = home.join(".pi").join("agent").join("cache").join("interactive-shell");
    std::fs::create_dir_all(&dir)?;

    let now = Utc::now();
    let timestamp = now.to_rfc3339();
    let sanitized = timestamp.replace([':', '.'], "-");
    let path = dir.join(format!("snapshot-{sanitized}-pid{pid}.log"));

    let all: Vec<&str> = raw_text.split('\n').collect();
    let take = requested_lines.min(all.len());
    let start = all.len() - take;
    let mut tail: Vec<String> = all[start..].iter().map(|s| s.to_string()).collect();
    let mut total: usize = tail.iter().map(|l| l.chars().count()).sum();
    while total > max_chars && !tail.is_empty() {
        let removed = tail.remove(0);
        total -= removed.chars().count();
    }

    let mut out = String::new();
    out.push_str(&format!("# interactive-shell snapshot ({timestamp})\n"));
    out.push_str(&format!("time: {timestamp}\n"));
    out.push_str(&format!("when: {}\n", when.as_str()));
    out.push_str(&format!("command: {command}\n"));
    out.push_str(&format!("cwd: {}\n", cwd.display()));
    out.push_str(&format!("pid: {pid}\n"));
    out.push_str(&format!("exitCode: {}\n", exit_code.map(|c| c.to_string()).unwrap_or_default()));
    out.push_str(&format!("signal: {}\n", signal.map(|s| s.to_string()).unwrap_or_default()));
    out.push_str(&format!(
        "lines: {} (requested {}, maxChars {})\n",
        tail.len(),
        requested_lines,
        max_chars
    ));
    out.push('\n');
    for line in &tail {
        out.push_str(line);
        out.push('\n');
    }

    std::fs::write(&path, out)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_keeps_tail_under_char_budget() {
        let text = "a\nbb\nccc\ndddd\n";
        let preview = build_preview(text, 10, 6, HandoffWhen::Exit);
        assert!(preview.truncated);
        let total: usize = preview.lines.iter().map(|l| l.len()).sum();
        assert!(total <= 6);
    }

    #[test]
    fn snapshot_file_has_documented_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_snapshot(
            dir.path(),
            "echo hi",
            std::path::Path::new("/tmp"),
            1234,
            Some(0),
            None,
            HandoffWhen::Kill,
            10,
            1000,
            "hi\n",
        )
        .unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("# interactive-shell snapshot ("));
        assert!(contents.contains("command: echo hi"));
        assert!(contents.contains("pid: 1234"));
        assert!(contents.contains("exitCode: 0"));
        assert!(contents.contains("when: kill"));
    }
}
