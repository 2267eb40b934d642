// SPDX-License-Identifier: MIT
//! Unified diff parser.
//!
//! Turns `git diff` text into a [`ParsedDiff`]: one [`FileChange`] per file
//! section, with every changed line classified as an add, delete, or modify.
//! A `-` line immediately followed by `+` lines at the same hunk position is
//! paired index-wise into modifies; leftovers stay adds/deletes.
//!
//! Parsing is forgiving about individual hunks — a malformed hunk is skipped
//! and the rest of the file still parses. Only a payload with no recognizable
//! diff structure at all is an error.

use std::collections::VecDeque;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{FileChange, LineChange, ParsedDiff};

#[derive(Debug, Clone, thiserror::Error)]
pub enum ParseError {
    #[error("payload is not a recognizable unified diff")]
    Unrecognized,
}

static HUNK_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").expect("regex: hunk header")
});

static GIT_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^diff --git a/(.+?) b/(.+)$").expect("regex: diff header"));

/// Parse unified diff text.
///
/// Empty input yields an empty [`ParsedDiff`]; non-empty input without any
/// diff structure is [`ParseError::Unrecognized`].
pub fn parse(diff_text: &str) -> Result<ParsedDiff, ParseError> {
    if diff_text.trim().is_empty() {
        return Ok(ParsedDiff::default());
    }

    let lines: Vec<&str> = diff_text.lines().collect();
    let mut files = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        if is_section_start(&lines, i) {
            let (file, next) = parse_file_section(&lines, i);
            if let Some(f) = file {
                files.push(f);
            }
            // A section always consumes at least one line.
            i = next.max(i + 1);
        } else {
            i += 1;
        }
    }

    if files.is_empty() {
        return Err(ParseError::Unrecognized);
    }
    Ok(ParsedDiff { files })
}

fn is_section_start(lines: &[&str], i: usize) -> bool {
    lines[i].starts_with("diff --git ")
        || (lines[i].starts_with("--- ")
            && lines.get(i + 1).is_some_and(|l| l.starts_with("+++ ")))
}

/// Parse one file section starting at `start`. Returns the parsed file (if
/// any) and the index of the first line after the section.
fn parse_file_section(lines: &[&str], start: usize) -> (Option<FileChange>, usize) {
    let mut i = start;
    let mut header_path: Option<String> = None;
    let mut old_path: Option<String> = None;
    let mut new_path: Option<String> = None;
    let mut rename_to: Option<String> = None;
    let mut binary_marker = false;

    if let Some(caps) = GIT_HEADER.captures(lines[i]) {
        header_path = Some(caps[2].to_string());
        i += 1;
    }

    // Extended headers and the ---/+++ pair.
    while i < lines.len() {
        let line = lines[i];
        if line.starts_with("diff --git ") {
            break;
        } else if line.starts_with("@@ ") {
            break;
        } else if let Some(rest) = line.strip_prefix("--- ") {
            old_path = strip_diff_prefix(rest);
            i += 1;
            if let Some(next) = lines.get(i) {
                if let Some(rest) = next.strip_prefix("+++ ") {
                    new_path = strip_diff_prefix(rest);
                    i += 1;
                }
            }
            // Hunks follow immediately after the +++ line.
            break;
        } else if line.starts_with("Binary files ") || line.starts_with("GIT binary patch") {
            binary_marker = true;
            i += 1;
        } else if let Some(rest) = line.strip_prefix("rename to ") {
            rename_to = Some(rest.to_string());
            i += 1;
        } else {
            // index lines, mode changes, similarity scores, rename from
            i += 1;
        }
    }

    // Post-change path wins; a pure deletion falls back to the pre-change
    // path and carries deletion events only.
    let file_path = new_path
        .or(rename_to)
        .or(header_path)
        .or(old_path)
        .unwrap_or_default();
    if file_path.is_empty() {
        return (None, i);
    }

    let is_binary = binary_marker || has_binary_extension(&file_path);
    let mut file = FileChange {
        language: detect_language(&file_path),
        file_path,
        is_binary,
        additions: Vec::new(),
        deletions: Vec::new(),
        modifications: Vec::new(),
    };

    // Hunks, until the next file section. Binary sections have none.
    while i < lines.len() && !is_section_start(lines, i) {
        if HUNK_HEADER.is_match(lines[i]) {
            i = parse_hunk(lines, i, &mut file);
        } else {
            i += 1;
        }
    }

    if file.is_binary {
        // Content of binary files is never decoded.
        file.additions.clear();
        file.deletions.clear();
        file.modifications.clear();
    }

    (Some(file), i)
}

/// Parse one hunk starting at the `@@` header line. Returns the index of the
/// first line after the hunk. On a malformed body the hunk's events are
/// discarded and scanning resumes at the offending line.
fn parse_hunk(lines: &[&str], header_idx: usize, file: &mut FileChange) -> usize {
    let caps = match HUNK_HEADER.captures(lines[header_idx]) {
        Some(c) => c,
        None => return header_idx + 1,
    };
    let mut old_ln: u32 = caps[1].parse().unwrap_or(1);
    let mut new_ln: u32 = caps[3].parse().unwrap_or(1);
    let mut old_remaining: i64 = caps
        .get(2)
        .map_or(1, |m| m.as_str().parse().unwrap_or(1));
    let mut new_remaining: i64 = caps
        .get(4)
        .map_or(1, |m| m.as_str().parse().unwrap_or(1));

    let mut additions = Vec::new();
    let mut deletions = Vec::new();
    let mut modifications = Vec::new();
    // Deletions waiting for a pairing `+` at the same hunk position.
    let mut pending: VecDeque<(u32, String)> = VecDeque::new();

    let flush =
        |pending: &mut VecDeque<(u32, String)>, deletions: &mut Vec<LineChange>| {
            for (ln, content) in pending.drain(..) {
                deletions.push(LineChange::delete(ln, content));
            }
        };

    let mut i = header_idx + 1;
    while i < lines.len() && (old_remaining > 0 || new_remaining > 0) {
        let line = lines[i];
        if let Some(content) = line.strip_prefix('+') {
            if let Some((del_ln, del_content)) = pending.pop_front() {
                modifications.push(LineChange::modify(new_ln, content, del_ln, del_content));
            } else {
                additions.push(LineChange::add(new_ln, content));
            }
            new_ln += 1;
            new_remaining -= 1;
        } else if let Some(content) = line.strip_prefix('-') {
            pending.push_back((old_ln, content.to_string()));
            old_ln += 1;
            old_remaining -= 1;
        } else if line.starts_with('\\') {
            // "\ No newline at end of file" — not part of either side.
        } else if line.starts_with(' ') || line.is_empty() {
            flush(&mut pending, &mut deletions);
            old_ln += 1;
            new_ln += 1;
            old_remaining -= 1;
            new_remaining -= 1;
        } else {
            // Malformed hunk body: drop this hunk's events, keep the rest
            // of the file.
            return i;
        }
        i += 1;
    }
    flush(&mut pending, &mut deletions);

    file.additions.extend(additions);
    file.deletions.extend(deletions);
    file.modifications.extend(modifications);
    i
}

fn strip_diff_prefix(path: &str) -> Option<String> {
    let path = path.trim();
    if path == "/dev/null" {
        return None;
    }
    let stripped = path
        .strip_prefix("a/")
        .or_else(|| path.strip_prefix("b/"))
        .unwrap_or(path);
    Some(stripped.to_string())
}

// ─── Language detection ───────────────────────────────────────────────────────

/// Map a file path to a language tag by extension. Unrecognized extensions
/// are `"unknown"`.
pub fn detect_language(file_path: &str) -> String {
    let lower = file_path.to_lowercase();
    let name = lower.rsplit('/').next().unwrap_or(&lower);

    match name {
        "dockerfile" => return "dockerfile".to_string(),
        "makefile" => return "makefile".to_string(),
        "rakefile" | "gemfile" => return "ruby".to_string(),
        _ => {}
    }

    let ext = match name.rsplit_once('.') {
        Some((_, e)) => e,
        None => return "unknown".to_string(),
    };

    let lang = match ext {
        "py" | "pyx" | "pyi" => "python",
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "ts" | "tsx" => "typescript",
        "java" => "java",
        "c" | "h" => "c",
        "cpp" | "cxx" | "cc" | "hpp" | "hxx" => "cpp",
        "cs" => "csharp",
        "go" => "go",
        "rs" => "rust",
        "rb" | "rbw" => "ruby",
        "php" | "phtml" => "php",
        "sh" | "bash" | "zsh" | "fish" => "shell",
        "html" | "htm" => "html",
        "css" => "css",
        "scss" | "sass" => "scss",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        "xml" => "xml",
        "ini" | "cfg" => "ini",
        "md" | "markdown" => "markdown",
        "txt" => "text",
        "sql" => "sql",
        "swift" => "swift",
        "kt" => "kotlin",
        "scala" => "scala",
        "dart" => "dart",
        "r" => "r",
        _ => "unknown",
    };
    lang.to_string()
}

/// Extensions that signal binary content even without a binary marker line.
fn has_binary_extension(file_path: &str) -> bool {
    const BINARY_EXTENSIONS: &[&str] = &[
        "jpg", "jpeg", "png", "gif", "bmp", "ico", "webp", "pdf", "zip", "tar", "gz", "bz2",
        "7z", "rar", "exe", "dll", "so", "dylib", "bin", "mp3", "mp4", "avi", "mov", "wav",
        "ttf", "otf", "woff", "woff2", "pyc", "class", "jar", "war",
    ];
    file_path
        .to_lowercase()
        .rsplit_once('.')
        .is_some_and(|(_, ext)| BINARY_EXTENSIONS.contains(&ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_empty_diff() {
        assert!(parse("").unwrap().files.is_empty());
        assert!(parse("   \n\n").unwrap().files.is_empty());
    }

    #[test]
    fn garbage_is_unrecognized() {
        assert!(matches!(
            parse("hello, this is not a diff at all"),
            Err(ParseError::Unrecognized)
        ));
    }

    #[test]
    fn detects_language_by_extension() {
        assert_eq!(detect_language("src/app.py"), "python");
        assert_eq!(detect_language("lib/Main.java"), "java");
        assert_eq!(detect_language("web/index.TS"), "typescript");
        assert_eq!(detect_language("Dockerfile"), "dockerfile");
        assert_eq!(detect_language("weird.xyz"), "unknown");
        assert_eq!(detect_language("no_extension"), "unknown");
    }

    #[test]
    fn binary_extension_heuristic() {
        assert!(has_binary_extension("assets/logo.PNG"));
        assert!(!has_binary_extension("src/logo_gen.py"));
    }
}
