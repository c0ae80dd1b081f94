//! Lossy per-segment compression.
//!
//! Two stages: structured pattern compression for known tool-output shapes
//! (directory scan, code search, command execution, git operation, file
//! read), then a head/tail truncation fallback for anything still oversized.
//! Compression always produces a new segment; `None` means drop entirely.

use once_cell::sync::Lazy;
use regex::Regex;

use chat_core::{ContentSegment, ToolResult};

/// Text segments longer than this fall back to head/tail truncation.
pub const TEXT_COMPRESS_THRESHOLD: usize = 2000;
/// Tool result content longer than this is compressed.
pub const TOOL_RESULT_THRESHOLD: usize = 500;
/// Code segments longer than this are truncated.
pub const CODE_COMPRESS_THRESHOLD: usize = 2000;
/// Characters kept from the start under head/tail truncation.
pub const HEAD_CHARS: usize = 300;
/// Characters kept from the end under head/tail truncation.
pub const TAIL_CHARS: usize = 150;

static DIR_SCAN_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^#{1,3}\s*Directory Scan:\s*(\S+)").unwrap());
static FILE_COUNT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d[\d,]*)\s+files\b").unwrap());
static BYTE_SIZE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d+(?:\.\d+)?\s?[KMGT]?B)\b").unwrap());
static FILE_READ_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^(?:#{1,3}\s*File:|// File:)\s*(\S+)").unwrap());
static SEARCH_MATCHES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"Found (\d+) (?:matches|results|occurrences) for ['"]([^'"\n]+)['"]"#).unwrap()
});
static EXIT_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?mi)^exit code[:=]?\s*(-?\d+)").unwrap());
static COMMAND_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^(?:\$|Command:)\s+(.+)$").unwrap());
static GIT_BRANCH: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^On branch (\S+)").unwrap());
static GIT_CHANGED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+) files? changed").unwrap());

/// Whether text looks like a directory-scan report.
pub(crate) fn is_directory_scan(text: &str) -> bool {
    DIR_SCAN_HEADER.is_match(text)
}

/// Whether text begins with a recognizable file-read header.
pub(crate) fn is_file_read(text: &str) -> bool {
    FILE_READ_HEADER
        .find(text)
        .is_some_and(|m| m.start() == 0)
}

/// Attempt structured pattern compression.
///
/// Returns a one-line bracketed summary when the text matches a known
/// tool-output shape, `None` otherwise.
pub fn compress_patterns(text: &str) -> Option<String> {
    if let Some(caps) = DIR_SCAN_HEADER.captures(text) {
        let mut summary = format!("[Scanned directory: {}", &caps[1]);
        if let Some(files) = FILE_COUNT.captures(text) {
            summary.push_str(&format!(", {} files", &files[1]));
        }
        if let Some(size) = BYTE_SIZE.captures(text) {
            summary.push_str(&format!(", {}", &size[1]));
        }
        summary.push(']');
        return Some(summary);
    }

    if let Some(caps) = FILE_READ_HEADER.captures(text) {
        let lines = text.lines().count().saturating_sub(1);
        return Some(format!("[Read file: {}, {} lines]", &caps[1], lines));
    }

    if let Some(caps) = SEARCH_MATCHES.captures(text) {
        return Some(format!("[Code search: \"{}\", {} matches]", &caps[2], &caps[1]));
    }

    if let Some(caps) = GIT_BRANCH.captures(text) {
        let mut summary = format!("[Git operation: branch {}", &caps[1]);
        if let Some(changed) = GIT_CHANGED.captures(text) {
            summary.push_str(&format!(", {} files changed", &changed[1]));
        }
        summary.push(']');
        return Some(summary);
    }

    if let Some(caps) = EXIT_CODE.captures(text) {
        let summary = match COMMAND_LINE.captures(text) {
            Some(cmd) => format!(
                "[Command executed: {}, exit code {}]",
                cmd[1].trim(),
                &caps[1]
            ),
            None => format!("[Command executed, exit code {}]", &caps[1]),
        };
        return Some(summary);
    }

    None
}

/// Marker style for head/tail truncation.
#[derive(Debug, Clone, Copy)]
enum MarkerStyle {
    Plain,
    Comment,
}

/// Keep the first `head` and last `tail` characters with an elision marker
/// in between. Operates on characters, never splits a code point.
fn head_tail(text: &str, head: usize, tail: usize, style: MarkerStyle) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= head + tail {
        return text.to_string();
    }
    let omitted = chars.len() - head - tail;
    let marker = match style {
        MarkerStyle::Plain => format!("\n[...compressed: {omitted} chars...]\n"),
        MarkerStyle::Comment => format!("\n// [...compressed: {omitted} chars...]\n"),
    };
    let mut out = String::with_capacity(head + tail + marker.len());
    out.extend(chars[..head].iter());
    out.push_str(&marker);
    out.extend(chars[chars.len() - tail..].iter());
    out
}

/// Compress one content segment. `None` drops the segment entirely.
///
/// Only called for compressible (non-protected) messages; the caller must
/// guarantee a message is never left empty afterwards.
pub fn compress_segment(segment: &ContentSegment) -> Option<ContentSegment> {
    match segment {
        // Thinking is model-internal and never worth its tokens in history.
        ContentSegment::Thinking { .. } => None,

        ContentSegment::Text { text } => {
            if let Some(summary) = compress_patterns(text) {
                Some(ContentSegment::text(summary))
            } else if text.chars().count() > TEXT_COMPRESS_THRESHOLD {
                Some(ContentSegment::text(head_tail(
                    text,
                    HEAD_CHARS,
                    TAIL_CHARS,
                    MarkerStyle::Plain,
                )))
            } else {
                Some(segment.clone())
            }
        }

        ContentSegment::ToolResult(result) => {
            if result.content.chars().count() <= TOOL_RESULT_THRESHOLD {
                return Some(segment.clone());
            }
            let content = compress_patterns(&result.content).unwrap_or_else(|| {
                head_tail(&result.content, HEAD_CHARS, TAIL_CHARS, MarkerStyle::Plain)
            });
            Some(ContentSegment::ToolResult(ToolResult {
                tool_invocation_id: result.tool_invocation_id.clone(),
                content,
                is_error: result.is_error,
            }))
        }

        ContentSegment::Code { language, code } => {
            if code.chars().count() > CODE_COMPRESS_THRESHOLD {
                Some(ContentSegment::code(
                    language.clone(),
                    head_tail(code, HEAD_CHARS, TAIL_CHARS, MarkerStyle::Comment),
                ))
            } else {
                Some(segment.clone())
            }
        }

        // Already small; keep verbatim.
        ContentSegment::ToolInvocation(_)
        | ContentSegment::Image { .. }
        | ContentSegment::File { .. }
        | ContentSegment::Other { .. } => Some(segment.clone()),
    }
}
