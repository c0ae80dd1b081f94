//! Per-call compression of raw tool output before it re-enters the
//! transcript.
//!
//! A narrower cousin of the segment compressor: pattern compression first,
//! then a type-aware truncation that respects the output's shape instead of
//! cutting mid-structure. Idempotent once the output is at or under the cap.

use crate::compressor::{compress_patterns, is_directory_scan, is_file_read};

/// Room reserved for the truncation notice when walking lines.
const NOTICE_RESERVE: usize = 64;

/// Compress a single tool's raw output to at most `cap_chars` characters.
pub fn compress_tool_result(content: &str, tool_name: Option<&str>, cap_chars: usize) -> String {
    let total = content.chars().count();
    if total <= cap_chars {
        return content.to_string();
    }

    if let Some(summary) = compress_patterns(content) {
        if summary.chars().count() <= cap_chars {
            return summary;
        }
    }

    if directory_shaped(content, tool_name) {
        return truncate_by_lines(content, total, cap_chars);
    }

    if file_read_shaped(content, tool_name) {
        return truncate_head_tail(content, total, cap_chars);
    }

    truncate_head_tail(content, total, cap_chars)
}

fn directory_shaped(content: &str, tool_name: Option<&str>) -> bool {
    if is_directory_scan(content) {
        return true;
    }
    tool_name.is_some_and(|name| {
        let name = name.to_lowercase();
        name.contains("scan") || name.contains("directory") || name.contains("list")
    })
}

fn file_read_shaped(content: &str, tool_name: Option<&str>) -> bool {
    if is_file_read(content) {
        return true;
    }
    tool_name.is_some_and(|name| {
        let name = name.to_lowercase();
        name.contains("read") || name.contains("file")
    })
}

/// Plain prefix cut for caps too small to fit a truncation notice.
fn head_cut(content: &str, cap_chars: usize) -> String {
    content.chars().take(cap_chars).collect()
}

/// Keep whole lines from the start until the budget is exhausted, so the
/// tree/summary prefix survives intact.
fn truncate_by_lines(content: &str, total: usize, cap_chars: usize) -> String {
    if cap_chars <= NOTICE_RESERVE {
        return head_cut(content, cap_chars);
    }
    let budget = cap_chars - NOTICE_RESERVE;
    let mut kept = String::new();
    let mut kept_chars = 0usize;

    for line in content.lines() {
        let line_chars = line.chars().count() + 1;
        if kept_chars + line_chars > budget {
            break;
        }
        kept.push_str(line);
        kept.push('\n');
        kept_chars += line_chars;
    }

    kept.push_str(&format!(
        "[...truncated: {total} total chars, showing first {kept_chars} chars]"
    ));
    kept
}

/// Generic split: first 70% of the cap as head, last 20% as tail, with the
/// truncation notice in between. Head and tail are both charged against the
/// cap alongside the notice, so the output never exceeds it. Never splits a
/// code point.
fn truncate_head_tail(content: &str, total: usize, cap_chars: usize) -> String {
    let notice = format!("\n[...truncated: {total} total chars...]\n");
    let notice_len = notice.chars().count();
    if cap_chars <= notice_len {
        return head_cut(content, cap_chars);
    }
    let head = (cap_chars * 7 / 10).min(cap_chars - notice_len);
    let tail = (cap_chars * 2 / 10).min(cap_chars - notice_len - head);

    let chars: Vec<char> = content.chars().collect();
    let mut out = String::with_capacity(head + tail + notice.len());
    out.extend(chars[..head.min(chars.len())].iter());
    out.push_str(&notice);
    if tail > 0 && chars.len() > tail {
        out.extend(chars[chars.len() - tail..].iter());
    }
    out
}
