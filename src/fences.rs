//! Fenced-code repair.
//!
//! Generic HTML→Markdown conversion occasionally produces a bare language word on its own
//! line followed by a lone inline-code span instead of a fenced block, and list context can
//! leave fence markers indented. Both render badly downstream; this pass fixes them without
//! touching anything already inside a triple-backtick fence.

use std::ops::Range;
use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Fence-marker lines carrying leading horizontal whitespace:
/// a bare triple fence, a double fence with a language token, or a bare double fence.
static INDENTED_FENCE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]+(```|``[A-Za-z0-9+\-]*)[ \t]*$").expect("fence marker regex")
});

/// A bare language word, one or more blank lines, then a lone inline-code span.
static BARE_LANGUAGE_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*([A-Za-z0-9+\-]{1,31})[ \t]*\n(?:[ \t]*\n)+[ \t]*`([^`]+)`[ \t]*$")
        .expect("bare language regex")
});

/// Repair malformed code blocks in converted Markdown.
///
/// Fence markers lose their leading indentation, and every bare-language + inline-code
/// pattern outside existing triple fences becomes a doubled-fence block:
///
/// ````text
/// ```
/// ``js
/// console.log(1)
/// ``
/// ```
/// ````
pub fn repair_fences(markdown: &str) -> String {
    let stripped = strip_fence_indentation(markdown);
    let rewritten = map_outside_fences(&stripped, rewrite_bare_language_code);
    strip_fence_indentation(&rewritten)
}

/// Apply `f` to every span of `text` that is not inside a fenced code block, keeping
/// the fenced spans byte-for-byte and the original order.
pub(crate) fn map_outside_fences(text: &str, f: impl FnMut(&str) -> String) -> String {
    map_segments(text, f, |span| span.to_string())
}

fn map_segments(
    text: &str,
    mut outside: impl FnMut(&str) -> String,
    mut fenced: impl FnMut(&str) -> String,
) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for span in fence_spans(text) {
        out.push_str(&outside(&text[last..span.start]));
        out.push_str(&fenced(&text[span.clone()]));
        last = span.end;
    }
    out.push_str(&outside(&text[last..]));
    out
}

/// Byte ranges of fenced code blocks.
///
/// A block opens at a line starting with three or more backticks and closes at the next
/// line holding only at least as many backticks. An unclosed block runs to the end of
/// `text`. Ranges start at the opening line and end before the closing line's newline.
fn fence_spans(text: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    // (start of the opening line, fence length)
    let mut open: Option<(usize, usize)> = None;
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let start = offset;
        offset += line.len();
        let content = line.strip_suffix('\n').unwrap_or(line);
        match open {
            None => open = opening_fence(content).map(|len| (start, len)),
            Some((span_start, len)) if closing_fence(content) >= len => {
                spans.push(span_start..start + content.len());
                open = None;
            }
            Some(_) => {}
        }
    }
    if let Some((span_start, _)) = open {
        spans.push(span_start..text.len());
    }
    spans
}

/// Length of the backtick run opening a fenced block on this line.
fn opening_fence(line: &str) -> Option<usize> {
    let marker = line.trim_start_matches([' ', '\t']);
    let len = marker.bytes().take_while(|&b| b == b'`').count();
    (len >= 3 && !marker[len..].contains('`')).then_some(len)
}

/// Length of a line made only of backticks, zero for any other line.
fn closing_fence(line: &str) -> usize {
    let marker = line.trim_matches([' ', '\t']);
    if !marker.is_empty() && marker.bytes().all(|b| b == b'`') {
        marker.len()
    } else {
        0
    }
}

fn strip_fence_indentation(text: &str) -> String {
    map_segments(
        text,
        |span| INDENTED_FENCE_MARKER.replace_all(span, "$1").into_owned(),
        unindent_fence_markers,
    )
}

/// Unindent the bare opening and closing lines of a fenced span. The body is untouched.
fn unindent_fence_markers(span: &str) -> String {
    let mut lines: Vec<&str> = span.split('\n').collect();
    let fence_len = opening_fence(lines[0]).unwrap_or(3);
    if closing_fence(lines[0]) > 0 {
        lines[0] = lines[0].trim();
    }
    let last = lines.len() - 1;
    if last > 0 && closing_fence(lines[last]) >= fence_len {
        lines[last] = lines[last].trim();
    }
    lines.join("\n")
}

fn rewrite_bare_language_code(span: &str) -> String {
    BARE_LANGUAGE_CODE
        .replace_all(span, |caps: &Captures| {
            let language = &caps[1];
            let body = trim_blank_lines(&caps[2]);
            format!("```\n``{language}\n{body}\n``\n```")
        })
        .into_owned()
}

/// Drop whitespace-only lines from both ends of `body`.
fn trim_blank_lines(body: &str) -> String {
    let lines: Vec<&str> = body.split('\n').collect();
    let start = lines
        .iter()
        .position(|l| !l.trim().is_empty())
        .unwrap_or(lines.len());
    let end = lines
        .iter()
        .rposition(|l| !l.trim().is_empty())
        .map_or(start, |i| i + 1);
    lines[start..end.max(start)].join("\n")
}
