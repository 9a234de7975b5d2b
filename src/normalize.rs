//! Whitespace tidying and the cosmetic suggestion/heading pass.

use std::sync::LazyLock;

use regex::Regex;

use crate::fences::map_outside_fences;

static NEWLINE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("newline run regex"));

static TRAILING_WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)[ \t]+$").expect("trailing whitespace regex"));

/// A line of three or more hyphens with a blank line on each side.
static DECORATIVE_RULE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\n[ \t]*\n[ \t]*-{3,}[ \t]*\n[ \t]*\n").expect("decorative rule regex")
});

/// A line that is just "Suggestions", optionally bolded, headed, or followed by a colon.
static SUGGESTIONS_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?mi)^[ \t]*(?:#{1,6}[ \t]+)?(?:\*\*|__)?[ \t]*suggestions[ \t]*:?[ \t]*(?:\*\*|__)?[ \t]*:?[ \t]*$",
    )
    .expect("suggestions regex")
});

static GLYPH_BULLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^([ \t]*)[•◦→][ \t]*").expect("glyph bullet regex"));

/// CRLF and lone CR become LF.
pub fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Collapse runs of three or more newlines to exactly two.
pub fn collapse_blank_lines(text: &str) -> String {
    NEWLINE_RUN.replace_all(text, "\n\n").into_owned()
}

pub fn strip_trailing_whitespace(text: &str) -> String {
    TRAILING_WHITESPACE.replace_all(text, "").into_owned()
}

/// Final document tidy: no runs of more than one blank line and a single trailing newline.
///
/// Idempotent.
pub fn tidy_document(text: &str) -> String {
    let collapsed = collapse_blank_lines(text);
    let mut out = collapsed.trim_end().to_string();
    out.push('\n');
    out
}

/// Best-effort cosmetic cleanup of a rendered response body.
///
/// - decorative `---` separators between blank lines collapse to a single blank line
/// - a lone "Suggestions" line becomes `#### Suggestions`
/// - `•`, `◦` and `→` bullets become `- `
///
/// Content inside triple-backtick fences is left untouched.
pub fn normalize_suggestions(body: &str) -> String {
    let normalized = map_outside_fences(body, |span| {
        let mut span = span.to_string();
        while DECORATIVE_RULE.is_match(&span) {
            span = DECORATIVE_RULE.replace_all(&span, "\n\n").into_owned();
        }
        let span = SUGGESTIONS_LINE.replace_all(&span, "\n#### Suggestions");
        GLYPH_BULLET.replace_all(&span, "${1}- ").into_owned()
    });
    collapse_blank_lines(&normalized)
        .trim_matches('\n')
        .to_string()
}
