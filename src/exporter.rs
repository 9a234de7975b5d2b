//! Document assembly.
//!
//! One call turns metadata and an ordered list of turns into a complete Markdown document:
//! front matter, metadata comment, heading, source lines, table of contents, turn blocks,
//! notes. The call is pure and never fails; content it cannot format well is still exported.

use std::sync::LazyLock;

use tracing::debug;

use crate::frontmatter::{render_front_matter, render_meta_comment};
use crate::html::{FragmentParser, HtmlConverter};
use crate::importer::{Capture, ExportMetadata, Role, Turn};
use crate::normalize::{normalize_line_endings, tidy_document};
use crate::renderer::TurnRenderer;
use crate::toc::{collect_prompts, render_toc};

/// Heading used when neither an override nor a chat title is available.
pub const DEFAULT_TITLE: &str = "Chat Export";

static CONVERTER: LazyLock<HtmlConverter> = LazyLock::new(HtmlConverter::new);

/// Options for one export call.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Overrides the document heading.
    pub title: Option<String>,
    pub include_front_matter: bool,
    /// The hidden single-line JSON metadata comment.
    pub include_meta_comment: bool,
    /// The `Source:` / `Exported:` lines under the heading.
    pub include_meta_row: bool,
    pub include_toc: bool,
    /// One HTML fragment per turn. Enables rich mode when its length matches the turns.
    pub html_bodies: Option<Vec<String>>,
    /// Appended as a trailing `## Notes` section.
    pub freeform_notes: Option<String>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            title: None,
            include_front_matter: true,
            include_meta_comment: true,
            include_meta_row: true,
            include_toc: true,
            html_bodies: None,
            freeform_notes: None,
        }
    }
}

impl ExportOptions {
    /// Options carrying a capture's HTML, notes and heading override.
    pub fn for_capture(capture: &Capture) -> Self {
        Self {
            title: capture.title.clone(),
            html_bodies: capture.resolved_html_bodies(),
            freeform_notes: capture.notes.clone(),
            ..Self::default()
        }
    }
}

/// How turn bodies are produced, chosen once per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Per-turn HTML is converted to Markdown.
    Rich,
    /// Only plain text is used.
    Plain,
}

/// Rich mode iff an HTML array is supplied with exactly one entry per turn.
pub fn select_mode(turns: &[Turn], html_bodies: Option<&[String]>) -> Mode {
    match html_bodies {
        Some(bodies) if bodies.len() == turns.len() => Mode::Rich,
        Some(bodies) => {
            debug!(
                html = bodies.len(),
                turns = turns.len(),
                "HTML body count does not match turns, falling back to plain mode"
            );
            Mode::Plain
        }
        None => Mode::Plain,
    }
}

/// Export a conversation to Markdown with the shared default converter.
pub fn export_markdown(meta: &ExportMetadata, turns: &[Turn], options: &ExportOptions) -> String {
    export_markdown_with(&CONVERTER, meta, turns, options)
}

/// Export a capture using its own HTML, notes and title.
pub fn export_capture(capture: &Capture) -> String {
    export_markdown(
        &capture.metadata,
        &capture.turns,
        &ExportOptions::for_capture(capture),
    )
}

/// Export with an explicit converter.
pub fn export_markdown_with<P: FragmentParser>(
    converter: &HtmlConverter<P>,
    meta: &ExportMetadata,
    turns: &[Turn],
    options: &ExportOptions,
) -> String {
    let mode = select_mode(turns, options.html_bodies.as_deref());
    debug!(?mode, turns = turns.len(), "exporting conversation");

    let mut out = String::new();

    if options.include_front_matter {
        out.push_str(&render_front_matter(meta));
    }
    if options.include_meta_comment {
        let comment = render_meta_comment(meta);
        if !comment.is_empty() {
            out.push_str(&comment);
            out.push_str("\n\n");
        }
    }

    out.push_str(&format!("# {}\n\n", document_title(meta, options)));

    if options.include_meta_row {
        let mut row = String::new();
        if let Some(url) = meta.page_url() {
            row.push_str(&format!("Source: {}\n", url.trim()));
        }
        if let Some(at) = meta.exported_at() {
            row.push_str(&format!("Exported: {}\n", at.trim()));
        }
        if !row.is_empty() {
            out.push_str(&row);
            out.push('\n');
        }
    }

    let prompts = collect_prompts(turns);
    if options.include_toc {
        out.push_str(&render_toc(&prompts));
    }

    let renderer = TurnRenderer::new(converter);
    let mut prompt_anchors = prompts.iter().map(|p| p.anchor.as_str());
    let blocks: Vec<String> = turns
        .iter()
        .enumerate()
        .map(|(i, turn)| {
            let html = match (mode, &options.html_bodies) {
                (Mode::Rich, Some(bodies)) => bodies.get(i).map(String::as_str),
                _ => None,
            };
            let anchor = if turn.role == Role::User {
                prompt_anchors.next().unwrap_or_default()
            } else {
                ""
            };
            renderer.render(turn, html, anchor)
        })
        .collect();
    out.push_str(&blocks.join("\n\n"));

    if let Some(notes) = options
        .freeform_notes
        .as_deref()
        .map(|n| normalize_line_endings(n).trim().to_string())
        .filter(|n| !n.is_empty())
    {
        out.push_str(&format!("\n\n## Notes\n\n{notes}\n"));
    }

    tidy_document(&out)
}

fn document_title(meta: &ExportMetadata, options: &ExportOptions) -> String {
    options
        .title
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .or_else(|| meta.title())
        .unwrap_or(DEFAULT_TITLE)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn meta() -> ExportMetadata {
        ExportMetadata {
            note_id: Some("n1".into()),
            chat_title: Some("Test Chat".into()),
            ..Default::default()
        }
    }

    #[test]
    fn mode_selection() {
        let turns = vec![Turn::new(Role::User, "a"), Turn::new(Role::Assistant, "b")];
        assert_eq!(select_mode(&turns, None), Mode::Plain);
        let one = vec!["x".to_string()];
        let two = vec!["x".to_string(), "y".to_string()];
        assert_eq!(select_mode(&turns, Some(one.as_slice())), Mode::Plain);
        assert_eq!(select_mode(&turns, Some(two.as_slice())), Mode::Rich);
    }

    #[test]
    fn full_plain_document() {
        let turns = vec![
            Turn::new(Role::User, "Hello\nworld"),
            Turn::new(Role::Assistant, "Hi there"),
        ];
        let doc = export_markdown(
            &meta(),
            &turns,
            &ExportOptions {
                include_meta_comment: false,
                ..Default::default()
            },
        );
        assert_eq!(
            doc,
            "---\n\
             noteId: n1\n\
             chatTitle: Test Chat\n\
             ---\n\
             \n\
             # Test Chat\n\
             \n\
             ## Table of Contents\n\
             \n\
             1. [Hello](#p-1)\n\
             \n\
             <a id=\"p-1\"></a>\n\
             **Prompt**\n\
             \n\
             > Hello\n\
             > world\n\
             \n\
             **Response**\n\
             \n\
             Hi there\n"
        );
    }

    #[test]
    fn meta_row_and_notes() {
        let meta = ExportMetadata {
            page_url: Some("https://chat.example.com/c/1".into()),
            exported_at: Some("2026-01-02T03:04:05Z".into()),
            ..Default::default()
        };
        let doc = export_markdown(
            &meta,
            &[],
            &ExportOptions {
                include_front_matter: false,
                include_meta_comment: false,
                title: Some("Override".into()),
                freeform_notes: Some("\r\n  remember this \r\n".into()),
                ..Default::default()
            },
        );
        assert_eq!(
            doc,
            "# Override\n\nSource: https://chat.example.com/c/1\nExported: 2026-01-02T03:04:05Z\n\n## Notes\n\nremember this\n"
        );
    }

    #[test]
    fn empty_input_still_produces_a_document() {
        let doc = export_markdown(&ExportMetadata::default(), &[], &ExportOptions::default());
        assert_eq!(doc, "<!-- chat-capture:meta {\"version\":1} -->\n\n# Chat Export\n");
    }

    #[test]
    fn toc_can_be_disabled() {
        let turns = vec![Turn::new(Role::User, "q")];
        let doc = export_markdown(
            &meta(),
            &turns,
            &ExportOptions {
                include_toc: false,
                ..Default::default()
            },
        );
        assert!(!doc.contains("Table of Contents"));
        assert!(doc.contains("<a id=\"p-1\"></a>"));
    }

    #[test]
    fn rich_mode_converts_responses() {
        let turns = vec![
            Turn::new(Role::User, "Show code"),
            Turn::new(Role::Assistant, "fn main() {}"),
        ];
        let options = ExportOptions {
            include_front_matter: false,
            include_meta_comment: false,
            html_bodies: Some(vec![
                String::new(),
                r#"<pre><code class="language-rust">fn main() {}</code></pre>"#.to_string(),
            ]),
            ..Default::default()
        };
        let doc = export_markdown(&meta(), &turns, &options);
        assert!(doc.ends_with("**Response**\n\n```rust\nfn main() {}\n```\n"), "{doc}");
    }

    #[test]
    fn capture_supplies_html_notes_and_title() {
        let capture = Capture {
            metadata: meta(),
            turns: vec![
                Turn::new(Role::User, "q"),
                Turn::new(Role::Assistant, "plain").with_html("<p><em>rich</em></p>"),
            ],
            notes: Some("n".into()),
            title: Some("Custom".into()),
            ..Default::default()
        };
        let doc = export_capture(&capture);
        assert!(doc.contains("# Custom\n"));
        assert!(doc.contains("**Response**\n\n*rich*"));
        assert!(doc.ends_with("## Notes\n\nn\n"));
    }
}
