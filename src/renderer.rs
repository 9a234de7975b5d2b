//! Per-turn presentation blocks.
//!
//! ```text
//! <a id="p-1"></a>
//! **Prompt**
//!
//! > quoted prompt
//!
//! **Response**
//!
//! converted response body
//! ```

use crate::fences::repair_fences;
use crate::html::{FragmentParser, HtmlConverter, quote_lines};
use crate::importer::{Role, Turn};
use crate::normalize::{normalize_line_endings, normalize_suggestions};

/// Renders turns into blocks, converting HTML bodies with a shared converter.
pub struct TurnRenderer<'a, P> {
    converter: &'a HtmlConverter<P>,
}

impl<'a, P: FragmentParser> TurnRenderer<'a, P> {
    pub fn new(converter: &'a HtmlConverter<P>) -> Self {
        Self { converter }
    }

    /// Render one turn.
    ///
    /// `html` is the turn's fragment in rich mode and `None` in plain mode. `anchor` is the
    /// prompt anchor id and is only used for prompt turns.
    pub fn render(&self, turn: &Turn, html: Option<&str>, anchor: &str) -> String {
        let html = html.filter(|h| !h.trim().is_empty());
        match turn.role {
            Role::User => {
                // Prompts are user-authored plain text; keep their line structure.
                let body = match html {
                    Some(h) if turn.text.trim().is_empty() => self.converter.convert(h),
                    _ => turn.text.clone(),
                };
                render_prompt(anchor, &body)
            }
            Role::Assistant => {
                let body = match html {
                    Some(h) => {
                        let converted = self.converter.convert(h);
                        normalize_suggestions(&repair_fences(&converted))
                    }
                    None => turn.text.clone(),
                };
                render_labeled(turn.role.label(), &body)
            }
            Role::System | Role::Tool => {
                let body = match html {
                    Some(h) => self.converter.convert(h),
                    None => turn.text.clone(),
                };
                render_labeled(turn.role.label(), &body)
            }
        }
    }
}

/// Anchor, bold label and the body as a blockquote.
pub fn render_prompt(anchor: &str, body: &str) -> String {
    let body = clean_body(body);
    let mut out = format!("<a id=\"{anchor}\"></a>\n**{}**", Role::User.label());
    if !body.is_empty() {
        out.push_str("\n\n");
        out.push_str(&quote_lines(&body));
    }
    out
}

/// Bold label followed by the body, or the label alone for a blank body.
pub fn render_labeled(label: &str, body: &str) -> String {
    let body = clean_body(body);
    let body = body.trim_start();
    if body.is_empty() {
        format!("**{label}**")
    } else {
        format!("**{label}**\n\n{body}")
    }
}

/// LF line endings, no trailing whitespace, no leading blank lines.
fn clean_body(body: &str) -> String {
    normalize_line_endings(body)
        .trim_end()
        .trim_start_matches('\n')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn render(turn: &Turn, html: Option<&str>) -> String {
        let converter = HtmlConverter::new();
        TurnRenderer::new(&converter).render(turn, html, "p-1")
    }

    #[test]
    fn prompt_is_anchored_and_quoted() {
        let turn = Turn::new(Role::User, "Hello\r\n\r\nworld  \n\n");
        assert_eq!(
            render(&turn, None),
            "<a id=\"p-1\"></a>\n**Prompt**\n\n> Hello\n>\n> world"
        );
    }

    #[test]
    fn prompt_ignores_html_when_text_is_present() {
        let turn = Turn::new(Role::User, "line one\nline two");
        assert_eq!(
            render(&turn, Some("<p>line one line two</p>")),
            "<a id=\"p-1\"></a>\n**Prompt**\n\n> line one\n> line two"
        );
    }

    #[test]
    fn blank_prompt_with_html_uses_the_html() {
        let turn = Turn::new(Role::User, "  ");
        assert_eq!(
            render(&turn, Some("<p><b>from</b> html</p>")),
            "<a id=\"p-1\"></a>\n**Prompt**\n\n> **from** html"
        );
    }

    #[test]
    fn blank_prompt_renders_an_empty_block() {
        let turn = Turn::new(Role::User, "");
        assert_eq!(render(&turn, None), "<a id=\"p-1\"></a>\n**Prompt**");
    }

    #[test]
    fn response_runs_the_full_pipeline() {
        let turn = Turn::new(Role::Assistant, "ignored");
        let html = "<p>Try:</p><p>js</p><p><code>console.log(1)</code></p><hr><p>Suggestions</p><p>• more</p>";
        assert_eq!(
            render(&turn, Some(html)),
            "**Response**\n\nTry:\n\n```\n``js\nconsole.log(1)\n``\n```\n\n#### Suggestions\n\n- more"
        );
    }

    #[test]
    fn plain_response_is_trimmed_text() {
        let turn = Turn::new(Role::Assistant, "\n\nHi there\n\n");
        assert_eq!(render(&turn, None), "**Response**\n\nHi there");
        assert_eq!(render(&turn, Some("   ")), "**Response**\n\nHi there");
    }

    #[test]
    fn system_and_tool_labels() {
        let system = Turn::new(Role::System, "be brief");
        assert_eq!(render(&system, None), "**System**\n\nbe brief");

        let tool = Turn::new(Role::Tool, "raw");
        assert_eq!(render(&tool, Some("<p>ran <code>ls</code></p>")), "**Tool**\n\nran `ls`");
    }

    #[test]
    fn empty_response_is_label_only() {
        let turn = Turn::new(Role::Assistant, "");
        assert_eq!(render(&turn, None), "**Response**");
    }
}
