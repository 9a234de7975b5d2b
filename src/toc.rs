//! Prompt titles, anchors and the table of contents.

use crate::importer::{Role, Turn};

/// Titles longer than this are truncated.
pub const MAX_TITLE_CHARS: usize = 220;
const TRUNCATED_TITLE_CHARS: usize = MAX_TITLE_CHARS - 3;
const ELLIPSIS: char = '…';

/// Navigation data for one prompt turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptInfo {
    /// 1-based position among prompt turns only.
    pub number: usize,
    pub title: String,
    pub anchor: String,
}

/// Anchor id for the `number`th prompt. Purely positional.
pub fn anchor_id(number: usize) -> String {
    format!("p-{number}")
}

/// First non-blank line of `text`, trimmed and truncated to [`MAX_TITLE_CHARS`].
///
/// Returns `fallback` when `text` has no non-blank line.
pub fn derive_title(text: &str, fallback: &str) -> String {
    let Some(line) = text.lines().map(str::trim).find(|l| !l.is_empty()) else {
        return fallback.to_string();
    };
    if line.chars().count() > MAX_TITLE_CHARS {
        let mut title: String = line.chars().take(TRUNCATED_TITLE_CHARS).collect();
        title.push(ELLIPSIS);
        title
    } else {
        line.to_string()
    }
}

/// Number, title and anchor every prompt turn, in turn order.
pub fn collect_prompts(turns: &[Turn]) -> Vec<PromptInfo> {
    turns
        .iter()
        .filter(|t| t.role == Role::User)
        .enumerate()
        .map(|(i, turn)| {
            let number = i + 1;
            PromptInfo {
                number,
                title: derive_title(&turn.text, &format!("Prompt {number}")),
                anchor: anchor_id(number),
            }
        })
        .collect()
}

/// Render the table of contents, or nothing when there are no prompts.
pub fn render_toc(prompts: &[PromptInfo]) -> String {
    if prompts.is_empty() {
        return String::new();
    }
    let mut out = String::from("## Table of Contents\n\n");
    for prompt in prompts {
        let title = prompt.title.replace("\r\n", " ").replace(['\n', '\r'], " ");
        out.push_str(&format!("{}. [{}](#{})\n", prompt.number, title, prompt.anchor));
    }
    out.push('\n');
    out
}
