//! Input data model for captured conversations.
//!
//! A capture is what the browser-side harvester hands over: identifying metadata plus an
//! ordered list of role-tagged turns, optionally with one HTML fragment per turn.
//!
//! On-disk format (camelCase JSON):
//! ```json
//! {
//!   "metadata": { "noteId": "n1", "chatTitle": "Test Chat", "tags": ["ai"] },
//!   "turns": [
//!     { "role": "user", "text": "Hello" },
//!     { "role": "assistant", "text": "Hi there", "html": "<p>Hi there</p>" }
//!   ],
//!   "htmlBodies": null,
//!   "notes": "optional freeform text",
//!   "title": "optional heading override"
//! }
//! ```
use std::fs;
use std::path::Path;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Identifies one exported document.
///
/// Every field is optional. `None` and `Some("")` mean the same thing: the field is
/// omitted from every serialized form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportMetadata {
    pub note_id: Option<String>,
    pub source: Option<String>,
    pub chat_id: Option<String>,
    pub chat_title: Option<String>,
    pub page_url: Option<String>,
    pub exported_at: Option<String>,
    pub model: Option<String>,
    pub subject: Option<String>,
    pub topic: Option<String>,
    pub summary: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl ExportMetadata {
    /// Field value with blank strings treated as absent.
    pub(crate) fn non_blank(value: &Option<String>) -> Option<&str> {
        value.as_deref().filter(|v| !v.trim().is_empty())
    }

    pub fn title(&self) -> Option<&str> {
        Self::non_blank(&self.chat_title)
    }

    pub fn page_url(&self) -> Option<&str> {
        Self::non_blank(&self.page_url)
    }

    pub fn exported_at(&self) -> Option<&str> {
        Self::non_blank(&self.exported_at)
    }

    pub fn note_id(&self) -> Option<&str> {
        Self::non_blank(&self.note_id)
    }

    /// Non-empty tag list, if any.
    pub fn tags(&self) -> Option<&[String]> {
        self.tags.as_deref().filter(|t| !t.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Turns
// ---------------------------------------------------------------------------

/// Conversation turn role.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A user-authored prompt.
    User,
    /// A model response.
    Assistant,
    System,
    Tool,
}

impl Role {
    /// Presentation label used in the rendered block.
    pub fn label(self) -> &'static str {
        match self {
            Role::User => "Prompt",
            Role::Assistant => "Response",
            Role::System => "System",
            Role::Tool => "Tool",
        }
    }

    /// Parse a role name, accepting the aliases different harvesters use.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "user" | "prompt" | "human" => Some(Role::User),
            "assistant" | "response" | "model" | "ai" | "bot" => Some(Role::Assistant),
            "system" => Some(Role::System),
            "tool" | "function" => Some(Role::Tool),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;

        let raw = String::deserialize(deserializer)?;
        Role::parse(&raw).ok_or_else(|| D::Error::custom(format!("unknown turn role: {raw:?}")))
    }
}

/// One utterance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    /// Plain-text body. Always present, possibly empty.
    #[serde(default)]
    pub text: String,
    /// HTML body as harvested from the page, when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
}

impl Turn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            html: None,
        }
    }

    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Capture files
// ---------------------------------------------------------------------------

/// A capture file as written by the harvester.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Capture {
    pub metadata: ExportMetadata,
    pub turns: Vec<Turn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_bodies: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Capture {
    /// The per-turn HTML array for rich mode.
    ///
    /// An explicit `htmlBodies` array wins. Otherwise, if any turn carries its own HTML,
    /// the array is assembled from the turns with blank entries for turns without HTML.
    pub fn resolved_html_bodies(&self) -> Option<Vec<String>> {
        if let Some(bodies) = &self.html_bodies {
            return Some(bodies.clone());
        }
        if self.turns.iter().any(|t| t.html.is_some()) {
            return Some(
                self.turns
                    .iter()
                    .map(|t| t.html.clone().unwrap_or_default())
                    .collect(),
            );
        }
        None
    }
}

/// Read and parse a capture file.
pub fn load_capture(path: &Path) -> Result<Capture> {
    let bytes =
        fs::read(path).wrap_err_with(|| format!("Failed to read capture: {}", path.display()))?;
    parse_capture(&bytes).wrap_err_with(|| format!("Failed to parse capture: {}", path.display()))
}

pub fn parse_capture(bytes: &[u8]) -> Result<Capture> {
    serde_json::from_slice(bytes).wrap_err("Capture is not valid JSON")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn role_aliases() {
        assert_eq!(Role::parse("USER"), Some(Role::User));
        assert_eq!(Role::parse(" prompt "), Some(Role::User));
        assert_eq!(Role::parse("assistant"), Some(Role::Assistant));
        assert_eq!(Role::parse("model"), Some(Role::Assistant));
        assert_eq!(Role::parse("function"), Some(Role::Tool));
        assert_eq!(Role::parse("narrator"), None);
    }

    #[test]
    fn parses_minimal_capture() {
        let json = br#"{
            "metadata": {"noteId": "n1", "chatTitle": "Test Chat", "model": null},
            "turns": [
                {"role": "user", "text": "Hello\nworld"},
                {"role": "assistant", "text": "Hi there"}
            ]
        }"#;
        let capture = parse_capture(json).unwrap();
        assert_eq!(capture.metadata.note_id(), Some("n1"));
        assert_eq!(capture.metadata.title(), Some("Test Chat"));
        assert_eq!(capture.metadata.model, None);
        assert_eq!(capture.turns.len(), 2);
        assert_eq!(capture.turns[1].role, Role::Assistant);
        assert!(capture.resolved_html_bodies().is_none());
    }

    #[test]
    fn unknown_role_is_rejected() {
        let json = br#"{"turns": [{"role": "narrator", "text": "x"}]}"#;
        assert!(parse_capture(json).is_err());
    }

    #[test]
    fn blank_fields_count_as_absent() {
        let meta = ExportMetadata {
            chat_title: Some("   ".into()),
            tags: Some(vec![]),
            ..Default::default()
        };
        assert_eq!(meta.title(), None);
        assert_eq!(meta.tags(), None);
    }

    #[test]
    fn html_bodies_from_turns() {
        let capture = Capture {
            turns: vec![
                Turn::new(Role::User, "q"),
                Turn::new(Role::Assistant, "a").with_html("<p>a</p>"),
            ],
            ..Default::default()
        };
        assert_eq!(
            capture.resolved_html_bodies(),
            Some(vec![String::new(), "<p>a</p>".to_string()])
        );
    }

    #[test]
    fn explicit_html_bodies_win() {
        let capture = Capture {
            turns: vec![Turn::new(Role::Assistant, "a").with_html("<p>a</p>")],
            html_bodies: Some(vec!["<p>b</p>".into()]),
            ..Default::default()
        };
        assert_eq!(
            capture.resolved_html_bodies(),
            Some(vec!["<p>b</p>".to_string()])
        );
    }
}
