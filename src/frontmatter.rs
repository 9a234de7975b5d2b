//! Front matter and the hidden machine-readable metadata comment.
//!
//! Front matter is a human-oriented `---` block of `key: value` lines:
//!
//! ```text
//! ---
//! noteId: n1
//! chatTitle: Test Chat
//! tags: ["ai","rust"]
//! ---
//! ```
//!
//! The metadata comment carries the same fields as one versioned JSON object so tooling can
//! recover the exact metadata without parsing the block above:
//!
//! ```text
//! <!-- chat-capture:meta {"version":1,"noteId":"n1","chatTitle":"Test Chat"} -->
//! ```

use serde::{Deserialize, Serialize};

use crate::importer::ExportMetadata;

pub const META_COMMENT_PREFIX: &str = "<!-- chat-capture:meta ";
const META_COMMENT_SUFFIX: &str = " -->";
pub const META_VERSION: u32 = 1;

/// Value of one front-matter field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue<'a> {
    Text(&'a str),
    List(Vec<&'a str>),
}

/// The non-blank metadata fields in their fixed output order.
pub fn metadata_fields(meta: &ExportMetadata) -> Vec<(&'static str, FieldValue<'_>)> {
    let scalars = [
        ("noteId", &meta.note_id),
        ("source", &meta.source),
        ("chatId", &meta.chat_id),
        ("chatTitle", &meta.chat_title),
        ("pageUrl", &meta.page_url),
        ("exportedAt", &meta.exported_at),
        ("model", &meta.model),
        ("subject", &meta.subject),
        ("topic", &meta.topic),
        ("summary", &meta.summary),
    ];
    let mut fields: Vec<(&'static str, FieldValue<'_>)> = scalars
        .into_iter()
        .filter_map(|(key, value)| {
            ExportMetadata::non_blank(value).map(|v| (key, FieldValue::Text(v)))
        })
        .collect();

    let tags = non_blank_tags(meta);
    if !tags.is_empty() {
        fields.push(("tags", FieldValue::List(tags)));
    }
    fields
}

fn non_blank_tags(meta: &ExportMetadata) -> Vec<&str> {
    meta.tags
        .iter()
        .flatten()
        .map(String::as_str)
        .filter(|t| !t.trim().is_empty())
        .collect()
}

/// Render the `---` block followed by a blank line. Empty when no field is set.
pub fn render_front_matter(meta: &ExportMetadata) -> String {
    let fields = metadata_fields(meta);
    if fields.is_empty() {
        return String::new();
    }
    let mut out = String::from("---\n");
    for (key, value) in fields {
        let rendered = match value {
            FieldValue::Text(text) => single_line(text),
            FieldValue::List(items) => serde_json::to_string(&items).unwrap_or_default(),
        };
        out.push_str(&format!("{key}: {rendered}\n"));
    }
    out.push_str("---\n\n");
    out
}

fn single_line(text: &str) -> String {
    text.trim()
        .replace("\r\n", " ")
        .replace(['\n', '\r'], " ")
}

// ---------------------------------------------------------------------------
// Hidden metadata comment
// ---------------------------------------------------------------------------

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MetaRecord<'a> {
    version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    note_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    chat_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    chat_title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exported_at: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subject: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    topic: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tags: Vec<&'a str>,
}

#[derive(Deserialize)]
struct StoredMeta {
    version: u32,
    #[serde(flatten)]
    metadata: ExportMetadata,
}

/// Render the single-line metadata comment (no trailing newline).
pub fn render_meta_comment(meta: &ExportMetadata) -> String {
    let record = MetaRecord {
        version: META_VERSION,
        note_id: ExportMetadata::non_blank(&meta.note_id),
        source: ExportMetadata::non_blank(&meta.source),
        chat_id: ExportMetadata::non_blank(&meta.chat_id),
        chat_title: ExportMetadata::non_blank(&meta.chat_title),
        page_url: ExportMetadata::non_blank(&meta.page_url),
        exported_at: ExportMetadata::non_blank(&meta.exported_at),
        model: ExportMetadata::non_blank(&meta.model),
        subject: ExportMetadata::non_blank(&meta.subject),
        topic: ExportMetadata::non_blank(&meta.topic),
        summary: ExportMetadata::non_blank(&meta.summary),
        tags: non_blank_tags(meta),
    };
    let Ok(json) = serde_json::to_string(&record) else {
        return String::new();
    };
    // `-->` can only occur inside JSON strings, where the escape is equivalent.
    let json = json.replace("-->", "--\\u003e");
    format!("{META_COMMENT_PREFIX}{json}{META_COMMENT_SUFFIX}")
}

/// Recover metadata from the first metadata comment in `markdown`.
///
/// Returns `None` when there is no comment, it is garbled, or its version is unknown.
pub fn read_meta_comment(markdown: &str) -> Option<ExportMetadata> {
    let line = markdown
        .lines()
        .map(str::trim)
        .find(|l| l.starts_with(META_COMMENT_PREFIX))?;
    let json = line
        .strip_prefix(META_COMMENT_PREFIX)?
        .strip_suffix(META_COMMENT_SUFFIX)?;
    let stored: StoredMeta = serde_json::from_str(json).ok()?;
    (stored.version == META_VERSION).then_some(stored.metadata)
}

/// Best-effort parse of a leading front-matter block.
///
/// Values come back single-lined, exactly as written; use [`read_meta_comment`] for
/// lossless recovery.
pub fn read_front_matter(markdown: &str) -> Option<ExportMetadata> {
    let mut lines = markdown.lines();
    if lines.next()?.trim() != "---" {
        return None;
    }
    let mut meta = ExportMetadata::default();
    for line in lines {
        if line.trim() == "---" {
            return Some(meta);
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim().to_string();
        let slot = match key.trim() {
            "noteId" => &mut meta.note_id,
            "source" => &mut meta.source,
            "chatId" => &mut meta.chat_id,
            "chatTitle" => &mut meta.chat_title,
            "pageUrl" => &mut meta.page_url,
            "exportedAt" => &mut meta.exported_at,
            "model" => &mut meta.model,
            "subject" => &mut meta.subject,
            "topic" => &mut meta.topic,
            "summary" => &mut meta.summary,
            "tags" => {
                meta.tags = serde_json::from_str(&value).ok();
                continue;
            }
            _ => continue,
        };
        *slot = Some(value);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> ExportMetadata {
        ExportMetadata {
            note_id: Some("n1".into()),
            source: Some("chatgpt".into()),
            chat_id: Some("".into()),
            chat_title: Some("Test Chat".into()),
            page_url: Some("https://chat.example.com/c/1".into()),
            exported_at: Some("2026-01-02T03:04:05Z".into()),
            model: None,
            subject: Some("math".into()),
            topic: Some("algebra".into()),
            summary: Some("Line one\nline two".into()),
            tags: Some(vec!["ai".into(), " ".into(), "notes".into()]),
        }
    }

    #[test]
    fn front_matter_in_fixed_order_without_blanks() {
        assert_eq!(
            render_front_matter(&sample()),
            "---\n\
             noteId: n1\n\
             source: chatgpt\n\
             chatTitle: Test Chat\n\
             pageUrl: https://chat.example.com/c/1\n\
             exportedAt: 2026-01-02T03:04:05Z\n\
             subject: math\n\
             topic: algebra\n\
             summary: Line one line two\n\
             tags: [\"ai\",\"notes\"]\n\
             ---\n\n"
        );
    }

    #[test]
    fn empty_metadata_has_no_front_matter() {
        assert_eq!(render_front_matter(&ExportMetadata::default()), "");
        let blank = ExportMetadata {
            note_id: Some(String::new()),
            tags: Some(vec![]),
            ..Default::default()
        };
        assert_eq!(render_front_matter(&blank), "");
    }

    #[test]
    fn meta_comment_is_single_line_and_versioned() {
        let comment = render_meta_comment(&ExportMetadata {
            note_id: Some("n1".into()),
            chat_title: Some("Test Chat".into()),
            ..Default::default()
        });
        assert_eq!(
            comment,
            r#"<!-- chat-capture:meta {"version":1,"noteId":"n1","chatTitle":"Test Chat"} -->"#
        );
    }

    #[test]
    fn meta_comment_round_trips() {
        let mut meta = sample();
        meta.summary = Some("ends with --> arrow\nand a newline".into());
        let comment = render_meta_comment(&meta);
        assert!(!comment.contains("--> "), "{comment}");
        assert_eq!(comment.lines().count(), 1);

        let doc = format!("---\nnoteId: n1\n---\n\n{comment}\n\n# Test Chat\n");
        let recovered = read_meta_comment(&doc).unwrap();
        assert_eq!(recovered.summary, meta.summary);
        assert_eq!(recovered.note_id, meta.note_id);
        assert_eq!(recovered.chat_id, None);
        assert_eq!(recovered.tags, Some(vec!["ai".to_string(), "notes".to_string()]));
    }

    #[test]
    fn unknown_version_is_ignored() {
        let doc = r#"<!-- chat-capture:meta {"version":9,"noteId":"n1"} -->"#;
        assert_eq!(read_meta_comment(doc), None);
        assert_eq!(read_meta_comment("<!-- chat-capture:meta {oops -->"), None);
        assert_eq!(read_meta_comment("# nothing here"), None);
    }

    #[test]
    fn front_matter_reads_back() {
        let doc = render_front_matter(&sample());
        let meta = read_front_matter(&doc).unwrap();
        assert_eq!(meta.note_id.as_deref(), Some("n1"));
        assert_eq!(meta.page_url.as_deref(), Some("https://chat.example.com/c/1"));
        assert_eq!(meta.summary.as_deref(), Some("Line one line two"));
        assert_eq!(meta.tags, Some(vec!["ai".to_string(), "notes".to_string()]));
        assert_eq!(read_front_matter("# no front matter"), None);
        assert_eq!(read_front_matter("---\nnoteId: x\n"), None);
    }
}
