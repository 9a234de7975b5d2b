use chrono::{DateTime, SecondsFormat, Utc};
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use url::Url;
use uuid::Uuid;

use crate::exporter::ExportOptions;
use crate::frontmatter::{read_front_matter, read_meta_comment};
use crate::importer::{Capture, ExportMetadata};

/// Upper bound on how much of an existing export is read to find its metadata.
const HEADER_SCAN_BYTES: usize = 64 * 1024;

/// Resolved settings for a batch run, after CLI flags and the config file are merged.
#[derive(Clone)]
pub struct ExportConfig {
    pub inputs: Vec<PathBuf>,
    pub target_dir: PathBuf,
    pub tags: Option<Vec<String>>,
    pub title: Option<String>,
    pub include_front_matter: bool,
    pub include_meta_comment: bool,
    pub include_meta_row: bool,
    pub include_toc: bool,
    pub force: bool,
}

impl ExportConfig {
    /// Render options for one capture: the capture's HTML and notes, the configured toggles.
    pub fn export_options(&self, capture: &Capture) -> ExportOptions {
        ExportOptions {
            title: self.title.clone().or_else(|| capture.title.clone()),
            include_front_matter: self.include_front_matter,
            include_meta_comment: self.include_meta_comment,
            include_meta_row: self.include_meta_row,
            include_toc: self.include_toc,
            html_bodies: capture.resolved_html_bodies(),
            freeform_notes: capture.notes.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessResult {
    Created,
    Updated,
    Skipped,
}

/// Fill in what the harvester left out.
///
/// - configured tags are appended to the capture's own, without duplicates
/// - `exportedAt` defaults to `now`
/// - `source` defaults to the page URL's host
/// - `noteId` defaults to the chat id, then to a fresh UUID
pub fn apply_defaults(capture: &mut Capture, tags: Option<&[String]>, now: DateTime<Utc>) {
    let meta = &mut capture.metadata;

    if let Some(extra) = tags.filter(|t| !t.is_empty()) {
        let merged = meta.tags.get_or_insert_with(Vec::new);
        for tag in extra {
            if !merged.contains(tag) {
                merged.push(tag.clone());
            }
        }
    }

    if meta.exported_at().is_none() {
        meta.exported_at = Some(now.to_rfc3339_opts(SecondsFormat::Secs, true));
    }

    if ExportMetadata::non_blank(&meta.source).is_none() {
        meta.source = meta
            .page_url()
            .and_then(|u| Url::parse(u.trim()).ok())
            .and_then(|u| u.host_str().map(str::to_owned));
    }

    if meta.note_id().is_none() {
        meta.note_id = Some(
            ExportMetadata::non_blank(&meta.chat_id)
                .map(str::to_owned)
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
        );
    }
}

/// Read the metadata of an existing export: the hidden comment if present, else the
/// front matter.
pub fn parse_existing_export(path: &Path) -> Option<ExportMetadata> {
    let file = File::open(path).ok()?;
    let reader = BufReader::new(file);
    let mut head = String::new();
    for line in reader.lines() {
        let line = line.ok()?;
        // Metadata always precedes the document heading.
        if line.starts_with("# ") || head.len() > HEADER_SCAN_BYTES {
            break;
        }
        head.push_str(&line);
        head.push('\n');
    }
    read_meta_comment(&head).or_else(|| read_front_matter(&head))
}

/// Whether `existing` already reflects `incoming`.
///
/// RFC 3339 timestamps compare chronologically; anything else must match exactly.
pub fn is_up_to_date(existing: &ExportMetadata, incoming: &ExportMetadata) -> bool {
    let (Some(old), Some(new)) = (existing.exported_at(), incoming.exported_at()) else {
        return false;
    };
    match (parse_timestamp(old), parse_timestamp(new)) {
        (Some(old), Some(new)) => old >= new,
        _ => old.trim() == new.trim(),
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Filesystem-safe form of a note id.
fn id_stem(id: &str) -> String {
    let stem = slug::slugify(id);
    if stem.is_empty() {
        "note".to_string()
    } else {
        stem
    }
}

/// The export owned by `id`: candidates share the id's 8-char file prefix and are
/// confirmed through the `noteId` in their metadata.
pub fn find_existing_file(target_dir: &Path, id: &str) -> Option<PathBuf> {
    let stem = id_stem(id);
    let prefix = &stem[..8.min(stem.len())];
    fs::read_dir(target_dir)
        .ok()?
        .flatten()
        .filter(|e| {
            let n = e.file_name();
            let s = n.to_string_lossy();
            s.ends_with(".md") && s.starts_with(prefix)
        })
        .find_map(|e| {
            let path = e.path();
            let meta = parse_existing_export(&path)?;
            if meta.note_id() == Some(id) {
                Some(path)
            } else {
                None
            }
        })
}

/// Filename stem `<id prefix>_<title slug>` for a note.
///
/// The prefix grows from 8 to 12 chars to the whole id until the name is free or
/// already belongs to `id`.
pub fn allocate_filename(id: &str, title: &str, target_dir: &Path) -> String {
    let raw_slug = slug::slugify(title);
    // slugify output is ASCII
    let slug = raw_slug[..raw_slug.len().min(60)]
        .trim_end_matches('-')
        .to_string();
    let id_stem = id_stem(id);

    for &len in &[8usize, 12usize, id_stem.len()] {
        let prefix = &id_stem[..len.min(id_stem.len())];
        let stem = if slug.is_empty() {
            prefix.to_string()
        } else {
            format!("{}_{}", prefix, slug)
        };
        let path = target_dir.join(format!("{}.md", stem));
        match path.try_exists() {
            Ok(false) => return stem,
            Ok(true) => {
                if let Some(meta) = parse_existing_export(&path)
                    && meta.note_id() == Some(id)
                {
                    return stem;
                }
                // owned by another note
            }
            Err(_) => return stem,
        }
    }

    if slug.is_empty() {
        id_stem
    } else {
        format!("{}_{}", id_stem, slug)
    }
}
