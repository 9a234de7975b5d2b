//! # chat-capture-export
//!
//! Turns captured AI chat transcripts into stable, indexable Markdown documents.
//!
//! ## What it does
//!
//! A capture is a JSON file holding chat metadata and the ordered turns of a conversation,
//! optionally with the rendered HTML of each turn. Each capture becomes one Markdown file:
//!
//! - front matter and a hidden, single-line JSON metadata comment
//! - a title heading with `Source:` / `Exported:` lines
//! - a table of contents linking to stable per-prompt anchors (`p-1`, `p-2`, ...)
//! - every turn as a labeled block; prompts are quoted, responses converted from HTML
//!
//! HTML conversion repairs the malformed fences some chat UIs produce, strips UI chrome
//! and normalizes "Suggestions" sections.
//!
//! ## Incremental export
//!
//! Existing files are matched to captures by note id through the metadata comment. A file
//! whose `exportedAt` is not older than the capture's is skipped unless `--force` is given.
//!
//! ## Usage
//!
//! ```sh
//! # Export every capture in a directory
//! chat-capture-export captures/ --out ~/notes/chats
//!
//! # Single capture to stdout, with tags
//! chat-capture-export capture.json --stdout --tags ai,chat
//! ```
//!
//! Preferences can be persisted in `~/.config/chat-capture-export/config.toml`.

pub mod exporter;
pub mod fences;
pub mod frontmatter;
pub mod html;
pub mod importer;
pub mod normalize;
pub mod parallel;
pub mod renderer;
pub mod toc;
pub mod utils;

pub use exporter::{ExportOptions, export_capture, export_markdown};
pub use fences::repair_fences;
pub use html::{FragmentParser, HtmlConverter};
pub use importer::{Capture, ExportMetadata, Role, Turn};
pub use normalize::normalize_suggestions;
