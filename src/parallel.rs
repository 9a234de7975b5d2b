use crate::exporter::export_markdown;
use crate::importer::load_capture;
use crate::utils::{
    ExportConfig, ProcessResult, allocate_filename, apply_defaults, find_existing_file,
    is_up_to_date, parse_existing_export,
};
use chrono::Utc;
use crossbeam_channel::bounded;
use eyre::{Context, Result, eyre};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, error, info, warn};

/// Counters for one batch run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: usize,
}

pub fn execute(config: ExportConfig) -> Result<Summary> {
    let files = collect_capture_files(&config.inputs)?;
    if files.is_empty() {
        return Err(eyre!("No capture files (*.json) found in the given inputs"));
    }
    fs::create_dir_all(&config.target_dir).wrap_err_with(|| {
        format!(
            "Failed to create target directory: {}",
            config.target_dir.display()
        )
    })?;

    let (tx, rx) = bounded::<PathBuf>(64);
    let count_created = AtomicUsize::new(0);
    let count_updated = AtomicUsize::new(0);
    let count_skipped = AtomicUsize::new(0);
    let count_errors = AtomicUsize::new(0);
    let n_workers = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(8)
        .min(files.len());

    std::thread::scope(|s| {
        for _ in 0..n_workers {
            let rx = rx.clone();
            let (config, count_created, count_updated, count_skipped, count_errors) = (
                &config,
                &count_created,
                &count_updated,
                &count_skipped,
                &count_errors,
            );

            s.spawn(move || {
                while let Ok(path) = rx.recv() {
                    match export_file(&path, config) {
                        Ok(ProcessResult::Created) => {
                            count_created.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(ProcessResult::Updated) => {
                            count_updated.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(ProcessResult::Skipped) => {
                            count_skipped.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            count_errors.fetch_add(1, Ordering::Relaxed);
                            error!("Error [{}]: {:#}", path.display(), e);
                        }
                    }
                }
            });
        }

        drop(rx);

        for path in files {
            if tx.send(path).is_err() {
                break;
            }
        }

        drop(tx);
        Ok::<_, eyre::Error>(())
    })
    .wrap_err("Export pipeline failed")?;

    let summary = Summary {
        created: count_created.load(Ordering::Relaxed),
        updated: count_updated.load(Ordering::Relaxed),
        skipped: count_skipped.load(Ordering::Relaxed),
        errors: count_errors.load(Ordering::Relaxed),
    };

    info!(
        "Done. {} created, {} updated, {} skipped. Errors: {}",
        summary.created, summary.updated, summary.skipped, summary.errors,
    );

    Ok(summary)
}

/// Render a single capture to `writer` instead of the target directory.
pub fn write_capture<W: Write>(path: &Path, config: &ExportConfig, writer: &mut W) -> Result<()> {
    let mut capture = load_capture(path)?;
    apply_defaults(&mut capture, config.tags.as_deref(), Utc::now());
    let markdown = export_markdown(
        &capture.metadata,
        &capture.turns,
        &config.export_options(&capture),
    );
    writer
        .write_all(markdown.as_bytes())
        .wrap_err("Failed to write markdown")?;
    writer.flush().wrap_err("Failed to flush markdown")
}

/// Expand the inputs: files are taken as-is, directories contribute their `*.json` files.
pub fn collect_capture_files(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut found: Vec<PathBuf> = fs::read_dir(input)
                .wrap_err_with(|| format!("Failed to read directory: {}", input.display()))?
                .flatten()
                .map(|e| e.path())
                .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
                .collect();
            found.sort();
            files.extend(found);
        } else if input.exists() {
            files.push(input.clone());
        } else {
            return Err(eyre!("Input not found: {}", input.display()));
        }
    }
    Ok(files)
}

fn export_file(path: &Path, config: &ExportConfig) -> Result<ProcessResult> {
    let mut capture = load_capture(path)?;
    apply_defaults(&mut capture, config.tags.as_deref(), Utc::now());

    let id = capture
        .metadata
        .note_id()
        .map(str::to_owned)
        .ok_or_else(|| eyre!("Capture has no note id"))?;
    let existing_path = find_existing_file(&config.target_dir, &id);

    if !config.force
        && let Some(ref existing) = existing_path
        && let Some(previous) = parse_existing_export(existing)
        && is_up_to_date(&previous, &capture.metadata)
    {
        debug!("Skipped: {}", existing.display());
        return Ok(ProcessResult::Skipped);
    }

    let options = config.export_options(&capture);
    let title = options
        .title
        .clone()
        .or_else(|| capture.metadata.title().map(str::to_owned))
        .unwrap_or_default();
    let stem = allocate_filename(&id, &title, &config.target_dir);
    let desired_path = config.target_dir.join(format!("{}.md", stem));
    let result_variant = if existing_path.is_none() {
        ProcessResult::Created
    } else {
        ProcessResult::Updated
    };

    if let Some(ref old_path) = existing_path
        && old_path != &desired_path
        && let Err(e) = fs::rename(old_path, &desired_path)
    {
        warn!(
            "Rename failed {} -> {}: {}",
            old_path.display(),
            desired_path.display(),
            e
        );
    }

    let markdown = export_markdown(&capture.metadata, &capture.turns, &options);

    let md_file = File::create(&desired_path)
        .wrap_err_with(|| format!("Failed to create: {}", desired_path.display()))?;
    let mut writer = BufWriter::new(md_file);
    writer
        .write_all(markdown.as_bytes())
        .wrap_err_with(|| format!("Failed to write: {}", desired_path.display()))?;
    writer.flush()?;
    drop(writer);

    match result_variant {
        ProcessResult::Created => debug!("Created: {}.md", stem),
        ProcessResult::Updated => debug!("Updated: {}.md", stem),
        ProcessResult::Skipped => {}
    }

    Ok(result_variant)
}
