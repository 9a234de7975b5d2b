use chat_capture_export::{parallel, utils};
use clap::Parser;
use eyre::{Context, Result, eyre};
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Export captured AI chat transcripts to Markdown files.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Capture files (*.json) or directories containing them.
    #[arg(value_name = "INPUT", required = true)]
    inputs: Vec<PathBuf>,

    /// Directory to export markdown files.
    /// Defaults to ./chat-capture-export if not set in config.
    #[arg(short = 'o', long = "out", value_name = "TARGET_DIR")]
    target_dir: Option<PathBuf>,

    /// Path to a specific configuration file.
    /// Defaults to $XDG_CONFIG_HOME/chat-capture-export/config.toml
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Comma-separated tags to add to frontmatter (e.g. "ai,chat").
    #[arg(long, value_name = "TAGS", value_delimiter = ',')]
    tags: Option<Vec<String>>,

    /// Override the document heading.
    #[arg(long)]
    title: Option<String>,

    /// Omit the front matter block.
    #[arg(long)]
    no_front_matter: bool,

    /// Omit the hidden metadata comment. Disables change detection on later runs.
    #[arg(long)]
    no_meta_comment: bool,

    /// Omit the Source/Exported lines under the heading.
    #[arg(long)]
    no_meta_row: bool,

    /// Omit the table of contents.
    #[arg(long)]
    no_toc: bool,

    /// Write a single capture to standard output instead of the target directory.
    #[arg(long)]
    stdout: bool,

    /// Overwrite existing files even if they are newer.
    #[arg(short, long)]
    force: bool,

    /// Print each file written or skipped.
    #[arg(short, long)]
    verbose: bool,

    /// Only report warnings and errors.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Deserialize, Default)]
struct FileConfig {
    target_dir: Option<PathBuf>,
    tags: Option<Vec<String>>,
    include_toc: Option<bool>,
    include_front_matter: Option<bool>,
    include_meta_comment: Option<bool>,
    include_meta_row: Option<bool>,
}

fn load_file_config(explicit_path: Option<&Path>) -> Result<FileConfig> {
    let path = if let Some(p) = explicit_path {
        if !p.exists() {
            return Err(eyre!("Config file not found: {}", p.display()));
        }
        Some(p.to_path_buf())
    } else {
        dirs::config_dir()
            .map(|d| d.join("chat-capture-export/config.toml"))
            .filter(|p| p.exists())
    };

    match path {
        None => Ok(FileConfig::default()),
        Some(p) => {
            let content = fs::read_to_string(&p)
                .wrap_err_with(|| format!("Failed to read config: {}", p.display()))?;
            toml::from_str(&content)
                .wrap_err_with(|| format!("Failed to parse config: {}", p.display()))
        }
    }
}

fn init_tracing(verbose: bool, quiet: bool) {
    let default_level = if quiet {
        "warn"
    } else if verbose {
        "debug"
    } else {
        "info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    // 1. Load config file (CLI path > default path)
    let file_cfg = load_file_config(cli.config.as_deref())?;

    // 2. Resolve target_dir (CLI > Config > Default)
    let target_dir = cli
        .target_dir
        .or(file_cfg.target_dir)
        .unwrap_or_else(|| PathBuf::from("chat-capture-export"));

    // 3. Resolve toggles (CLI flag > Config > on)
    let config = utils::ExportConfig {
        inputs: cli.inputs,
        target_dir,
        tags: cli.tags.or(file_cfg.tags),
        title: cli.title,
        include_front_matter: !cli.no_front_matter
            && file_cfg.include_front_matter.unwrap_or(true),
        include_meta_comment: !cli.no_meta_comment
            && file_cfg.include_meta_comment.unwrap_or(true),
        include_meta_row: !cli.no_meta_row && file_cfg.include_meta_row.unwrap_or(true),
        include_toc: !cli.no_toc && file_cfg.include_toc.unwrap_or(true),
        force: cli.force,
    };

    if cli.stdout {
        let [input] = config.inputs.as_slice() else {
            return Err(eyre!("--stdout takes exactly one capture file"));
        };
        let mut out = io::stdout().lock();
        return parallel::write_capture(input, &config, &mut out);
    }

    let summary = parallel::execute(config)?;
    if summary.errors > 0 {
        return Err(eyre!("{} capture(s) failed to export", summary.errors));
    }
    Ok(())
}
