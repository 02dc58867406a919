use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use env_logger::{Builder, Env};
use indicatif::{ProgressBar, ProgressStyle};
use photo_organizer_core::{Config, DatePreference, DateResolver, OrganizeOptions, Progress};

#[derive(Parser)]
#[command(
    name = "photo-organizer",
    version,
    about = "Sort photos and videos into YYYY/MM folders by creation date"
)]
struct Cli {
    /// Directory to organize
    source: PathBuf,

    /// Destination root for the YYYY/MM folders
    #[arg(short, long, required_unless_present = "resolve_only")]
    output: Option<PathBuf>,

    /// TOML config file (default: ./photo-organizer.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Report what would happen without touching any file
    #[arg(long)]
    dry_run: bool,

    /// Trust the filename date when it disagrees with metadata by more than a day
    #[arg(long)]
    prefer_filename_date: bool,

    /// Set each moved file's modification time to its resolved date
    #[arg(long)]
    set_mtime: bool,

    /// Keep directories left empty in the source
    #[arg(long)]
    no_cleanup: bool,

    /// Do not delete Thumbs.db, .DS_Store and similar files
    #[arg(long)]
    keep_nuisance_files: bool,

    /// Log level (error, warn, info, debug, trace); overrides config and RUST_LOG
    #[arg(long)]
    log_level: Option<String>,

    /// Only print `path<TAB>date<TAB>source` for every file, move nothing
    #[arg(long)]
    resolve_only: bool,
}

fn init_logging(cli_level: Option<&str>, config_level: &str) {
    let mut builder = match cli_level {
        Some(level) => {
            let mut b = Builder::new();
            b.parse_filters(level);
            b
        }
        None => Builder::from_env(Env::default().default_filter_or(config_level)),
    };
    builder.format_timestamp(None).init();
}

fn progress_bar() -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new(0);
    pb.set_style(ProgressStyle::default_bar().template("[{bar:40}] {pos}/{len} {msg}")?);
    Ok(pb)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let t_total = std::time::Instant::now();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    init_logging(cli.log_level.as_deref(), &config.log_level);
    log::debug!("Configuration: {:?}", config);

    let pb = progress_bar()?;
    let on_progress = |p: &Progress| {
        pb.set_length(p.total);
        pb.set_position(p.current + 1);
        pb.set_message(p.stage.clone());
    };

    if cli.resolve_only {
        let preference = if cli.prefer_filename_date {
            DatePreference::Filename
        } else {
            config.date_preference()
        };
        let resolver = DateResolver::new(preference);
        let media =
            photo_organizer_core::resolve_tree(&cli.source, None, &resolver, &on_progress)?;
        pb.finish_and_clear();
        for m in &media {
            match (&m.date, &m.source) {
                (Some(date), Some(source)) => {
                    println!("{}\t{}\t{}", m.path.display(), date, source)
                }
                _ => println!("{}\t-\t-", m.path.display()),
            }
        }
        return Ok(());
    }

    let output = cli.output.context("--output is required")?;
    let mut options = OrganizeOptions::new(cli.source, output);
    config.apply_to(&mut options);
    options.dry_run = cli.dry_run;
    if cli.prefer_filename_date {
        options.preference = DatePreference::Filename;
    }
    if cli.set_mtime {
        options.set_mtime = true;
    }
    if cli.no_cleanup {
        options.cleanup_empty_dirs = false;
    }
    if cli.keep_nuisance_files {
        options.delete_nuisance_files = false;
    }

    let result = photo_organizer_core::organize(&options, &on_progress)?;
    pb.finish_and_clear();

    eprintln!(
        "{}{} files: {} organized, {} unknown date, {} failed, {} nuisance files, \
         {} empty dirs ({:.2}s)",
        if options.dry_run { "[dry run] " } else { "" },
        result.total_files,
        result.moved,
        result.unknown,
        result.failed,
        result.nuisance_deleted,
        result.directories_removed,
        t_total.elapsed().as_secs_f64()
    );
    for warning in &result.warnings {
        eprintln!("  {}", warning);
    }

    Ok(())
}
