//! kura - library scanner and filename parser for comic and manga servers.
//!
//! Usage:
//!   kura parse <PATH>...     Show what file names parse into
//!   kura scan <ROOT>...      Group a folder tree into series (dry run)
//!   kura sync                Scan configured libraries into a state file
//!   kura --help              Show help

mod inspect;
mod store;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result, bail, eyre};
use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use kura_core::{
    KuraConfig, LibraryConfig, LibraryType, MangaFormat, ParsedInfo, ParserSettings, ScanIssue,
};
use kura_parse::FilenameParser;
use kura_reconcile::{LibraryScanJob, LibraryScanReport};
use kura_scan::{LibraryScan, LibraryScanLocks, ScanOrchestrator, ScannedSeries};

use crate::inspect::{ComicInfoSource, ZipInspector};
use crate::store::JsonStore;

#[derive(Parser)]
#[command(
    name = "kura",
    version,
    about = "Library scanner and filename parser for comic and manga servers",
    long_about = "kura turns folders of comics, manga and books into series, volumes and \
                  chapters.\n\n\
                  Use `kura parse` to check how names are read, `kura scan` to preview \
                  grouping, and `kura sync` to keep a state file in step with disk."
)]
struct Cli {
    /// More log output (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse file names and print the result
    Parse {
        /// Files to parse (they need not exist)
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Library type whose rules apply
        #[arg(short = 't', long = "type", default_value = "manga")]
        library_type: LibraryKind,

        /// Library root (defaults to two levels above each file)
        #[arg(short, long)]
        root: Option<PathBuf>,

        /// Report names that several rules could read differently
        #[arg(long)]
        explain: bool,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Walk roots and show the series they group into
    Scan {
        /// Library roots
        #[arg(required = true)]
        roots: Vec<PathBuf>,

        /// Library type whose rules apply
        #[arg(short = 't', long = "type", default_value = "manga")]
        library_type: LibraryKind,

        /// Glob patterns to exclude (repeatable)
        #[arg(short = 'x', long = "exclude")]
        exclude: Vec<String>,

        /// Read ComicInfo.xml from zip archives
        #[arg(long)]
        comic_info: bool,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Scan configured libraries and reconcile them into a state file
    Sync {
        /// Configuration file (defaults to the user config directory)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// State file (defaults to state.json beside the config)
        #[arg(short, long)]
        state: Option<PathBuf>,

        /// Only this library
        #[arg(short, long)]
        library: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LibraryKind {
    Manga,
    Comic,
    Book,
    Image,
}

impl From<LibraryKind> for LibraryType {
    fn from(kind: LibraryKind) -> Self {
        match kind {
            LibraryKind::Manga => Self::Manga,
            LibraryKind::Comic => Self::Comic,
            LibraryKind::Book => Self::Book,
            LibraryKind::Image => Self::Image,
        }
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Parse {
            paths,
            library_type,
            root,
            explain,
            format,
        } => run_parse(&paths, library_type.into(), root.as_deref(), explain, format),
        Command::Scan {
            roots,
            library_type,
            exclude,
            comic_info,
            format,
        } => run_scan(roots, library_type.into(), exclude, comic_info, format),
        Command::Sync {
            config,
            state,
            library,
            format,
        } => run_sync(config, state, library.as_deref(), format),
    }
}

/// Log to stderr; RUST_LOG wins over `-v`.
fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[derive(Serialize)]
struct ParseRecord {
    info: ParsedInfo,
    issues: Vec<ScanIssue>,
}

/// Parse file names without touching the disk.
fn run_parse(
    paths: &[PathBuf],
    library_type: LibraryType,
    root: Option<&Path>,
    explain: bool,
    format: OutputFormat,
) -> Result<()> {
    let parser = FilenameParser::new(ParserSettings::default()).with_ambiguity_checks(explain);

    let records: Vec<ParseRecord> = paths
        .iter()
        .map(|path| {
            let root = root
                .map(Path::to_path_buf)
                .or_else(|| path.ancestors().nth(2).map(Path::to_path_buf))
                .unwrap_or_default();
            let outcome = parser.parse_with_diagnostics(path, &root, library_type);
            ParseRecord {
                info: outcome.info,
                issues: outcome.issues,
            }
        })
        .collect();

    match format {
        OutputFormat::Text => {
            for record in &records {
                let info = &record.info;
                println!("{}", info.full_path.display());
                println!("  series    {}", info.series);
                if let Some(localized) = &info.localized_series {
                    println!("  localized {localized}");
                }
                println!("  volumes   {}", info.volumes);
                println!("  chapters  {}", info.chapters);
                if !info.edition.is_empty() {
                    println!("  edition   {}", info.edition);
                }
                println!("  special   {}", info.is_special);
                println!("  format    {:?}", info.format);
                println!("  title     {}", info.title);
                for issue in &record.issues {
                    println!("  ! {} {}", issue.kind.reason_code(), issue.message);
                }
                println!();
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct ChapterView {
    range: String,
    special: bool,
    files: Vec<PathBuf>,
}

#[derive(Serialize)]
struct VolumeView {
    name: String,
    chapters: Vec<ChapterView>,
}

#[derive(Serialize)]
struct SeriesView {
    name: String,
    localized_name: Option<String>,
    aliases: Vec<String>,
    format: MangaFormat,
    folder: Option<PathBuf>,
    volumes: Vec<VolumeView>,
}

impl From<&ScannedSeries> for SeriesView {
    fn from(series: &ScannedSeries) -> Self {
        Self {
            name: series.name.clone(),
            localized_name: series.localized_name.clone(),
            aliases: series.aliases.clone(),
            format: series.format,
            folder: series.folder_path.clone(),
            volumes: series
                .volumes
                .iter()
                .map(|v| VolumeView {
                    name: v.name.clone(),
                    chapters: v
                        .chapters
                        .iter()
                        .map(|c| ChapterView {
                            range: c.range.clone(),
                            special: c.is_special,
                            files: c.files.iter().map(|f| f.info.full_path.clone()).collect(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

#[derive(Serialize)]
struct ScanView {
    series: Vec<SeriesView>,
    total_files: usize,
    files_skipped: usize,
    files_unreadable: usize,
    total_bytes: u64,
    elapsed_secs: f64,
    issues: Vec<ScanIssue>,
}

/// Walk and group without persisting anything.
fn run_scan(
    roots: Vec<PathBuf>,
    library_type: LibraryType,
    exclude: Vec<String>,
    comic_info: bool,
    format: OutputFormat,
) -> Result<()> {
    let config = LibraryConfig::builder()
        .roots(roots)
        .library_type(library_type)
        .exclude_patterns(exclude)
        .build()
        .context("Invalid library")?;

    let mut orchestrator = ScanOrchestrator::new(ParserSettings::default());
    if comic_info {
        orchestrator = orchestrator.with_metadata(Arc::new(ComicInfoSource));
    }
    eprintln!("Scanning {}...", describe_roots(&config));
    let scan = orchestrator
        .scan_libraries_for_series(&config)
        .context("Scan failed")?;

    let view = scan_view(&scan);
    match format {
        OutputFormat::Text => print_scan(&view),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&view)?),
    }
    Ok(())
}

fn scan_view(scan: &LibraryScan) -> ScanView {
    ScanView {
        series: scan.series.iter().map(SeriesView::from).collect(),
        total_files: scan.total_files,
        files_skipped: scan.files_skipped,
        files_unreadable: scan.files_unreadable,
        total_bytes: scan
            .series
            .iter()
            .flat_map(|s| s.files())
            .filter_map(|f| f.stat.map(|s| s.bytes))
            .sum(),
        elapsed_secs: scan.elapsed.as_secs_f64(),
        issues: scan.issues.clone(),
    }
}

fn print_scan(view: &ScanView) {
    println!();
    println!("{}", "─".repeat(70));
    println!(
        " {} series, {} files ({}), {} skipped, {} unreadable",
        view.series.len(),
        view.total_files,
        format_size(view.total_bytes),
        view.files_skipped,
        view.files_unreadable
    );
    println!(" Scanned in {:.2}s", view.elapsed_secs);
    println!("{}", "─".repeat(70));
    println!();

    for series in &view.series {
        let files: usize = series
            .volumes
            .iter()
            .flat_map(|v| &v.chapters)
            .map(|c| c.files.len())
            .sum();
        match &series.localized_name {
            Some(localized) => println!(" {} ({localized})", series.name),
            None => println!(" {}", series.name),
        }
        println!(
            "   {:?}, {} volume(s), {} file(s)",
            series.format,
            series.volumes.len(),
            files
        );
        for volume in &series.volumes {
            let chapters: Vec<&str> = volume.chapters.iter().map(|c| c.range.as_str()).collect();
            println!("   vol {:<8} {}", volume.name, truncate(&chapters.join(", "), 56));
        }
        println!();
    }

    print_issues(&view.issues);
}

/// Scan every selected library and reconcile it into the state file.
fn run_sync(
    config_path: Option<PathBuf>,
    state_path: Option<PathBuf>,
    library: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let config_path = config_path.unwrap_or_else(KuraConfig::default_path);
    let config = KuraConfig::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    let libraries: Vec<&LibraryConfig> = match library {
        Some(name) => vec![
            config
                .library(name)
                .ok_or_else(|| eyre!("No library named `{name}` in {}", config_path.display()))?,
        ],
        None => config.libraries.iter().collect(),
    };
    if libraries.is_empty() {
        bail!("No libraries configured in {}", config_path.display());
    }

    let state_path = state_path.unwrap_or_else(|| config_path.with_file_name("state.json"));
    let store = JsonStore::open(&state_path)
        .with_context(|| format!("Failed to open state {}", state_path.display()))?;
    let store = Arc::new(Mutex::new(store));

    let orchestrator = ScanOrchestrator::new(config.parser.clone())
        .with_metadata(Arc::new(ComicInfoSource));
    let job = LibraryScanJob::new(orchestrator, Arc::clone(&store))
        .with_inspector(Arc::new(ZipInspector))
        .with_locks(LibraryScanLocks::new())
        .with_cancellation(CancellationToken::new())
        .with_worker_threads(config.scan.worker_threads);

    let mut reports = Vec::with_capacity(libraries.len());
    for library in libraries {
        eprintln!("Syncing {} ({})...", library.name, describe_roots(library));
        let report = job
            .run(library)
            .with_context(|| format!("Library `{}` failed", library.name))?;
        reports.push((library.name.clone(), report));
    }

    store.lock().save().context("Failed to save state")?;

    match format {
        OutputFormat::Text => {
            for (name, report) in &reports {
                print_report(name, report);
            }
        }
        OutputFormat::Json => {
            let json: Vec<_> = reports
                .iter()
                .map(|(name, report)| serde_json::json!({ "library": name, "report": report }))
                .collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
    }
    Ok(())
}

fn print_report(name: &str, report: &LibraryScanReport) {
    println!();
    println!("{}", "─".repeat(70));
    println!(" {name}");
    println!("{}", "─".repeat(70));
    if report.coalesced {
        println!(" Already scanning; folded into the running scan.");
        return;
    }
    println!(
        " Files:  {} parsed, {} skipped, {} unreadable",
        report.files_parsed, report.files_skipped, report.files_unreadable
    );
    println!(
        " Series: {} added, {} updated, {} unchanged, {} removed, {} kept as tombstones, {} failed",
        report.series_added,
        report.series_updated,
        report.series_unchanged,
        report.series_removed,
        report.series_tombstoned,
        report.series_failed
    );
    if report.cancelled {
        println!(" Cancelled; {} series left for the next scan", report.series_skipped);
    }
    println!(" Finished in {:.2}s", report.elapsed.as_secs_f64());
    println!();
    print_issues(&report.issues);
}

fn print_issues(issues: &[ScanIssue]) {
    let warnings: Vec<&ScanIssue> = issues.iter().filter(|i| i.kind.is_warning()).collect();
    if warnings.is_empty() {
        return;
    }
    println!(" {} warning(s):", warnings.len());
    for issue in warnings.iter().take(20) {
        println!(
            "   [{}] {} - {}",
            issue.kind.reason_code(),
            issue.path.display(),
            issue.message
        );
    }
    if warnings.len() > 20 {
        println!("   ... and {} more", warnings.len() - 20);
    }
    println!();
}

fn describe_roots(config: &LibraryConfig) -> String {
    config
        .roots
        .iter()
        .map(|r| r.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

/// Truncate a string to max length.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len - 1).collect();
        format!("{kept}…")
    }
}
