//! Readingroom-Harvest main entry point
//!
//! This is the command-line interface for crawling the reading room search
//! index, checking crawl progress and downloading the documents found.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use readingroom_harvest::config::{load_or_default, validate_crawl_config, Config, CrawlConfig};
use readingroom_harvest::crawler::{
    prepare_crawl, shutdown_channel, CookieJar, CrawlReport, HttpTransport, LiveOrchestrator,
    Shutdown,
};
use readingroom_harvest::credentials::{CredentialSource, EnvCredentials};
use readingroom_harvest::download::{DownloadReport, DownloadSettings, Downloader};
use readingroom_harvest::output::{checkpoint_statistics, print_statistics, read_items};
use readingroom_harvest::storage::{open_store_read_only, CheckpointStore};
use readingroom_harvest::url::{output_stem, SearchTarget};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Stopped early or failed after starting
const EXIT_STOPPED: u8 = 1;

/// Bad arguments, profile, credentials or checkpoint
const EXIT_INPUT: u8 = 2;

/// Readingroom-Harvest: a resumable crawler for a bot-protected search index
///
/// Pages through search results one at a time, commits every page to a
/// checkpoint, and resumes where it left off on the next run.
#[derive(Parser, Debug)]
#[command(name = "readingroom-harvest")]
#[command(version = "1.0.0")]
#[command(about = "Resumable reading room search crawler", long_about = None)]
struct Cli {
    /// Path to a TOML site profile (built-in defaults when omitted)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl the search results for a term
    Search(SearchArgs),

    /// Download the PDFs listed in a crawl's item list
    Download(DownloadArgs),

    /// Show stored progress for a term without crawling
    Status(StatusArgs),
}

#[derive(Args, Debug)]
struct SearchArgs {
    /// Search phrase (words are joined with spaces)
    #[arg(required = true, value_name = "TERM")]
    term: Vec<String>,

    /// Directory for the checkpoint, item list and diagnostics
    #[arg(short, long, default_value = "output")]
    output_dir: PathBuf,

    /// Seconds to wait between pages
    #[arg(long, default_value_t = 90)]
    delay: u64,

    /// Seconds to wait after a rate-limited or timed-out request
    #[arg(long, default_value_t = 120)]
    unavailable_wait: u64,

    /// Attempts per page before giving up
    #[arg(long, default_value_t = 10)]
    max_retries: u32,

    /// Maximum number of pages to walk this run
    #[arg(long)]
    max_pages: Option<u32>,

    /// Start at this page instead of resuming
    #[arg(long)]
    start_page: Option<u32>,

    /// Discard stored progress and start over
    #[arg(long)]
    reset: bool,
}

impl SearchArgs {
    fn crawl_config(&self) -> CrawlConfig {
        CrawlConfig {
            output_dir: self.output_dir.clone(),
            delay: Duration::from_secs(self.delay),
            unavailable_wait: Duration::from_secs(self.unavailable_wait),
            max_retries: self.max_retries,
            max_pages: self.max_pages,
            start_page: self.start_page,
            reset: self.reset,
        }
    }
}

#[derive(Args, Debug)]
struct DownloadArgs {
    /// JSON Lines item list written by `search`
    #[arg(value_name = "JSONL")]
    input: PathBuf,

    /// Directory receiving the PDFs and manifest.jsonl
    #[arg(long, default_value = "pdfs")]
    pdf_dir: PathBuf,

    /// Seconds to wait between documents
    #[arg(long, default_value_t = 5)]
    delay: u64,

    /// Download again even if the file exists
    #[arg(long)]
    overwrite: bool,
}

#[derive(Args, Debug)]
struct StatusArgs {
    /// Search phrase (words are joined with spaces)
    #[arg(required = true, value_name = "TERM")]
    term: Vec<String>,

    /// Directory holding the checkpoint
    #[arg(short, long, default_value = "output")]
    output_dir: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let config = match load_profile(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{:#}", e);
            return ExitCode::from(EXIT_INPUT);
        }
    };

    match cli.command {
        Command::Search(args) => handle_search(&config, args).await,
        Command::Download(args) => handle_download(&config, args).await,
        Command::Status(args) => handle_status(&config, args),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// `RUST_LOG` takes precedence when no verbosity flag is given.
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("readingroom_harvest=info,warn")),
            1 => EnvFilter::new("readingroom_harvest=debug,info"),
            2 => EnvFilter::new("readingroom_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn load_profile(path: Option<&Path>) -> anyhow::Result<Config> {
    let (config, hash) = load_or_default(path).with_context(|| match path {
        Some(p) => format!("failed to load profile {}", p.display()),
        None => "built-in profile is invalid".to_string(),
    })?;

    match (path, hash) {
        (Some(p), Some(hash)) => {
            tracing::info!("Profile loaded from {} (hash: {})", p.display(), hash)
        }
        _ => tracing::debug!("Using built-in profile"),
    }
    Ok(config)
}

/// Flips the shutdown flag on the first Ctrl-C; a second one exits at once
fn install_interrupt_handler() -> Shutdown {
    let (trigger, shutdown) = shutdown_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        tracing::warn!("Interrupt received, stopping at the next pause (Ctrl-C again to abort)");
        trigger.trigger();

        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });
    shutdown
}

fn load_cookies(config: &Config) -> anyhow::Result<CookieJar> {
    let cookies = EnvCredentials::new(config.credentials.clone())
        .load_cookies()
        .context("refusing to run without session cookies")?;
    let jar = CookieJar::with_cookies(&config.site.base_url, &cookies)?;
    Ok(jar)
}

/// Handles `search`: runs the crawl and maps its stop reason to an exit code
async fn handle_search(config: &Config, args: SearchArgs) -> ExitCode {
    let term = args.term.join(" ");
    let settings = args.crawl_config();

    let mut orchestrator = match start_search(config, &term, settings) {
        Ok(o) => o,
        Err(e) => {
            tracing::error!("{:#}", e);
            return ExitCode::from(EXIT_INPUT);
        }
    };

    match orchestrator.run().await {
        Ok(report) => {
            let jsonl = args
                .output_dir
                .join(format!("{}.jsonl", output_stem(&term)));
            print_crawl_report(&report, &jsonl);

            if report.stop.is_natural_end() {
                tracing::info!("Crawl finished: {}", report.stop);
                ExitCode::SUCCESS
            } else {
                tracing::error!("Crawl stopped: {}", report.stop);
                ExitCode::from(EXIT_STOPPED)
            }
        }
        Err(e) => {
            tracing::error!("Crawl aborted: {}", e);
            ExitCode::from(EXIT_STOPPED)
        }
    }
}

fn start_search(
    config: &Config,
    term: &str,
    settings: CrawlConfig,
) -> anyhow::Result<LiveOrchestrator> {
    validate_crawl_config(&settings).context("invalid crawl arguments")?;

    let credentials = EnvCredentials::new(config.credentials.clone());
    let orchestrator = prepare_crawl(term, config, settings, &credentials, install_interrupt_handler())
        .with_context(|| format!("cannot start crawl for '{}'", term))?;
    Ok(orchestrator)
}

fn print_crawl_report(report: &CrawlReport, jsonl: &Path) {
    println!();
    println!("=== Crawl Summary ===");
    println!("  Stopped: {}", report.stop);
    println!("  Pages committed this run: {}", report.pages_committed);
    println!("  New documents: {}", report.new_items);
    println!("  Total documents: {}", report.total_items);
    println!("  Next run starts at page: {}", report.next_page);
    println!("  Item list: {}", jsonl.display());
}

/// Handles `download`: fetches PDFs for every record in the item list
async fn handle_download(config: &Config, args: DownloadArgs) -> ExitCode {
    let (items, mut downloader) = match start_download(config, &args) {
        Ok(prepared) => prepared,
        Err(e) => {
            tracing::error!("{:#}", e);
            return ExitCode::from(EXIT_INPUT);
        }
    };

    tracing::info!(
        "Downloading {} documents into {}",
        items.len(),
        args.pdf_dir.display()
    );

    match downloader.run(&items).await {
        Ok(report) => {
            print_download_report(&report, &downloader.manifest_path());
            match report.stop {
                None => ExitCode::SUCCESS,
                Some(stop) => {
                    tracing::error!("Download stopped: {}", stop);
                    ExitCode::from(EXIT_STOPPED)
                }
            }
        }
        Err(e) => {
            tracing::error!("Download aborted: {}", e);
            ExitCode::from(EXIT_STOPPED)
        }
    }
}

fn start_download(
    config: &Config,
    args: &DownloadArgs,
) -> anyhow::Result<(
    Vec<readingroom_harvest::DocumentRecord>,
    Downloader<HttpTransport>,
)> {
    let items = read_items(&args.input)
        .with_context(|| format!("cannot read item list {}", args.input.display()))?;

    let transport = HttpTransport::new(&config.http, load_cookies(config)?)
        .context("cannot build HTTP client")?;
    let settings = DownloadSettings {
        pdf_dir: args.pdf_dir.clone(),
        delay: Duration::from_secs(args.delay),
        overwrite: args.overwrite,
    };
    let downloader = Downloader::new(config, settings, transport, install_interrupt_handler())?;
    Ok((items, downloader))
}

fn print_download_report(report: &DownloadReport, manifest: &Path) {
    println!();
    println!("=== Download Summary ===");
    println!("  Documents: {}", report.total);
    println!("  Downloaded: {}", report.downloaded);
    println!("  Already present: {}", report.skipped);
    println!("  Failed: {}", report.failed);
    println!("  Manifest: {}", manifest.display());
}

/// Handles `status`: prints checkpoint statistics without network access
fn handle_status(config: &Config, args: StatusArgs) -> ExitCode {
    let term = args.term.join(" ");
    match show_status(config, &term, args.output_dir) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::from(EXIT_INPUT)
        }
    }
}

fn show_status(config: &Config, term: &str, output_dir: PathBuf) -> anyhow::Result<()> {
    let target = SearchTarget::new(term, &config.site)?;
    let settings = CrawlConfig {
        output_dir,
        ..CrawlConfig::default()
    };
    let store =
        open_store_read_only(config, &settings).context("cannot open checkpoint store")?;

    match store.load(target.term())? {
        Some(checkpoint) => {
            let stats = checkpoint_statistics(&checkpoint);
            print_statistics(&stats, &store.location(target.term()));
        }
        None => println!(
            "No progress recorded for '{}' at {}",
            target.term(),
            store.location(target.term())
        ),
    }
    Ok(())
}
