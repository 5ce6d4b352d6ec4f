//! ebook-scraper CLI - downloads a web publication as an EPUB.

use anyhow::{Context, Result};
use clap::Parser;
use ebook_scraper::config::{Config, TransportKind};
use ebook_scraper::console::Console;
use ebook_scraper::crawler::{CrawlOptions, Crawler};
use ebook_scraper::error::ScraperError;
use ebook_scraper::scrapers::ScraperRegistry;
use ebook_scraper::{Assembler, ResponseCache, build_transport, logging, output_filename};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

/// Downloads a serialized web publication as an EPUB.
#[derive(Parser, Debug)]
#[command(name = "ebook-scraper")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// URL of the publication's index page.
    url: String,

    /// Request backend: `default` or `curl`.
    #[arg(long)]
    transport: Option<TransportKind>,

    /// Config file to use instead of the platform default.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory to write the EPUB to.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Maximum concurrent requests.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    parallelism: Option<u32>,

    /// Always fetch from the network.
    #[arg(long)]
    no_cache: bool,
}

impl Args {
    /// Applies command-line overrides on top of the loaded config.
    fn apply(&self, config: &mut Config) {
        if let Some(kind) = self.transport {
            config.transport.backend = kind;
        }
        if let Some(dir) = &self.output_dir {
            config.output.directory = dir.clone();
        }
        if let Some(parallelism) = self.parallelism {
            config.crawl.parallelism = parallelism as usize;
        }
        if self.no_cache {
            config.crawl.use_cache = false;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let console = Console::new();

    if let Err(e) = logging::init() {
        console.warning(&format!("{:#}", e));
    }

    match run(&args, &console).await {
        Ok(path) => {
            console.success(&format!("Wrote {}", path.display()));
            ExitCode::SUCCESS
        }
        Err(e) => {
            console.error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args, console: &Console) -> Result<PathBuf> {
    console.section("ebook-scraper");

    console.step("Loading configuration...");
    let mut config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    // Resolve the policy before any network activity.
    let registry = ScraperRegistry::new();
    let (scraper, seed) = match registry.resolve(&args.url) {
        Ok(found) => found,
        Err(e) => {
            if matches!(e, ScraperError::UnsupportedHost(_)) {
                console.info(&format!(
                    "Supported hosts: {}",
                    registry.hosts().join(", ")
                ));
            }
            return Err(e).context("Cannot scrape this URL");
        }
    };
    console.success(&format!("Using {} scraper", scraper.name()));

    let transport = build_transport(&config.transport).context("Failed to set up transport")?;
    tracing::debug!(transport = transport.name(), "transport ready");

    let cache = config
        .crawl
        .use_cache
        .then(|| ResponseCache::new(config.crawl.cache_dir.clone()));
    let host = seed.host_str().unwrap_or_default();
    let crawler = Crawler::new(
        transport.clone(),
        cache,
        CrawlOptions::for_host(host, &config.crawl),
    )
    .context("Invalid crawl settings")?;

    console.step(&format!("Scraping {}...", seed));
    let book = scraper
        .scrape(&crawler, &seed)
        .await
        .context("Failed to scrape publication")?;
    console.success(&format!(
        "Collected {} chapters of {}",
        console.count(book.toc.len()),
        book.metadata.title
    ));

    let mut assembler = Assembler::new(
        transport,
        Duration::from_secs(config.crawl.request_timeout_sec),
    );
    if let Some(user_agent) = config.crawl.user_agents.first() {
        assembler = assembler.with_user_agent(user_agent.clone());
    }

    console.step("Assembling ebook...");
    let epub = assembler
        .assemble(&book, |p| {
            console.progress_update(&console.section_progress(p.current, p.total, p.title));
        })
        .await;
    if !book.toc.is_empty() {
        console.progress_done();
    }
    let epub = epub.context("Failed to assemble ebook")?;

    let path = config.output.directory.join(output_filename(epub.title()));
    epub.write(&path)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(path)
}
