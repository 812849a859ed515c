//! CLI entry point: `discover` seeds the URL table from the platform's
//! sitemaps, `scrape` runs the concurrent article pipeline over a random
//! sample of pending URLs.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mediumscrape::{ArticleStore, ScrapeConfig, discovery, pipeline};

#[derive(Parser)]
#[command(name = "mediumscrape", version, about)]
struct Cli {
    /// SQLite database path.
    #[arg(long, env = "MEDIUMSCRAPE_DB", default_value = "./mediumscrape.sqlite")]
    database: PathBuf,

    /// Enable verbose (debug) output.
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch the sitemap index and record article URLs for later scraping.
    Discover {
        /// Master sitemap index URL.
        #[arg(long, default_value = discovery::MASTER_SITEMAP_URL)]
        sitemap_url: String,

        /// Average delay between sitemap fetches, in seconds.
        #[arg(long, default_value_t = 0.5)]
        delay: f64,
    },

    /// Scrape a random sample of not-yet-crawled URLs.
    Scrape {
        /// How many pending URLs to sample this run.
        #[arg(long, default_value_t = 100)]
        count: usize,

        /// Number of concurrent workers (one browser engine each).
        #[arg(long, default_value_t = 4)]
        workers: usize,

        /// Run browsers with a visible window instead of headless.
        #[arg(long)]
        headed: bool,

        /// Directory for verification screenshots.
        #[arg(long, default_value = "./screenshots")]
        screenshot_dir: PathBuf,

        /// Skip screenshot capture entirely.
        #[arg(long)]
        no_screenshots: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "mediumscrape=debug"
    } else {
        "mediumscrape=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    match cli.command {
        Command::Discover { sitemap_url, delay } => {
            let store = ArticleStore::open(&cli.database).await?;
            discovery::run_discovery(&store, &sitemap_url, delay).await?;
            store.close().await;
        }
        Command::Scrape {
            count,
            workers,
            headed,
            screenshot_dir,
            no_screenshots,
        } => {
            let config = ScrapeConfig::builder()
                .database_path(cli.database.clone())
                .url_sample_size(count)
                .worker_count(workers)
                .headless(!headed)
                .screenshot_dir(screenshot_dir)
                .save_screenshots(!no_screenshots)
                .build()?;

            let store = ArticleStore::open(config.database_path()).await?;
            let shutdown = Arc::new(AtomicBool::new(false));
            let watcher = pipeline::spawn_signal_watcher(Arc::clone(&shutdown));

            mediumscrape::scrape(&config, &store, shutdown).await?;

            watcher.abort();
            store.close().await;
        }
    }

    Ok(())
}
