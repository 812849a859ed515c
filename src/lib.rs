pub mod browser_setup;
pub mod config;
pub mod discovery;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod session;
pub mod stealth;
pub mod store;

pub use browser_setup::{find_browser_executable, launch_browser};
pub use config::{ScrapeConfig, ScrapeConfigBuilder};
pub use discovery::{DiscoverySummary, MASTER_SITEMAP_URL, run_discovery};
pub use error::{ScrapeError, ScrapeResult};
pub use extract::{AccessTier, ArticleRecord, CommentRecord, ExtractOptions, extract_article};
pub use pipeline::{
    BrowserSessionFactory, RunSummary, SessionFactory, WorkerSession, spawn_signal_watcher,
};
pub use session::{PageSession, SessionDriver};
pub use store::{ArticleStore, CrawlState, PendingUrl, SitemapEntry};

/// Run the scraping pipeline with browser-backed workers.
///
/// Convenience wrapper wiring the production [`BrowserSessionFactory`] into
/// [`pipeline::run`]; the cancellation flag is shared with the caller so a
/// signal watcher can request a graceful stop.
pub async fn scrape(
    config: &ScrapeConfig,
    store: &ArticleStore,
    shutdown: std::sync::Arc<std::sync::atomic::AtomicBool>,
) -> anyhow::Result<RunSummary> {
    let factory = BrowserSessionFactory::new(config.clone(), store.clone());
    pipeline::run(config, store, factory, shutdown).await
}
