//! Core configuration type for scraping runs.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for one scraping run.
///
/// Fields are private; use [`ScrapeConfig::builder`] to construct and the
/// accessor methods to read. All durations have conservative defaults tuned
/// for a slow, JS-heavy target site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeConfig {
    /// SQLite database holding URL, article and comment rows.
    pub(crate) database_path: PathBuf,
    /// Directory for per-URL verification screenshots.
    pub(crate) screenshot_dir: PathBuf,
    pub(crate) save_screenshots: bool,
    /// Number of concurrent workers, each with a private browser engine.
    pub(crate) worker_count: usize,
    /// How many pending URLs to sample per run.
    pub(crate) url_sample_size: usize,
    pub(crate) headless: bool,
    /// Hard timeout for `page.goto()`.
    pub(crate) page_load_timeout_secs: u64,
    /// Bound for the post-navigation readyState settle wait.
    pub(crate) settle_timeout_secs: u64,
    /// Upper bound on comment-panel scroll iterations.
    pub(crate) comment_scroll_limit: usize,
    /// Wait between comment-panel scrolls, letting lazy content load.
    pub(crate) comment_scroll_wait_ms: u64,
    /// Queue poll interval for idle workers.
    pub(crate) queue_poll_interval_ms: u64,
    /// Bound on waiting for each worker to exit at shutdown.
    pub(crate) join_timeout_secs: u64,
    /// Throughput monitor reporting interval.
    pub(crate) monitor_interval_secs: u64,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("./mediumscrape.sqlite"),
            screenshot_dir: PathBuf::from("./screenshots"),
            save_screenshots: true,
            worker_count: 4,
            url_sample_size: 100,
            headless: true,
            page_load_timeout_secs: 30,
            settle_timeout_secs: 10,
            comment_scroll_limit: 100,
            comment_scroll_wait_ms: 1000,
            queue_poll_interval_ms: 250,
            join_timeout_secs: 30,
            monitor_interval_secs: 60,
        }
    }
}

impl ScrapeConfig {
    #[must_use]
    pub fn builder() -> super::ScrapeConfigBuilder {
        super::ScrapeConfigBuilder::default()
    }

    #[must_use]
    pub fn database_path(&self) -> &PathBuf {
        &self.database_path
    }

    #[must_use]
    pub fn screenshot_dir(&self) -> &PathBuf {
        &self.screenshot_dir
    }

    #[must_use]
    pub fn save_screenshots(&self) -> bool {
        self.save_screenshots
    }

    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    #[must_use]
    pub fn url_sample_size(&self) -> usize {
        self.url_sample_size
    }

    #[must_use]
    pub fn headless(&self) -> bool {
        self.headless
    }

    #[must_use]
    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_secs(self.page_load_timeout_secs)
    }

    #[must_use]
    pub fn settle_timeout(&self) -> Duration {
        Duration::from_secs(self.settle_timeout_secs)
    }

    #[must_use]
    pub fn comment_scroll_limit(&self) -> usize {
        self.comment_scroll_limit
    }

    #[must_use]
    pub fn comment_scroll_wait(&self) -> Duration {
        Duration::from_millis(self.comment_scroll_wait_ms)
    }

    #[must_use]
    pub fn queue_poll_interval(&self) -> Duration {
        Duration::from_millis(self.queue_poll_interval_ms)
    }

    #[must_use]
    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs)
    }

    #[must_use]
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }
}
