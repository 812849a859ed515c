//! Error taxonomy for the scraping pipeline.
//!
//! Every per-task failure is one of these variants; nothing here is fatal to
//! a worker. The worker task boundary converts any of them into a `Failed`
//! crawl status for the URL and moves on.

use thiserror::Error;

/// Errors that can occur while processing a single pending URL.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Page navigation failed: timeout, network error, or target crash.
    #[error("navigation failed for {url}: {reason}")]
    Navigation { url: String, reason: String },

    /// Structural failure while extracting required fields from a loaded page.
    /// Missing optional elements are NOT errors and never produce this.
    #[error("extraction failed for {url}: {reason}")]
    Extraction { url: String, reason: String },

    /// The persistence gateway rolled back the unit of work for this URL.
    #[error("persistence rejected article for {url}")]
    Persistence { url: String },

    /// Browser engine failure outside navigation (context creation, CDP I/O).
    #[error("browser error: {0}")]
    Browser(String),
}

impl ScrapeError {
    pub fn navigation(url: impl Into<String>, err: &anyhow::Error) -> Self {
        // {:#} keeps the full context chain in one line
        Self::Navigation {
            url: url.into(),
            reason: format!("{err:#}"),
        }
    }

    pub fn extraction(url: impl Into<String>, err: &anyhow::Error) -> Self {
        Self::Extraction {
            url: url.into(),
            reason: format!("{err:#}"),
        }
    }
}

/// Convenience alias used throughout the pipeline.
pub type ScrapeResult<T> = Result<T, ScrapeError>;
