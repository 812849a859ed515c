//! Fluent builder for [`ScrapeConfig`].
//!
//! Every knob has a default, so the builder has no required fields; `build`
//! validates ranges and returns an error instead of clamping silently.

use anyhow::{Result, bail};
use std::path::PathBuf;

use super::types::ScrapeConfig;

#[derive(Debug, Clone)]
pub struct ScrapeConfigBuilder {
    config: ScrapeConfig,
}

impl Default for ScrapeConfigBuilder {
    fn default() -> Self {
        Self {
            config: ScrapeConfig::default(),
        }
    }
}

impl ScrapeConfigBuilder {
    #[must_use]
    pub fn database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.database_path = path.into();
        self
    }

    #[must_use]
    pub fn screenshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.screenshot_dir = dir.into();
        self
    }

    #[must_use]
    pub fn save_screenshots(mut self, enabled: bool) -> Self {
        self.config.save_screenshots = enabled;
        self
    }

    #[must_use]
    pub fn worker_count(mut self, workers: usize) -> Self {
        self.config.worker_count = workers;
        self
    }

    #[must_use]
    pub fn url_sample_size(mut self, count: usize) -> Self {
        self.config.url_sample_size = count;
        self
    }

    #[must_use]
    pub fn headless(mut self, headless: bool) -> Self {
        self.config.headless = headless;
        self
    }

    #[must_use]
    pub fn page_load_timeout_secs(mut self, secs: u64) -> Self {
        self.config.page_load_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn settle_timeout_secs(mut self, secs: u64) -> Self {
        self.config.settle_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn comment_scroll_limit(mut self, limit: usize) -> Self {
        self.config.comment_scroll_limit = limit;
        self
    }

    #[must_use]
    pub fn comment_scroll_wait_ms(mut self, millis: u64) -> Self {
        self.config.comment_scroll_wait_ms = millis;
        self
    }

    #[must_use]
    pub fn queue_poll_interval_ms(mut self, millis: u64) -> Self {
        self.config.queue_poll_interval_ms = millis;
        self
    }

    #[must_use]
    pub fn join_timeout_secs(mut self, secs: u64) -> Self {
        self.config.join_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn monitor_interval_secs(mut self, secs: u64) -> Self {
        self.config.monitor_interval_secs = secs;
        self
    }

    /// Validate and produce the final configuration.
    pub fn build(self) -> Result<ScrapeConfig> {
        let config = self.config;
        if config.worker_count == 0 {
            bail!("worker_count must be at least 1");
        }
        if config.url_sample_size == 0 {
            bail!("url_sample_size must be at least 1");
        }
        if config.page_load_timeout_secs == 0 {
            bail!("page_load_timeout_secs must be non-zero");
        }
        if config.queue_poll_interval_ms == 0 {
            bail!("queue_poll_interval_ms must be non-zero");
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build() {
        let config = ScrapeConfig::builder().build().expect("defaults are valid");
        assert_eq!(config.worker_count(), 4);
        assert_eq!(config.url_sample_size(), 100);
        assert!(config.headless());
    }

    #[test]
    fn zero_workers_rejected() {
        assert!(ScrapeConfig::builder().worker_count(0).build().is_err());
    }

    #[test]
    fn zero_sample_rejected() {
        assert!(ScrapeConfig::builder().url_sample_size(0).build().is_err());
    }
}
