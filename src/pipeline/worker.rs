//! Worker loop and the per-task processing boundary.
//!
//! The `SessionFactory`/`WorkerSession` seam exists so the pool's behavior
//! (sentinels, cancellation, error isolation, status writes) can be tested
//! with scripted sessions instead of real browsers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use super::{Task, TaskQueue};
use crate::config::ScrapeConfig;
use crate::error::{ScrapeError, ScrapeResult};
use crate::extract::{self, ExtractOptions};
use crate::session::{PageSession, SessionDriver};
use crate::store::{ArticleStore, PendingUrl};

/// One worker's session state, living for the worker's whole loop.
#[async_trait]
pub trait WorkerSession: Send {
    /// Process one pending URL end to end. `Ok` means the article was
    /// extracted and committed; any `Err` marks the URL Failed.
    async fn handle(&mut self, task: &PendingUrl) -> ScrapeResult<()>;

    /// Release session resources. Called once when the worker exits.
    async fn close(self);
}

/// Creates one [`WorkerSession`] per worker at pool startup.
#[async_trait]
pub trait SessionFactory: Send + Sync + 'static {
    type Session: WorkerSession + 'static;

    async fn create(&self, worker_idx: usize) -> anyhow::Result<Self::Session>;
}

/// The worker loop: dequeue until a stop sentinel or cancellation, with a
/// per-task boundary that always ends in a status write.
pub(crate) async fn worker_loop<F: SessionFactory>(
    worker_idx: usize,
    factory: Arc<F>,
    queue: TaskQueue,
    store: ArticleStore,
    shutdown: Arc<AtomicBool>,
    completed: Arc<AtomicUsize>,
    poll_interval: Duration,
) {
    // The only worker-fatal condition: no session (browser engine) at all.
    let mut session = match factory.create(worker_idx).await {
        Ok(session) => session,
        Err(e) => {
            error!(
                worker = worker_idx,
                "Cannot start worker session, worker exiting: {e:#}"
            );
            return;
        }
    };

    loop {
        if shutdown.load(Ordering::SeqCst) {
            debug!(worker = worker_idx, "Cancellation observed, exiting loop");
            break;
        }

        let task = { queue.lock().await.pop_front() };
        let Some(task) = task else {
            // Queue momentarily empty; short poll keeps idle workers
            // responsive to cancellation.
            tokio::time::sleep(poll_interval).await;
            continue;
        };

        match task {
            Task::Stop => {
                debug!(worker = worker_idx, "Stop sentinel received");
                break;
            }
            Task::Url(pending) => {
                let success = match session.handle(&pending).await {
                    Ok(()) => {
                        completed.fetch_add(1, Ordering::SeqCst);
                        info!(worker = worker_idx, "Processed {}", pending.url);
                        true
                    }
                    Err(e) => {
                        warn!(worker = worker_idx, "Error on {}: {e}", pending.url);
                        false
                    }
                };

                // Always record an outcome so the URL never stays
                // ambiguously in-progress after the attempt.
                if let Err(e) = store.mark_crawled(pending.id, success).await {
                    error!(
                        worker = worker_idx,
                        "Status write failed for {}: {e:#}", pending.url
                    );
                }
            }
        }
    }

    session.close().await;
    debug!(worker = worker_idx, "Worker exited");
}

/// Production factory: one private browser engine per worker.
pub struct BrowserSessionFactory {
    config: ScrapeConfig,
    store: ArticleStore,
}

impl BrowserSessionFactory {
    #[must_use]
    pub fn new(config: ScrapeConfig, store: ArticleStore) -> Self {
        Self { config, store }
    }
}

#[async_trait]
impl SessionFactory for BrowserSessionFactory {
    type Session = BrowserWorker;

    async fn create(&self, worker_idx: usize) -> anyhow::Result<BrowserWorker> {
        let driver = SessionDriver::launch(worker_idx, &self.config).await?;
        Ok(BrowserWorker {
            extract_opts: ExtractOptions {
                comment_scroll_limit: self.config.comment_scroll_limit(),
                comment_scroll_wait: self.config.comment_scroll_wait(),
            },
            driver,
            store: self.store.clone(),
            config: self.config.clone(),
        })
    }
}

/// Browser-backed worker session: navigate, extract, persist, screenshot.
pub struct BrowserWorker {
    driver: SessionDriver,
    store: ArticleStore,
    config: ScrapeConfig,
    extract_opts: ExtractOptions,
}

#[async_trait]
impl WorkerSession for BrowserWorker {
    async fn handle(&mut self, task: &PendingUrl) -> ScrapeResult<()> {
        let session = self.driver.open(&task.url).await?;

        let result = self.process(&session, task).await;

        if result.is_ok() && self.config.save_screenshots() {
            if let Err(e) = self
                .driver
                .capture_screenshot(&session, self.config.screenshot_dir())
                .await
            {
                warn!("Screenshot failed for {}: {e:#}", task.url);
            }
        }

        // Context released on every path before the engine takes new work.
        self.driver.close_session(session).await;
        result
    }

    async fn close(self) {
        self.driver.shutdown().await;
    }
}

impl BrowserWorker {
    async fn process(&self, session: &PageSession, task: &PendingUrl) -> ScrapeResult<()> {
        let record = extract::extract_article(&session.page, &self.extract_opts)
            .await
            .map_err(|e| ScrapeError::extraction(&task.url, &e))?;

        let title: String = record
            .title
            .as_deref()
            .unwrap_or("Unknown title")
            .chars()
            .take(50)
            .collect();
        info!(
            "Article '{title}' has {} responses ({})",
            record.comment_count(),
            record.access_tier.as_str()
        );

        if !self.store.persist_article(task.id, &record).await {
            return Err(ScrapeError::Persistence {
                url: task.url.clone(),
            });
        }
        Ok(())
    }
}
