//! Per-worker browser session driver.
//!
//! One `SessionDriver` per worker owns one Chromium engine process for the
//! worker's whole lifetime. Each URL gets a throwaway browsing context
//! (cookies/storage isolated from every other task) that is disposed on
//! every exit path; only the engine itself is reused between tasks.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use chromiumoxide::Page;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, CaptureScreenshotParams,
};
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams,
};
use rand::Rng;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::browser_setup;
use crate::config::ScrapeConfig;
use crate::error::{ScrapeError, ScrapeResult};
use crate::stealth;

/// A loaded page inside its own throwaway browsing context.
///
/// Must be handed back to [`SessionDriver::close_session`]; the context is
/// not reusable and holds the task's cookies/storage until disposed.
pub struct PageSession {
    pub page: Page,
    context_id: BrowserContextId,
}

/// Owns one browser engine for the lifetime of one worker.
pub struct SessionDriver {
    worker_idx: usize,
    browser: Browser,
    handler: JoinHandle<()>,
    // Holds the engine's private profile dir; removed on drop.
    _profile_dir: TempDir,
    page_load_timeout: Duration,
    settle_timeout: Duration,
}

impl SessionDriver {
    /// Launch a private engine for this worker.
    pub async fn launch(worker_idx: usize, config: &ScrapeConfig) -> Result<Self> {
        let profile_dir = tempfile::Builder::new()
            .prefix(&format!("mediumscrape_worker{worker_idx}_"))
            .tempdir()
            .context("Failed to create worker profile directory")?;

        let (browser, handler) =
            browser_setup::launch_browser(config.headless(), profile_dir.path()).await?;

        info!(worker = worker_idx, "Browser engine launched");

        Ok(Self {
            worker_idx,
            browser,
            handler,
            _profile_dir: profile_dir,
            page_load_timeout: config.page_load_timeout(),
            settle_timeout: config.settle_timeout(),
        })
    }

    #[must_use]
    pub fn worker_idx(&self) -> usize {
        self.worker_idx
    }

    /// Open a URL in a fresh isolated context: create context + page, apply
    /// the stealth profile, navigate with bounded timeouts, settle, and
    /// perform one small human-like scroll.
    ///
    /// On any failure the context is disposed before the error is returned.
    pub async fn open(&mut self, url: &str) -> ScrapeResult<PageSession> {
        let context_id = self
            .browser
            .create_browser_context(CreateBrowserContextParams::default())
            .await
            .map_err(|e| ScrapeError::Browser(format!("context creation failed: {e}")))?;

        let target = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context_id.clone())
            .build()
            .map_err(ScrapeError::Browser)?;

        let page = match self.browser.new_page(target).await {
            Ok(page) => page,
            Err(e) => {
                self.dispose_context(context_id).await;
                return Err(ScrapeError::Browser(format!("page creation failed: {e}")));
            }
        };

        let session = PageSession { page, context_id };

        if let Err(e) = self.navigate(&session.page, url).await {
            let err = ScrapeError::navigation(url, &e);
            self.close_session(session).await;
            return Err(err);
        }

        Ok(session)
    }

    async fn navigate(&self, page: &Page, url: &str) -> Result<()> {
        // Best-effort: a failed mask degrades detection resistance but the
        // navigation itself can still succeed.
        if let Err(e) = stealth::prepare_page(page, stealth::random_profile()).await {
            warn!("Failed to apply stealth profile: {e:#}");
        }

        with_page_timeout(
            async { page.goto(url).await.map_err(|e| anyhow!("{e}")) },
            self.page_load_timeout,
            "Page navigation",
        )
        .await?;

        with_page_timeout(
            async { page.wait_for_navigation().await.map_err(|e| anyhow!("{e}")) },
            self.page_load_timeout,
            "Page load",
        )
        .await?;

        wait_for_settle(page, self.settle_timeout).await;
        human_scroll(page).await;

        Ok(())
    }

    /// Capture a full-page verification screenshot named by worker index and
    /// timestamp.
    pub async fn capture_screenshot(
        &self,
        session: &PageSession,
        dir: &Path,
    ) -> Result<PathBuf> {
        tokio::fs::create_dir_all(dir)
            .await
            .context("Failed to create screenshot directory")?;

        let filename = format!(
            "{}_{}.png",
            self.worker_idx,
            chrono::Local::now().format("%Y%m%d%H%M%S")
        );
        let path = dir.join(filename);

        let params = CaptureScreenshotParams {
            format: Some(CaptureScreenshotFormat::Png),
            capture_beyond_viewport: Some(true),
            ..Default::default()
        };

        let data = session
            .page
            .screenshot(params)
            .await
            .map_err(|e| anyhow!("Failed to capture screenshot: {e}"))?;

        tokio::fs::write(&path, data)
            .await
            .with_context(|| format!("Failed to write screenshot to {}", path.display()))?;

        debug!("Screenshot saved to {}", path.display());
        Ok(path)
    }

    /// Release the task's page and context. Unconditional: called on success
    /// and failure paths alike.
    pub async fn close_session(&mut self, session: PageSession) {
        let PageSession { page, context_id } = session;
        if let Err(e) = page.close().await {
            debug!("Page close failed: {e}");
        }
        self.dispose_context(context_id).await;
    }

    async fn dispose_context(&mut self, context_id: BrowserContextId) {
        if let Err(e) = self.browser.dispose_browser_context(context_id).await {
            warn!(
                worker = self.worker_idx,
                "Failed to dispose browsing context: {e}"
            );
        }
    }

    /// Shut the engine down. Called once, at the end of the worker's loop.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!(worker = self.worker_idx, "Browser close failed: {e}");
        }
        if let Err(e) = self.browser.wait().await {
            warn!(worker = self.worker_idx, "Browser wait failed: {e}");
        }
        self.handler.abort();
        debug!(worker = self.worker_idx, "Browser engine released");
    }
}

/// Wrap a page operation with an explicit timeout so slow targets cannot
/// hang a worker indefinitely.
async fn with_page_timeout<F, T>(operation: F, timeout: Duration, name: &str) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, operation).await {
        Ok(result) => result,
        Err(_) => Err(anyhow!("{name} timed out after {}s", timeout.as_secs())),
    }
}

/// Poll until the document settles (readyState complete and a body exists),
/// bounded by `max_wait`. `wait_for_navigation` only covers the HTTP
/// response; JS-rendered content needs this extra wait.
async fn wait_for_settle(page: &Page, max_wait: Duration) {
    const SETTLE_SCRIPT: &str = r"
        (() => ({
            readyState: document.readyState,
            bodyExists: document.body !== null
        }))()
    ";

    let start = Instant::now();
    let poll = Duration::from_millis(100);

    while start.elapsed() < max_wait {
        if let Ok(result) = page.evaluate(SETTLE_SCRIPT).await
            && let Some(value) = result.value()
        {
            let ready = value.get("readyState").and_then(|v| v.as_str()) == Some("complete");
            let body = value
                .get("bodyExists")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false);
            if ready && body {
                // small buffer for final rendering
                tokio::time::sleep(Duration::from_millis(200)).await;
                return;
            }
        }
        tokio::time::sleep(poll).await;
    }
    debug!("Timed out waiting for page to settle, proceeding anyway");
}

/// One small randomized scroll, simulating a human reader arriving.
async fn human_scroll(page: &Page) {
    let (delta, pause_ms) = {
        let mut rng = rand::rng();
        (
            rng.random_range(100..=300),
            rng.random_range(300..=800u64),
        )
    };
    let script = format!("window.scrollBy(0, {delta})");
    if let Err(e) = page.evaluate(script.as_str()).await {
        debug!("Arrival scroll failed: {e}");
    }
    tokio::time::sleep(Duration::from_millis(pause_ms)).await;
}
