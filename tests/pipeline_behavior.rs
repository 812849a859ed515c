//! Worker pool behavior tests using scripted sessions instead of browsers:
//! error isolation, cancellation, sentinel shutdown, and the status-write
//! guarantees around them.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tempfile::TempDir;

use mediumscrape::{
    ArticleRecord, ArticleStore, PendingUrl, ScrapeConfig, ScrapeError, SessionFactory,
    SitemapEntry, WorkerSession, pipeline,
};

/// Scripted stand-in for a browser-backed worker session.
struct ScriptedSession {
    store: ArticleStore,
    fail_marker: Option<String>,
    task_delay: Duration,
    handled: Arc<AtomicUsize>,
    cancel_after_first: Option<Arc<AtomicBool>>,
}

#[async_trait]
impl WorkerSession for ScriptedSession {
    async fn handle(&mut self, task: &PendingUrl) -> Result<(), ScrapeError> {
        tokio::time::sleep(self.task_delay).await;

        let handled_before = self.handled.fetch_add(1, Ordering::SeqCst);
        if let Some(flag) = &self.cancel_after_first
            && handled_before == 0
        {
            // Simulates an interrupt arriving while the first item is
            // in flight: the item finishes, then the loop observes the flag.
            flag.store(true, Ordering::SeqCst);
        }

        if let Some(marker) = &self.fail_marker
            && task.url.contains(marker.as_str())
        {
            return Err(ScrapeError::Navigation {
                url: task.url.clone(),
                reason: "Page navigation timed out after 30s".to_string(),
            });
        }

        let record = ArticleRecord {
            title: Some("scripted".to_string()),
            claps: "0".to_string(),
            ..ArticleRecord::default()
        };
        if !self.store.persist_article(task.id, &record).await {
            return Err(ScrapeError::Persistence {
                url: task.url.clone(),
            });
        }
        Ok(())
    }

    async fn close(self) {}
}

struct ScriptedFactory {
    store: ArticleStore,
    fail_marker: Option<String>,
    task_delay: Duration,
    handled: Arc<AtomicUsize>,
    cancel_after_first: Option<Arc<AtomicBool>>,
    broken_workers: Vec<usize>,
}

impl ScriptedFactory {
    fn new(store: ArticleStore) -> Self {
        Self {
            store,
            fail_marker: None,
            task_delay: Duration::from_millis(10),
            handled: Arc::new(AtomicUsize::new(0)),
            cancel_after_first: None,
            broken_workers: Vec::new(),
        }
    }
}

#[async_trait]
impl SessionFactory for ScriptedFactory {
    type Session = ScriptedSession;

    async fn create(&self, worker_idx: usize) -> Result<ScriptedSession> {
        if self.broken_workers.contains(&worker_idx) {
            anyhow::bail!("browser engine refused to launch");
        }
        Ok(ScriptedSession {
            store: self.store.clone(),
            fail_marker: self.fail_marker.clone(),
            task_delay: self.task_delay,
            handled: Arc::clone(&self.handled),
            cancel_after_first: self.cancel_after_first.clone(),
        })
    }
}

async fn seeded_store(urls: &[&str]) -> Result<(TempDir, ArticleStore)> {
    let dir = TempDir::new()?;
    let store = ArticleStore::open(&dir.path().join("pipeline.sqlite")).await?;
    let sitemap_id = store.record_sitemap("https://example.com/sitemap.xml", 0).await?;
    let entries: Vec<SitemapEntry> = urls
        .iter()
        .map(|u| SitemapEntry {
            loc: (*u).to_string(),
            ..SitemapEntry::default()
        })
        .collect();
    store.insert_urls(sitemap_id, &entries).await?;
    Ok((dir, store))
}

fn test_config(workers: usize, sample: usize) -> ScrapeConfig {
    ScrapeConfig::builder()
        .worker_count(workers)
        .url_sample_size(sample)
        .queue_poll_interval_ms(20)
        .join_timeout_secs(5)
        .build()
        .expect("valid test config")
}

async fn terminal_status_counts(store: &ArticleStore, ids: &[i64]) -> Result<(usize, usize, usize)> {
    let (mut successful, mut failed, mut unset) = (0, 0, 0);
    for id in ids {
        let state = store.crawl_state(*id).await?;
        match state.crawl_status.as_deref() {
            Some("Successful") => {
                assert!(state.last_crawled.is_some(), "joint invariant violated");
                successful += 1;
            }
            Some("Failed") => {
                assert!(state.last_crawled.is_some(), "joint invariant violated");
                failed += 1;
            }
            None => {
                assert!(state.last_crawled.is_none(), "joint invariant violated");
                unset += 1;
            }
            other => panic!("unexpected crawl status {other:?}"),
        }
    }
    Ok((successful, failed, unset))
}

#[tokio::test]
async fn one_failing_task_does_not_block_the_pool() -> Result<()> {
    let urls = [
        "https://example.com/ok-1",
        "https://example.com/bad-2",
        "https://example.com/ok-3",
        "https://example.com/ok-4",
        "https://example.com/ok-5",
    ];
    let (_dir, store) = seeded_store(&urls).await?;
    let ids: Vec<i64> = store.sample_pending(10).await?.iter().map(|p| p.id).collect();

    let mut factory = ScriptedFactory::new(store.clone());
    factory.fail_marker = Some("bad".to_string());

    let config = test_config(2, 10);
    let shutdown = Arc::new(AtomicBool::new(false));
    let summary = pipeline::run(&config, &store, factory, shutdown).await?;

    assert_eq!(summary.queued, 5);
    assert_eq!(summary.completed, 4);

    let (successful, failed, unset) = terminal_status_counts(&store, &ids).await?;
    assert_eq!((successful, failed, unset), (4, 1, 0));
    assert_eq!(store.article_count().await?, 4);
    Ok(())
}

#[tokio::test]
async fn navigation_timeout_scenario_single_worker() -> Result<()> {
    // 3 pending URLs, 1 worker, one navigation exceeds the timeout:
    // final state must be 2 Successful, 1 Failed, none left unset.
    let urls = [
        "https://example.com/article-a",
        "https://example.com/slow-article",
        "https://example.com/article-b",
    ];
    let (_dir, store) = seeded_store(&urls).await?;
    let ids: Vec<i64> = store.sample_pending(10).await?.iter().map(|p| p.id).collect();

    let mut factory = ScriptedFactory::new(store.clone());
    factory.fail_marker = Some("slow".to_string());

    let config = test_config(1, 10);
    let shutdown = Arc::new(AtomicBool::new(false));
    let summary = pipeline::run(&config, &store, factory, shutdown).await?;

    assert_eq!(summary.completed, 2);
    let (successful, failed, unset) = terminal_status_counts(&store, &ids).await?;
    assert_eq!((successful, failed, unset), (2, 1, 0));
    Ok(())
}

#[tokio::test]
async fn cancellation_finishes_in_flight_item_only() -> Result<()> {
    // 5 queued tasks, 1 worker, cancellation lands while the first item is
    // in flight: exactly one URL gets a terminal status, four stay unset.
    let urls = [
        "https://example.com/one",
        "https://example.com/two",
        "https://example.com/three",
        "https://example.com/four",
        "https://example.com/five",
    ];
    let (_dir, store) = seeded_store(&urls).await?;
    let ids: Vec<i64> = store.sample_pending(10).await?.iter().map(|p| p.id).collect();

    let shutdown = Arc::new(AtomicBool::new(false));
    let mut factory = ScriptedFactory::new(store.clone());
    factory.cancel_after_first = Some(Arc::clone(&shutdown));

    let config = test_config(1, 10);
    let started = std::time::Instant::now();
    let summary = pipeline::run(&config, &store, factory, shutdown).await?;

    assert!(started.elapsed() < config.join_timeout() + Duration::from_secs(2));
    assert_eq!(summary.completed, 1);

    let (successful, failed, unset) = terminal_status_counts(&store, &ids).await?;
    assert_eq!((successful, failed, unset), (1, 0, 4));
    Ok(())
}

#[tokio::test]
async fn broken_worker_startup_leaves_siblings_working() -> Result<()> {
    let urls = [
        "https://example.com/a",
        "https://example.com/b",
        "https://example.com/c",
        "https://example.com/d",
    ];
    let (_dir, store) = seeded_store(&urls).await?;
    let ids: Vec<i64> = store.sample_pending(10).await?.iter().map(|p| p.id).collect();

    let mut factory = ScriptedFactory::new(store.clone());
    factory.broken_workers = vec![0];

    let config = test_config(2, 10);
    let shutdown = Arc::new(AtomicBool::new(false));
    let summary = pipeline::run(&config, &store, factory, shutdown).await?;

    // Worker 1 drains the whole queue despite worker 0 never starting.
    assert_eq!(summary.completed, 4);
    let (successful, _, unset) = terminal_status_counts(&store, &ids).await?;
    assert_eq!(successful, 4);
    assert_eq!(unset, 0);
    Ok(())
}

#[tokio::test]
async fn processed_urls_are_not_reselected_on_rerun() -> Result<()> {
    let urls = ["https://example.com/failing"];
    let (_dir, store) = seeded_store(&urls).await?;

    let mut factory = ScriptedFactory::new(store.clone());
    factory.fail_marker = Some("failing".to_string());
    let config = test_config(1, 10);
    let shutdown = Arc::new(AtomicBool::new(false));
    let first = pipeline::run(&config, &store, factory, Arc::clone(&shutdown)).await?;
    assert_eq!(first.queued, 1);
    assert_eq!(first.completed, 0);

    // Second run in the same dataset: the Failed URL is no longer eligible,
    // so nothing is queued and no duplicate article can ever accumulate.
    let factory = ScriptedFactory::new(store.clone());
    let second = pipeline::run(&config, &store, factory, shutdown).await?;
    assert_eq!(second.queued, 0);
    assert_eq!(store.article_count().await?, 0);
    Ok(())
}
