//! Task queue and worker pool.
//!
//! The coordinator samples pending URLs once, loads them into a shared
//! queue followed by one stop sentinel per worker, and spawns W worker
//! tasks. Shared mutable state is limited to that queue, the cancellation
//! flag and the completed counter; everything else (browser engine, storage
//! handle) is private to a worker.

pub mod monitor;
pub mod worker;

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::ScrapeConfig;
use crate::store::{ArticleStore, PendingUrl};

pub use worker::{BrowserSessionFactory, SessionFactory, WorkerSession};

/// One queue slot: a URL to process, or the stop sentinel telling a worker
/// to exit. Exactly one sentinel is enqueued per worker, after all real
/// tasks, so every worker observes the same shutdown protocol without any
/// shared counters.
#[derive(Debug, Clone)]
pub enum Task {
    Url(PendingUrl),
    Stop,
}

pub(crate) type TaskQueue = Arc<Mutex<VecDeque<Task>>>;

/// Aggregate outcome of one pipeline run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// URLs handed to the queue at startup.
    pub queued: usize,
    /// Tasks that completed successfully (persisted + marked Successful).
    pub completed: usize,
    pub elapsed: Duration,
}

/// Watch for Ctrl-C and flip the shared cancellation flag. Idle workers
/// notice it at the next queue poll; busy workers finish their in-flight
/// item first.
pub fn spawn_signal_watcher(shutdown: Arc<AtomicBool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight work");
            shutdown.store(true, Ordering::SeqCst);
        }
    })
}

/// Run the pipeline: sample pending URLs, distribute them across
/// `worker_count` workers, wait (bounded) for the pool to drain, and emit
/// the final aggregate report.
pub async fn run<F>(
    config: &ScrapeConfig,
    store: &ArticleStore,
    factory: F,
    shutdown: Arc<AtomicBool>,
) -> Result<RunSummary>
where
    F: SessionFactory,
{
    let started = Instant::now();

    let pending = store.sample_pending(config.url_sample_size()).await?;
    let queued = pending.len();
    info!(
        "Processing {} URLs with {} workers",
        queued,
        config.worker_count()
    );

    let mut slots: VecDeque<Task> = pending.into_iter().map(Task::Url).collect();
    for _ in 0..config.worker_count() {
        slots.push_back(Task::Stop);
    }
    let queue: TaskQueue = Arc::new(Mutex::new(slots));

    let completed = Arc::new(AtomicUsize::new(0));
    let factory = Arc::new(factory);

    let monitor = monitor::spawn(
        Arc::clone(&completed),
        config.monitor_interval(),
        Arc::clone(&shutdown),
    );

    let mut handles = Vec::with_capacity(config.worker_count());
    for worker_idx in 0..config.worker_count() {
        handles.push(tokio::spawn(worker::worker_loop(
            worker_idx,
            Arc::clone(&factory),
            Arc::clone(&queue),
            store.clone(),
            Arc::clone(&shutdown),
            Arc::clone(&completed),
            config.queue_poll_interval(),
        )));
    }

    // Bounded join: a wedged worker cannot hold the run open forever.
    for (worker_idx, handle) in handles.into_iter().enumerate() {
        let abort = handle.abort_handle();
        match tokio::time::timeout(config.join_timeout(), handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(worker = worker_idx, "Worker task panicked: {e}"),
            Err(_) => {
                warn!(worker = worker_idx, "Worker did not exit within join timeout, aborting");
                abort.abort();
            }
        }
    }

    monitor.abort();

    let summary = RunSummary {
        queued,
        completed: completed.load(Ordering::SeqCst),
        elapsed: started.elapsed(),
    };
    monitor::final_report(&summary);
    Ok(summary)
}
