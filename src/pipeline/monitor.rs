//! Throughput monitor. Off the critical path: it only reads the completed
//! counter and logs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::info;

use super::RunSummary;

/// Periodically report throughput while the pool runs.
pub(crate) fn spawn(
    completed: Arc<AtomicUsize>,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let started = Instant::now();
        let mut ticker = tokio::time::interval(interval);
        // the first tick fires immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if shutdown.load(Ordering::SeqCst) {
                break;
            }
            let done = completed.load(Ordering::SeqCst);
            let minutes = started.elapsed().as_secs_f64() / 60.0;
            if done > 0 && minutes > 0.0 {
                info!(
                    "Progress: {done} articles processed ({:.2}/minute)",
                    done as f64 / minutes
                );
            }
        }
    })
}

/// Final aggregate report: total processed and throughput. Per-URL detail
/// lives in the log and in the persisted crawl_status column, not here.
pub(crate) fn final_report(summary: &RunSummary) {
    let minutes = summary.elapsed.as_secs_f64() / 60.0;
    info!("=== Final run summary ===");
    info!(
        "Processed {} of {} queued URLs successfully",
        summary.completed, summary.queued
    );
    info!("Total time: {minutes:.1} minutes");
    if summary.completed > 0 && minutes > 0.0 {
        let per_minute = summary.completed as f64 / minutes;
        info!("Average speed: {per_minute:.2} articles/minute");
        info!(
            "Processing time per article: {:.2} seconds",
            60.0 / per_minute
        );
    }
}
