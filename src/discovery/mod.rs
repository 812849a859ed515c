//! Sitemap discovery: seeds the URL table the scraping pipeline draws from.
//!
//! A plain fetch-parse-store loop over the platform's master sitemap index.
//! Child sitemaps already recorded are skipped, so re-runs are idempotent;
//! a randomized polite delay spaces out the fetches.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use quick_xml::Reader;
use quick_xml::escape::unescape;
use quick_xml::events::Event;
use rand::Rng;
use tracing::{info, warn};
use url::Url;

use crate::store::{ArticleStore, SitemapEntry};

/// The platform's master sitemap index.
pub const MASTER_SITEMAP_URL: &str = "https://medium.com/sitemap/sitemap.xml";

const USER_AGENT: &str = "Mozilla/5.0 (compatible; mediumscrape/0.3)";

/// Aggregate outcome of one discovery run.
#[derive(Debug, Default, Clone)]
pub struct DiscoverySummary {
    pub sitemaps_processed: usize,
    pub sitemaps_skipped: usize,
    pub urls_inserted: u64,
}

/// Fetch the master sitemap, walk its child sitemaps, and insert every URL
/// entry. Failures on individual child sitemaps are logged and skipped.
pub async fn run_discovery(
    store: &ArticleStore,
    master_url: &str,
    avg_delay_secs: f64,
) -> Result<DiscoverySummary> {
    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(10))
        .build()
        .context("Failed to build HTTP client")?;

    let response = client
        .get(master_url)
        .send()
        .await
        .context("Failed to fetch master sitemap")?;
    if !response.status().is_success() {
        bail!(
            "Master sitemap {master_url} returned {}",
            response.status()
        );
    }
    let body = response
        .text()
        .await
        .context("Failed to read master sitemap body")?;

    let child_sitemaps = parse_sitemap_index(&body);
    info!("Found {} sitemaps", child_sitemaps.len());

    let mut summary = DiscoverySummary::default();

    for sitemap_url in child_sitemaps {
        if store.sitemap_seen(&sitemap_url).await? {
            info!("Sitemap {sitemap_url} already processed, skipping");
            summary.sitemaps_skipped += 1;
            continue;
        }

        tokio::time::sleep(polite_delay(avg_delay_secs)).await;

        let body = match client.get(&sitemap_url).send().await {
            Ok(response) if response.status().is_success() => match response.text().await {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to read sitemap {sitemap_url}: {e}");
                    continue;
                }
            },
            Ok(response) => {
                warn!("Sitemap {sitemap_url} returned {}", response.status());
                continue;
            }
            Err(e) => {
                warn!("Failed to fetch sitemap {sitemap_url}: {e}");
                continue;
            }
        };

        let entries = parse_urlset(&body);
        info!(
            "Processing sitemap {sitemap_url} with {} URLs",
            entries.len()
        );

        match record_sitemap_batch(store, &sitemap_url, &entries).await {
            Ok(inserted) => {
                summary.sitemaps_processed += 1;
                summary.urls_inserted += inserted;
            }
            Err(e) => {
                warn!("Error recording sitemap {sitemap_url}: {e:#}");
            }
        }
    }

    info!(
        "Discovery complete: {} sitemaps processed, {} skipped, {} URLs inserted",
        summary.sitemaps_processed, summary.sitemaps_skipped, summary.urls_inserted
    );
    Ok(summary)
}

async fn record_sitemap_batch(
    store: &ArticleStore,
    sitemap_url: &str,
    entries: &[SitemapEntry],
) -> Result<u64> {
    let sitemap_id = store
        .record_sitemap(sitemap_url, entries.len() as i64)
        .await?;
    store.insert_urls(sitemap_id, entries).await
}

/// Child sitemap locations from a `<sitemapindex>` document.
fn parse_sitemap_index(xml: &str) -> Vec<String> {
    let mut reader = Reader::from_str(xml);
    let mut locs = Vec::new();
    let mut in_loc = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if e.local_name().as_ref() == b"loc" {
                    in_loc = true;
                }
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"loc" {
                    in_loc = false;
                }
            }
            Ok(Event::Text(t)) => {
                if in_loc
                    && let Ok(raw) = t.decode()
                    && let Ok(text) = unescape(&raw)
                {
                    let loc = text.trim().to_string();
                    if !loc.is_empty() {
                        locs.push(loc);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!("Sitemap index parse error: {e}");
                break;
            }
            _ => {}
        }
    }

    locs
}

/// `<url>` entries from a `<urlset>` document. Entries without a valid
/// absolute `<loc>` are dropped.
fn parse_urlset(xml: &str) -> Vec<SitemapEntry> {
    #[derive(PartialEq)]
    enum Field {
        None,
        Loc,
        LastMod,
        ChangeFreq,
        Priority,
    }

    let mut reader = Reader::from_str(xml);
    let mut entries = Vec::new();
    let mut current: Option<SitemapEntry> = None;
    let mut field = Field::None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"url" => current = Some(SitemapEntry::default()),
                b"loc" => field = Field::Loc,
                b"lastmod" => field = Field::LastMod,
                b"changefreq" => field = Field::ChangeFreq,
                b"priority" => field = Field::Priority,
                _ => field = Field::None,
            },
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"url" {
                    if let Some(entry) = current.take()
                        && Url::parse(&entry.loc).is_ok()
                    {
                        entries.push(entry);
                    }
                }
                field = Field::None;
            }
            Ok(Event::Text(t)) => {
                if let Some(entry) = current.as_mut()
                    && let Ok(raw) = t.decode()
                    && let Ok(text) = unescape(&raw)
                {
                    let text = text.trim().to_string();
                    if text.is_empty() {
                        continue;
                    }
                    match field {
                        Field::Loc => entry.loc = text,
                        Field::LastMod => entry.last_modified = Some(text),
                        Field::ChangeFreq => entry.change_freq = Some(text),
                        Field::Priority => entry.priority = Some(text),
                        Field::None => {}
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                warn!("Sitemap parse error: {e}");
                break;
            }
            _ => {}
        }
    }

    entries
}

/// Randomized delay around the configured average, never below 100ms.
fn polite_delay(avg_secs: f64) -> Duration {
    let jitter = rand::rng().random_range(0.5..1.5);
    Duration::from_secs_f64((avg_secs * jitter).max(0.1))
}
