//! Persistence gateway over SQLite.
//!
//! Owns the schema and every write the pipeline performs. Two separate
//! contracts per processing attempt:
//!
//! 1. [`ArticleStore::persist_article`] — one transaction inserting the
//!    article row and its comments; all-or-nothing, surfaced as a boolean.
//! 2. [`ArticleStore::mark_crawled`] — the always-executed status write,
//!    setting `last_crawled` and `crawl_status` together.
//!
//! Keeping the two apart means a failed extraction still gets its status
//! write and is not retried in the same run.

use std::path::Path;

use anyhow::{Context, Result};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

use crate::extract::ArticleRecord;

/// Idempotent schema. `articles.url_id` is unique: at most one article per
/// source URL, ever. Comments cascade with their article.
const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS sitemaps (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sitemap_url TEXT NOT NULL UNIQUE,
    url_count INTEGER
);

CREATE TABLE IF NOT EXISTS urls (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    last_modified TEXT,
    change_freq TEXT,
    priority TEXT,
    sitemap_id INTEGER REFERENCES sitemaps(id),
    last_crawled INTEGER,
    crawl_status TEXT
);

CREATE INDEX IF NOT EXISTS idx_urls_pending ON urls(last_crawled) WHERE last_crawled IS NULL;

CREATE TABLE IF NOT EXISTS articles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url_id INTEGER NOT NULL UNIQUE REFERENCES urls(id),
    title TEXT,
    author TEXT,
    date_published TEXT,
    date_modified TEXT,
    description TEXT,
    publisher TEXT,
    access_tier TEXT NOT NULL,
    claps TEXT NOT NULL,
    comment_count INTEGER NOT NULL,
    tags TEXT NOT NULL,
    body_text TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS comments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    article_id INTEGER NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
    username TEXT,
    text TEXT,
    full_text TEXT NOT NULL,
    claps TEXT NOT NULL,
    references_article INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_comments_article ON comments(article_id);
";

/// A URL selected for processing: id + address, nothing more.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUrl {
    pub id: i64,
    pub url: String,
}

/// One `<url>` entry parsed out of a sitemap.
#[derive(Debug, Clone, Default)]
pub struct SitemapEntry {
    pub loc: String,
    pub last_modified: Option<String>,
    pub change_freq: Option<String>,
    pub priority: Option<String>,
}

/// Crawl bookkeeping for one URL row, as read back from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlState {
    pub last_crawled: Option<i64>,
    pub crawl_status: Option<String>,
}

/// Shared handle to the SQLite database. Cloning is cheap; each worker
/// clone draws its own connections from the pool.
#[derive(Clone)]
pub struct ArticleStore {
    pool: SqlitePool,
}

impl ArticleStore {
    /// Open (or create) the database and run the idempotent schema.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await
            .context("Failed to open SQLite database")?;

        sqlx::query(SCHEMA_SQL)
            .execute(&pool)
            .await
            .context("Failed to initialize database schema")?;

        Ok(Self { pool })
    }

    // ------------------------------------------------------------------
    // Discovery-side writes
    // ------------------------------------------------------------------

    /// Whether this sitemap has already been recorded.
    pub async fn sitemap_seen(&self, sitemap_url: &str) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM sitemaps WHERE sitemap_url = ?")
            .bind(sitemap_url)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query sitemap")?;
        Ok(row.is_some())
    }

    /// Record a processed sitemap and return its id.
    pub async fn record_sitemap(&self, sitemap_url: &str, url_count: i64) -> Result<i64> {
        let result = sqlx::query("INSERT INTO sitemaps (sitemap_url, url_count) VALUES (?, ?)")
            .bind(sitemap_url)
            .bind(url_count)
            .execute(&self.pool)
            .await
            .context("Failed to insert sitemap")?;
        Ok(result.last_insert_rowid())
    }

    /// Insert discovered URLs in one transaction, ignoring duplicates (the
    /// same URL can appear in more than one sitemap).
    pub async fn insert_urls(&self, sitemap_id: i64, entries: &[SitemapEntry]) -> Result<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        let mut inserted = 0;
        for entry in entries {
            let result = sqlx::query(
                r"
                INSERT OR IGNORE INTO urls (url, last_modified, change_freq, priority, sitemap_id)
                VALUES (?, ?, ?, ?, ?)
                ",
            )
            .bind(&entry.loc)
            .bind(&entry.last_modified)
            .bind(&entry.change_freq)
            .bind(&entry.priority)
            .bind(sitemap_id)
            .execute(&mut *tx)
            .await
            .context("Failed to insert URL")?;
            inserted += result.rows_affected();
        }

        tx.commit().await.context("Failed to commit URL batch")?;
        Ok(inserted)
    }

    // ------------------------------------------------------------------
    // Pipeline-side reads and writes
    // ------------------------------------------------------------------

    /// Random sample of not-yet-crawled URLs.
    pub async fn sample_pending(&self, limit: usize) -> Result<Vec<PendingUrl>> {
        let rows: Vec<(i64, String)> = sqlx::query_as(
            "SELECT id, url FROM urls WHERE last_crawled IS NULL ORDER BY RANDOM() LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to sample pending URLs")?;

        Ok(rows
            .into_iter()
            .map(|(id, url)| PendingUrl { id, url })
            .collect())
    }

    /// Persist an extracted article and its comments in one unit of work.
    ///
    /// Returns true when everything committed; false when anything failed
    /// (the transaction is rolled back and a warning logged). Never raises
    /// past this boundary.
    pub async fn persist_article(&self, url_id: i64, record: &ArticleRecord) -> bool {
        match self.try_persist(url_id, record).await {
            Ok(article_id) => {
                debug!(
                    url_id,
                    article_id,
                    comments = record.comments.len(),
                    "Article committed"
                );
                true
            }
            Err(e) => {
                warn!(url_id, "Article persist rolled back: {e:#}");
                false
            }
        }
    }

    async fn try_persist(&self, url_id: i64, record: &ArticleRecord) -> Result<i64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        let result = sqlx::query(
            r"
            INSERT INTO articles (
                url_id, title, author, date_published, date_modified,
                description, publisher, access_tier, claps, comment_count,
                tags, body_text
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(url_id)
        .bind(&record.title)
        .bind(&record.author)
        .bind(&record.date_published)
        .bind(&record.date_modified)
        .bind(&record.description)
        .bind(&record.publisher)
        .bind(record.access_tier.as_str())
        .bind(&record.claps)
        .bind(record.comments.len() as i64)
        .bind(&record.tags)
        .bind(&record.body_text)
        .execute(&mut *tx)
        .await
        .context("Failed to insert article")?;

        let article_id = result.last_insert_rowid();

        for comment in &record.comments {
            sqlx::query(
                r"
                INSERT INTO comments (article_id, username, text, full_text, claps, references_article)
                VALUES (?, ?, ?, ?, ?, ?)
                ",
            )
            .bind(article_id)
            .bind(&comment.username)
            .bind(&comment.text)
            .bind(&comment.full_text)
            .bind(&comment.claps)
            .bind(comment.references_article)
            .execute(&mut *tx)
            .await
            .context("Failed to insert comment")?;
        }

        tx.commit().await.context("Failed to commit article")?;
        Ok(article_id)
    }

    /// Record the outcome of a processing attempt. `last_crawled` and
    /// `crawl_status` are always written together, upholding the joint
    /// invariant.
    pub async fn mark_crawled(&self, url_id: i64, success: bool) -> Result<()> {
        let status = if success { "Successful" } else { "Failed" };
        sqlx::query("UPDATE urls SET last_crawled = ?, crawl_status = ? WHERE id = ?")
            .bind(chrono::Utc::now().timestamp())
            .bind(status)
            .bind(url_id)
            .execute(&self.pool)
            .await
            .context("Failed to record crawl status")?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reads used by reporting and tests
    // ------------------------------------------------------------------

    /// Crawl bookkeeping for one URL row.
    pub async fn crawl_state(&self, url_id: i64) -> Result<CrawlState> {
        let row = sqlx::query("SELECT last_crawled, crawl_status FROM urls WHERE id = ?")
            .bind(url_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to read crawl state")?;
        Ok(CrawlState {
            last_crawled: row.get("last_crawled"),
            crawl_status: row.get("crawl_status"),
        })
    }

    pub async fn url_count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM urls")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count URLs")?;
        Ok(row.0)
    }

    pub async fn article_count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM articles")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count articles")?;
        Ok(row.0)
    }

    /// The article id stored for a URL, if one committed.
    pub async fn article_id_for_url(&self, url_id: i64) -> Result<Option<i64>> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM articles WHERE url_id = ?")
            .bind(url_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query article for URL")?;
        Ok(row.map(|(id,)| id))
    }

    /// Number of comments committed for an article.
    pub async fn comment_count(&self, article_id: i64) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM comments WHERE article_id = ?")
            .bind(article_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count comments")?;
        Ok(row.0)
    }

    /// Comments whose article reference does not resolve. Always empty when
    /// the invariants hold; used by tests.
    pub async fn orphan_comment_count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            r"
            SELECT COUNT(*) FROM comments c
            LEFT JOIN articles a ON c.article_id = a.id
            WHERE a.id IS NULL
            ",
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to count orphan comments")?;
        Ok(row.0)
    }

    /// Close the connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{AccessTier, CommentRecord};
    use tempfile::TempDir;

    async fn store_with_urls(urls: &[&str]) -> Result<(TempDir, ArticleStore)> {
        let dir = TempDir::new()?;
        let store = ArticleStore::open(&dir.path().join("test.sqlite")).await?;
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

    fn record_with_comments(count: usize) -> ArticleRecord {
        ArticleRecord {
            title: Some("A Title".to_string()),
            author: Some("Jane Writer".to_string()),
            access_tier: AccessTier::Public,
            claps: "1.2K".to_string(),
            tags: "rust,testing".to_string(),
            body_text: "body".to_string(),
            comments: (0..count)
                .map(|i| CommentRecord {
                    username: Some(format!("reader{i}")),
                    full_text: format!("comment {i}"),
                    claps: "0".to_string(),
                    ..CommentRecord::default()
                })
                .collect(),
            ..ArticleRecord::default()
        }
    }

    #[tokio::test]
    async fn status_and_timestamp_written_together() -> Result<()> {
        let (_dir, store) = store_with_urls(&["https://example.com/a"]).await?;
        let pending = store.sample_pending(10).await?;
        let url_id = pending[0].id;

        let before = store.crawl_state(url_id).await?;
        assert!(before.last_crawled.is_none());
        assert!(before.crawl_status.is_none());

        store.mark_crawled(url_id, false).await?;
        let after = store.crawl_state(url_id).await?;
        assert!(after.last_crawled.is_some());
        assert_eq!(after.crawl_status.as_deref(), Some("Failed"));
        Ok(())
    }

    #[tokio::test]
    async fn crawled_urls_leave_the_pending_pool() -> Result<()> {
        let (_dir, store) =
            store_with_urls(&["https://example.com/a", "https://example.com/b"]).await?;
        let pending = store.sample_pending(10).await?;
        assert_eq!(pending.len(), 2);

        store.mark_crawled(pending[0].id, true).await?;
        let remaining = store.sample_pending(10).await?;
        assert_eq!(remaining.len(), 1);
        assert_ne!(remaining[0].id, pending[0].id);
        Ok(())
    }

    #[tokio::test]
    async fn article_and_comments_commit_atomically() -> Result<()> {
        let (_dir, store) = store_with_urls(&["https://example.com/a"]).await?;
        let url_id = store.sample_pending(1).await?[0].id;

        assert!(store.persist_article(url_id, &record_with_comments(3)).await);

        let article_id = store.article_id_for_url(url_id).await?.expect("committed");
        assert_eq!(store.comment_count(article_id).await?, 3);
        assert_eq!(store.orphan_comment_count().await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn zero_comment_article_still_commits() -> Result<()> {
        let (_dir, store) = store_with_urls(&["https://example.com/a"]).await?;
        let url_id = store.sample_pending(1).await?[0].id;

        assert!(store.persist_article(url_id, &record_with_comments(0)).await);
        let article_id = store.article_id_for_url(url_id).await?.expect("committed");
        assert_eq!(store.comment_count(article_id).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_article_rolls_back_without_residue() -> Result<()> {
        let (_dir, store) = store_with_urls(&["https://example.com/a"]).await?;
        let url_id = store.sample_pending(1).await?[0].id;

        assert!(store.persist_article(url_id, &record_with_comments(2)).await);
        // Second attempt for the same URL violates the one-article-per-URL
        // constraint; the whole unit of work (including comments) rolls back.
        assert!(!store.persist_article(url_id, &record_with_comments(5)).await);

        assert_eq!(store.article_count().await?, 1);
        let article_id = store.article_id_for_url(url_id).await?.expect("first commit");
        assert_eq!(store.comment_count(article_id).await?, 2);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_url_reference_fails_persist() -> Result<()> {
        let (_dir, store) = store_with_urls(&["https://example.com/a"]).await?;
        assert!(!store.persist_article(9999, &record_with_comments(1)).await);
        assert_eq!(store.article_count().await?, 0);
        assert_eq!(store.orphan_comment_count().await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_sitemap_urls_ignored() -> Result<()> {
        let (_dir, store) = store_with_urls(&["https://example.com/a"]).await?;
        let sitemap_id = store.record_sitemap("https://example.com/sitemap2.xml", 1).await?;
        let inserted = store
            .insert_urls(
                sitemap_id,
                &[SitemapEntry {
                    loc: "https://example.com/a".to_string(),
                    ..SitemapEntry::default()
                }],
            )
            .await?;
        assert_eq!(inserted, 0);
        assert_eq!(store.url_count().await?, 1);
        Ok(())
    }
}
