//! Page extraction: turns a rendered article page into an [`ArticleRecord`].
//!
//! Policy (in order): structured JSON-LD metadata first, then the paywall
//! probes, then body text, claps and tags, and finally the comments
//! sub-protocol. Missing optional elements yield empty/None fields; only a
//! broken page handle (CDP failure) makes extraction fail.

pub mod js_scripts;
pub mod record;

use std::time::Duration;

use anyhow::{Context, Result};
use chromiumoxide::Page;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

pub use record::{AccessTier, ArticleRecord, CommentRecord};

use js_scripts::{
    BODY_TEXT_SCRIPT, CLAPS_SCRIPT, COMMENTS_SCRIPT, JSON_LD_SCRIPT, OPEN_RESPONSES_SCRIPT,
    PAYWALL_SCRIPT, RESPONSES_SCROLL_SCRIPT, TAGS_SCRIPT,
};

/// Knobs for the comments sub-protocol.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Upper bound on scroll iterations inside the responses dialog.
    pub comment_scroll_limit: usize,
    /// Wait between scrolls so lazily loaded responses can render.
    pub comment_scroll_wait: Duration,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            comment_scroll_limit: 100,
            comment_scroll_wait: Duration::from_millis(1000),
        }
    }
}

/// Article metadata as found in the page's JSON-LD block.
///
/// Every field optional: the block's shape varies by article type.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct JsonLdArticle {
    headline: Option<String>,
    description: Option<String>,
    date_published: Option<String>,
    date_modified: Option<String>,
    author: Option<JsonLdEntity>,
    publisher: Option<JsonLdEntity>,
    // bool on most pages, but occasionally the string "False"
    is_accessible_for_free: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct JsonLdEntity {
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PaywallFlags {
    preview: bool,
    upsell: bool,
}

/// Extract the article record (metadata + body + comments) from a loaded
/// page. Never fails for missing optional elements.
pub async fn extract_article(page: &Page, opts: &ExtractOptions) -> Result<ArticleRecord> {
    let mut article = ArticleRecord {
        claps: "0".to_string(),
        ..ArticleRecord::default()
    };

    // 1. Structured metadata is the primary source: already machine-readable
    //    and stable across layout changes.
    let mut json_ld_free = None;
    if let Some(raw) = eval_opt_string(page, JSON_LD_SCRIPT)
        .await
        .context("Failed to read structured metadata block")?
    {
        if let Some(meta) = parse_json_ld(&raw) {
            json_ld_free = accessible_for_free(meta.is_accessible_for_free.as_ref());
            article.title = meta.headline;
            article.description = meta.description;
            article.date_published = meta.date_published;
            article.date_modified = meta.date_modified;
            article.author = meta.author.and_then(|a| a.name);
            article.publisher = meta.publisher.and_then(|p| p.name);
        }
    } else {
        debug!("No JSON-LD block on page");
    }

    // 2. Access tier, best-effort.
    let paywall = eval_typed::<PaywallFlags>(page, PAYWALL_SCRIPT)
        .await
        .unwrap_or_else(|e| {
            warn!("Paywall probe failed: {e:#}");
            PaywallFlags::default()
        });
    article.access_tier = resolve_tier(json_ld_free, paywall.preview, paywall.upsell);

    // 3. Body text, falling back to empty.
    article.body_text = eval_opt_string(page, BODY_TEXT_SCRIPT)
        .await
        .context("Failed to extract body text")?
        .unwrap_or_default();

    // 4. Claps and tags.
    if let Some(claps) = eval_opt_string(page, CLAPS_SCRIPT)
        .await
        .context("Failed to extract clap count")?
    {
        article.claps = claps;
    }
    let tags: Vec<String> = eval_typed(page, TAGS_SCRIPT).await.unwrap_or_default();
    article.tags = tags.join(",");

    // 5. Comments are a distinct sub-protocol; any failure inside degrades
    //    to zero comments instead of failing the article.
    article.comments = collect_comments(page, opts).await;

    Ok(article)
}

/// Open the responses panel, scroll it until content stops changing (or the
/// iteration bound is hit), then parse every loaded response node.
async fn collect_comments(page: &Page, opts: &ExtractOptions) -> Vec<CommentRecord> {
    match page.evaluate(OPEN_RESPONSES_SCRIPT).await {
        Ok(result) => {
            let opened = result.value().and_then(Value::as_bool).unwrap_or(false);
            if !opened {
                warn!("Responses control not found; continuing with zero comments");
                return Vec::new();
            }
        }
        Err(e) => {
            warn!("Failed to activate responses panel: {e}");
            return Vec::new();
        }
    }

    // Snapshot-compare loop: stop when a scroll no longer changes the page,
    // bounded against sites that keep feeding content forever.
    let mut snapshot = match page.content().await {
        Ok(html) => html,
        Err(e) => {
            warn!("Failed to snapshot page before response scrolling: {e}");
            return Vec::new();
        }
    };
    for iteration in 0..opts.comment_scroll_limit {
        match page.evaluate(RESPONSES_SCROLL_SCRIPT).await {
            Ok(result) => {
                if !result.value().and_then(Value::as_bool).unwrap_or(false) {
                    debug!("Responses dialog gone after {iteration} scrolls");
                    break;
                }
            }
            Err(e) => {
                warn!("Responses scroll failed: {e}");
                break;
            }
        }
        tokio::time::sleep(opts.comment_scroll_wait).await;

        match page.content().await {
            Ok(current) if current == snapshot => break, // reached the end
            Ok(current) => snapshot = current,
            Err(e) => {
                warn!("Failed to snapshot page during response scrolling: {e}");
                break;
            }
        }
    }

    match page.evaluate(COMMENTS_SCRIPT).await {
        Ok(result) => match result.into_value::<Vec<CommentRecord>>() {
            Ok(comments) => comments,
            Err(e) => {
                warn!("Failed to parse response nodes: {e}");
                Vec::new()
            }
        },
        Err(e) => {
            warn!("Failed to collect responses: {e}");
            Vec::new()
        }
    }
}

async fn eval_opt_string(page: &Page, script: &str) -> Result<Option<String>> {
    let result = page
        .evaluate(script)
        .await
        .context("Script evaluation failed")?;
    Ok(result
        .value()
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string))
}

async fn eval_typed<T: serde::de::DeserializeOwned>(page: &Page, script: &str) -> Result<T> {
    let result = page
        .evaluate(script)
        .await
        .context("Script evaluation failed")?;
    result
        .into_value()
        .map_err(|e| anyhow::anyhow!("Failed to deserialize script result: {e}"))
}

fn parse_json_ld(raw: &str) -> Option<JsonLdArticle> {
    match serde_json::from_str(raw) {
        Ok(meta) => Some(meta),
        Err(e) => {
            warn!("Failed to parse JSON-LD block: {e}");
            None
        }
    }
}

/// Interpret the `isAccessibleForFree` hint, tolerating string booleans.
fn accessible_for_free(value: Option<&Value>) -> Option<bool> {
    match value? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Combine the JSON-LD hint with the DOM probes. The upsell banner is the
/// strongest signal; the preview container and a negative JSON-LD hint both
/// mark member-only content; everything else reads as public.
fn resolve_tier(json_ld_free: Option<bool>, preview: bool, upsell: bool) -> AccessTier {
    if upsell {
        AccessTier::Paid
    } else if preview || json_ld_free == Some(false) {
        AccessTier::MemberOnly
    } else {
        AccessTier::Public
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_ld_full_block() {
        let raw = r#"{
            "@type": "NewsArticle",
            "headline": "A Title",
            "description": "A description",
            "datePublished": "2023-01-15T10:00:00Z",
            "dateModified": "2023-01-16T09:30:00Z",
            "author": {"@type": "Person", "name": "Jane Writer"},
            "publisher": {"@type": "Organization", "name": "A Publication"},
            "isAccessibleForFree": false
        }"#;
        let meta = parse_json_ld(raw).expect("valid block parses");
        assert_eq!(meta.headline.as_deref(), Some("A Title"));
        assert_eq!(
            meta.author.and_then(|a| a.name).as_deref(),
            Some("Jane Writer")
        );
        assert_eq!(meta.date_published.as_deref(), Some("2023-01-15T10:00:00Z"));
        assert_eq!(
            accessible_for_free(meta.is_accessible_for_free.as_ref()),
            Some(false)
        );
    }

    #[test]
    fn json_ld_partial_block_defaults_missing_fields() {
        let meta = parse_json_ld(r#"{"headline": "Only a title"}"#).expect("parses");
        assert_eq!(meta.headline.as_deref(), Some("Only a title"));
        assert!(meta.author.is_none());
        assert!(meta.date_published.is_none());
        assert!(meta.is_accessible_for_free.is_none());
    }

    #[test]
    fn json_ld_invalid_returns_none() {
        assert!(parse_json_ld("not json at all {").is_none());
    }

    #[test]
    fn string_boolean_hint_tolerated() {
        let meta = parse_json_ld(r#"{"isAccessibleForFree": "False"}"#).expect("parses");
        assert_eq!(
            accessible_for_free(meta.is_accessible_for_free.as_ref()),
            Some(false)
        );
    }

    #[test]
    fn tier_defaults_to_public() {
        assert_eq!(resolve_tier(None, false, false), AccessTier::Public);
        assert_eq!(resolve_tier(Some(true), false, false), AccessTier::Public);
    }

    #[test]
    fn tier_member_only_signals() {
        assert_eq!(resolve_tier(None, true, false), AccessTier::MemberOnly);
        assert_eq!(resolve_tier(Some(false), false, false), AccessTier::MemberOnly);
    }

    #[test]
    fn tier_upsell_wins() {
        assert_eq!(resolve_tier(Some(false), true, true), AccessTier::Paid);
    }

    #[test]
    fn comment_record_deserializes_from_script_shape() {
        let raw = r#"[{
            "username": "reader1",
            "text": "Great piece",
            "fullText": "Great piece\nquoted excerpt",
            "claps": "12",
            "referencesArticle": true
        }]"#;
        let comments: Vec<CommentRecord> = serde_json::from_str(raw).expect("parses");
        assert_eq!(comments.len(), 1);
        assert!(comments[0].references_article);
        assert_eq!(comments[0].claps, "12");
    }
}
