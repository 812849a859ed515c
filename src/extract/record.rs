//! Typed records produced by page extraction.
//!
//! Every optional page element maps to an explicit `Option`/empty field, so
//! downstream code never deals with missing keys or dynamic shapes.

use serde::{Deserialize, Serialize};

/// Whether an article's full content is publicly readable or gated.
///
/// Detection is best-effort (§ paywall markup can drift); `Public` is the
/// default when no gating signal is present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessTier {
    #[default]
    Public,
    MemberOnly,
    Paid,
}

impl AccessTier {
    /// Database/display representation, matching the platform's own wording.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "Public",
            Self::MemberOnly => "Member-Only",
            Self::Paid => "Paid",
        }
    }
}

/// One extracted article plus its loaded responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub title: Option<String>,
    pub author: Option<String>,
    /// Raw date string from JSON-LD; not necessarily parseable.
    pub date_published: Option<String>,
    pub date_modified: Option<String>,
    pub description: Option<String>,
    pub publisher: Option<String>,
    pub access_tier: AccessTier,
    /// Raw display string ("1.2K"); preserved verbatim, never normalized.
    pub claps: String,
    /// Tag names joined with commas.
    pub tags: String,
    pub body_text: String,
    pub comments: Vec<CommentRecord>,
}

impl ArticleRecord {
    #[must_use]
    pub fn comment_count(&self) -> usize {
        self.comments.len()
    }
}

/// One response under an article.
///
/// Deserialized directly from the in-page collection script, hence the
/// camelCase field names on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommentRecord {
    pub username: Option<String>,
    /// Short visible text (first paragraph).
    pub text: Option<String>,
    /// Complete response text, which may include quoted article excerpts.
    pub full_text: String,
    /// Raw clap display string.
    pub claps: String,
    /// True when the response quotes an excerpt of the article.
    pub references_article: bool,
}
