//! Row types for sites, pages, lemmas, and the inverted index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a site, stored as TEXT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum SiteStatus {
    Indexing,
    Indexed,
    Failed,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Site {
    pub id: i64,
    pub url: String,
    pub name: String,
    pub status: SiteStatus,
    pub status_time: DateTime<Utc>,
    pub last_error: String,
}

/// One stored page. `path` is the URL with the site prefix removed, `/` for
/// the root. `fingerprint` is a digest of the extracted lemma multiset used
/// to short-circuit re-indexing of unchanged pages.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Page {
    pub id: i64,
    pub site_id: i64,
    pub path: String,
    pub code: i64,
    pub content: String,
    pub fingerprint: String,
}

/// One lemma of a site. `frequency` is the corpus frequency: the sum of raw
/// occurrence counts across this lemma's index entries.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Lemma {
    pub id: i64,
    pub site_id: i64,
    pub lemma: String,
    pub frequency: i64,
}

/// One (page, lemma) posting. `rank` is the field-weighted count sum;
/// `count` is the unweighted occurrence count used for frequency bookkeeping.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IndexEntry {
    pub id: i64,
    pub page_id: i64,
    pub lemma_id: i64,
    pub rank: f64,
    pub count: i64,
}

/// A weighted document field, preloaded from configuration.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FieldRule {
    pub name: String,
    pub selector: String,
    pub weight: f64,
}

/// A candidate page joined with its site and summed relevance.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScoredPage {
    pub page_id: i64,
    pub site_id: i64,
    pub path: String,
    pub content: String,
    pub site_url: String,
    pub site_name: String,
    pub relevance: f64,
}
