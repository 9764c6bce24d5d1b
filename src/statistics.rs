//! Aggregated index statistics for the operator surface.

use serde::Serialize;

use crate::error::Result;
use crate::storage::Database;
use crate::storage::models::SiteStatus;

#[derive(Debug, Clone, Serialize)]
pub struct Totals {
    pub sites: i64,
    pub pages: i64,
    pub lemmas: i64,
    pub indexing: bool,
}

/// Per-site breakdown. `status_time` is epoch milliseconds.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteDetail {
    pub url: String,
    pub name: String,
    pub status: SiteStatus,
    pub status_time: i64,
    pub error: String,
    pub pages: i64,
    pub lemmas: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Statistics {
    pub total: Totals,
    pub detailed: Vec<SiteDetail>,
}

/// Snapshot of totals and per-site detail. `indexing` is the crawl
/// manager's flag, passed in by the caller.
pub async fn collect(db: &Database, indexing: bool) -> Result<Statistics> {
    let total = Totals {
        sites: db.count_sites().await?,
        pages: db.count_pages().await?,
        lemmas: db.count_lemmas().await?,
        indexing,
    };
    let mut detailed = Vec::new();
    for site in db.list_sites().await? {
        let pages = db.count_pages_for_site(site.id).await?;
        let lemmas = db.count_lemmas_for_site(site.id).await?;
        detailed.push(SiteDetail {
            url: site.url,
            name: site.name,
            status: site.status,
            status_time: site.status_time.timestamp_millis(),
            error: site.last_error,
            pages,
            lemmas,
        });
    }
    Ok(Statistics { total, detailed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::{IndexWriter, PageRecord, WeightedLemma};

    #[tokio::test]
    async fn totals_and_details_reflect_stored_state() {
        let db = Database::connect_in_memory().await.expect("database");
        let first = db
            .upsert_site_seed("https://one.test", "One")
            .await
            .expect("site");
        let second = db
            .upsert_site_seed("https://two.test", "Two")
            .await
            .expect("site");
        db.set_site_status(second.id, SiteStatus::Indexed, Some(""))
            .await
            .expect("status");

        let writer = IndexWriter::spawn(db.clone());
        writer
            .upsert_page(
                PageRecord {
                    site_id: second.id,
                    path: "/".to_string(),
                    code: 200,
                    content: "<html><body>granite pebble</body></html>".to_string(),
                    fingerprint: "fp".to_string(),
                },
                vec![
                    WeightedLemma {
                        lemma: "granit".to_string(),
                        rank: 1.0,
                        count: 1,
                    },
                    WeightedLemma {
                        lemma: "pebbl".to_string(),
                        rank: 0.8,
                        count: 1,
                    },
                ],
            )
            .await
            .expect("store page");

        let stats = collect(&db, true).await.expect("collect");
        assert_eq!(stats.total.sites, 2);
        assert_eq!(stats.total.pages, 1);
        assert_eq!(stats.total.lemmas, 2);
        assert!(stats.total.indexing);

        assert_eq!(stats.detailed.len(), 2);
        let one = &stats.detailed[0];
        assert_eq!(one.url, "https://one.test");
        assert_eq!(one.status, SiteStatus::Failed);
        assert_eq!(one.error, "not yet indexed");
        assert_eq!(one.pages, 0);
        let two = &stats.detailed[1];
        assert_eq!(two.url, "https://two.test");
        assert_eq!(two.status, SiteStatus::Indexed);
        assert_eq!(two.pages, 1);
        assert_eq!(two.lemmas, 2);
        assert!(two.status_time > 0);
        let _ = first;
    }
}
