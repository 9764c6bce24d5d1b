//! Single-writer mutation path for the inverted index.
//!
//! Every crawl task funnels its page through one actor task; at any instant
//! at most one page's index mutation is in flight, so lemma frequency
//! bookkeeping never races even when two pages share a lemma.

use std::collections::HashSet;

use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};
use crate::storage::Database;

/// One extracted lemma with its field-weighted rank and raw count.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedLemma {
    pub lemma: String,
    pub rank: f64,
    pub count: i64,
}

/// A fetched page ready for indexing.
#[derive(Debug, Clone)]
pub struct PageRecord {
    pub site_id: i64,
    pub path: String,
    pub code: i64,
    pub content: String,
    pub fingerprint: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// Stored fingerprint matched; nothing touched.
    Unchanged,
}

enum Command {
    UpsertPage {
        page: PageRecord,
        lemmas: Vec<WeightedLemma>,
        reply: oneshot::Sender<Result<UpsertOutcome>>,
    },
    RemoveStalePages {
        site_id: i64,
        keep_paths: HashSet<String>,
        reply: oneshot::Sender<Result<usize>>,
    },
}

/// Clonable handle to the index writer task.
#[derive(Clone)]
pub struct IndexWriter {
    tx: mpsc::Sender<Command>,
}

impl IndexWriter {
    pub fn spawn(db: Database) -> Self {
        let (tx, mut rx) = mpsc::channel::<Command>(64);
        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    Command::UpsertPage { page, lemmas, reply } => {
                        let result = apply_upsert(&db, &page, &lemmas).await;
                        if let Err(err) = &result {
                            tracing::error!(
                                site_id = page.site_id,
                                path = %page.path,
                                %err,
                                "page upsert failed"
                            );
                        }
                        let _ = reply.send(result);
                    }
                    Command::RemoveStalePages { site_id, keep_paths, reply } => {
                        let result = remove_stale(&db, site_id, &keep_paths).await;
                        if let Err(err) = &result {
                            tracing::error!(site_id, %err, "stale page removal failed");
                        }
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::debug!("index writer channel closed, stopping");
        });
        Self { tx }
    }

    /// Store or refresh one page and its postings. Serialized with every
    /// other index mutation.
    pub async fn upsert_page(
        &self,
        page: PageRecord,
        lemmas: Vec<WeightedLemma>,
    ) -> Result<UpsertOutcome> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(Command::UpsertPage { page, lemmas, reply })
            .await
            .map_err(|_| Error::Internal("index writer is not running".into()))?;
        response
            .await
            .map_err(|_| Error::Internal("index writer dropped a reply".into()))?
    }

    /// Delete the site's pages whose paths were not stored this pass,
    /// decrementing their lemmas. Returns how many pages went away.
    pub async fn remove_stale_pages(
        &self,
        site_id: i64,
        keep_paths: HashSet<String>,
    ) -> Result<usize> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(Command::RemoveStalePages { site_id, keep_paths, reply })
            .await
            .map_err(|_| Error::Internal("index writer is not running".into()))?;
        response
            .await
            .map_err(|_| Error::Internal("index writer dropped a reply".into()))?
    }
}

async fn apply_upsert(
    db: &Database,
    page: &PageRecord,
    lemmas: &[WeightedLemma],
) -> Result<UpsertOutcome> {
    let mut tx = db.begin().await?;
    let existing = Database::page_by_path(&mut tx, page.site_id, &page.path).await?;
    let (page_id, outcome) = match existing {
        Some(stored) if stored.fingerprint == page.fingerprint => {
            return Ok(UpsertOutcome::Unchanged);
        }
        Some(stored) => {
            detach_postings(&mut tx, stored.id).await?;
            Database::update_page(&mut tx, stored.id, page.code, &page.content, &page.fingerprint)
                .await?;
            (stored.id, UpsertOutcome::Updated)
        }
        None => {
            let id = Database::insert_page(
                &mut tx,
                page.site_id,
                &page.path,
                page.code,
                &page.content,
                &page.fingerprint,
            )
            .await?;
            (id, UpsertOutcome::Inserted)
        }
    };
    for lemma in lemmas {
        let lemma_id = match Database::lemma_by_text(&mut tx, page.site_id, &lemma.lemma).await? {
            Some(row) => {
                Database::add_lemma_frequency(&mut tx, row.id, lemma.count).await?;
                row.id
            }
            None => Database::insert_lemma(&mut tx, page.site_id, &lemma.lemma, lemma.count).await?,
        };
        Database::upsert_index_entry(&mut tx, page_id, lemma_id, lemma.rank, lemma.count).await?;
    }
    tx.commit().await?;
    Ok(outcome)
}

/// Undo a page's contribution to its lemmas and drop its postings. Lemmas
/// driven to zero or below disappear entirely.
async fn detach_postings(tx: &mut sqlx::SqliteConnection, page_id: i64) -> Result<()> {
    for entry in Database::entries_for_page(tx, page_id).await? {
        let left = Database::add_lemma_frequency(tx, entry.lemma_id, -entry.count).await?;
        if left <= 0 {
            Database::delete_lemma(tx, entry.lemma_id).await?;
        }
    }
    Database::delete_entries_for_page(tx, page_id).await?;
    Ok(())
}

async fn remove_stale(db: &Database, site_id: i64, keep_paths: &HashSet<String>) -> Result<usize> {
    let mut tx = db.begin().await?;
    let pages = Database::page_ids_and_paths(&mut tx, site_id).await?;
    let mut removed = 0;
    for (page_id, path) in pages {
        if keep_paths.contains(&path) {
            continue;
        }
        detach_postings(&mut tx, page_id).await?;
        Database::delete_page(&mut tx, page_id).await?;
        removed += 1;
    }
    tx.commit().await?;
    if removed > 0 {
        tracing::info!(site_id, removed, "removed pages unreachable in this pass");
    }
    Ok(removed)
}
