//! One site's crawl: a coordinator task that dispatches page tasks from a
//! link queue and joins them to quiescence.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{Datelike, Utc};
use rand::Rng;
use tokio::sync::{Mutex, Semaphore, mpsc, watch};
use tokio::task::JoinSet;

use super::extract::{self, PageAnalysis};
use super::fetch::Fetch;
use super::manager::PoisonSlot;
use super::robots::RobotsPolicy;
use crate::config::CrawlConfig;
use crate::error::Result;
use crate::indexer::{IndexWriter, PageRecord};
use crate::morphology::Morphology;
use crate::storage::Database;
use crate::storage::models::{FieldRule, Site, SiteStatus};

pub(super) const INTERRUPTED_BY_USER: &str = "interrupted by user";
pub(super) const NOTHING_INDEXED: &str = "nothing indexed";
pub(crate) const UNEXPECTED_FAILURE: &str = "indexing stopped unexpectedly";

/// A full pass follows links; one-page mode stores a single url and stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlMode {
    FullSite,
    OnePage,
}

/// State shared by the coordinator and every page task of one crawl.
pub(super) struct CrawlShared {
    pub site: Site,
    pub mode: CrawlMode,
    pub config: CrawlConfig,
    pub fetcher: Arc<dyn Fetch>,
    pub morphology: Arc<Morphology>,
    pub field_rules: Vec<FieldRule>,
    pub robots: RobotsPolicy,
    pub writer: IndexWriter,
    /// Process-wide crawling flag; cleared by stop_all or poisoning.
    pub crawling: Arc<AtomicBool>,
    /// Per-site stop signal from the manager registry.
    pub stop: watch::Receiver<bool>,
    pub poison: PoisonSlot,
    /// Remaining page budget for this pass. May go negative; a task that
    /// takes it below zero stores nothing.
    pub quota: AtomicI64,
    pub indexed_pages: AtomicUsize,
    /// Paths handed to the writer this pass; quiescence reconciliation
    /// deletes everything else.
    pub stored_paths: Mutex<HashSet<String>>,
    /// Every URL ever scheduled, in both trailing-slash forms.
    pub visited: Mutex<HashSet<String>>,
    /// Page tasks report filtered links here; the coordinator holds the
    /// receiver and this master sender, so recv never closes early.
    pub links: mpsc::UnboundedSender<Vec<String>>,
    pub limiter: Arc<Semaphore>,
}

impl CrawlShared {
    fn should_abort(&self) -> bool {
        (self.mode == CrawlMode::FullSite && !self.crawling.load(Ordering::Acquire))
            || *self.stop.borrow()
            || self.poison.is_tripped()
    }
}

/// Sites that finished a previous pass, or were interrupted mid-pass, flip
/// back to INDEXING for the new one. Other prior states keep showing until
/// the pass finalizes.
fn indexed_or_interrupted(site: &Site) -> bool {
    site.status == SiteStatus::Indexed
        || (site.status == SiteStatus::Failed && site.last_error == INTERRUPTED_BY_USER)
}

/// The trailing-slash twin of a URL.
fn slash_pair(url: &str) -> String {
    match url.strip_suffix('/') {
        Some(trimmed) => trimmed.to_string(),
        None => format!("{url}/"),
    }
}

/// Drive one site to quiescence and finalize its status. The dispatch loop
/// owns the `JoinSet`: links reported by finishing tasks are always visible
/// before `join_next` reaps the task that sent them, so the drain at the top
/// of the loop cannot miss a final batch.
pub(super) async fn run_site_crawl(
    shared: Arc<CrawlShared>,
    mut links: mpsc::UnboundedReceiver<Vec<String>>,
    db: &Database,
    seed_url: String,
) -> Result<()> {
    tracing::info!(site = %shared.site.url, mode = ?shared.mode, "crawl started");
    if shared.mode == CrawlMode::FullSite && indexed_or_interrupted(&shared.site) {
        db.set_site_status(shared.site.id, SiteStatus::Indexing, Some(""))
            .await?;
    }

    let mut tasks: JoinSet<()> = JoinSet::new();
    schedule_links(&mut tasks, &shared, vec![seed_url]).await;

    loop {
        if tasks.is_empty() {
            match links.try_recv() {
                Ok(batch) => {
                    schedule_links(&mut tasks, &shared, batch).await;
                    continue;
                }
                Err(_) => break,
            }
        }
        tokio::select! {
            Some(batch) = links.recv() => {
                schedule_links(&mut tasks, &shared, batch).await;
            }
            Some(joined) = tasks.join_next() => {
                if let Err(err) = joined {
                    if err.is_panic() {
                        tracing::error!(site = %shared.site.url, %err, "page task panicked");
                    }
                }
            }
        }
    }

    finalize(&shared, db).await
}

async fn finalize(shared: &CrawlShared, db: &Database) -> Result<()> {
    let site_id = shared.site.id;
    if let Some(message) = shared.poison.message() {
        db.set_site_status(site_id, SiteStatus::Failed, Some(&message))
            .await?;
        tracing::warn!(site = %shared.site.url, "crawl finalized after unexpected failure");
        return Ok(());
    }
    if shared.should_abort() {
        db.set_site_status(site_id, SiteStatus::Failed, Some(INTERRUPTED_BY_USER))
            .await?;
        tracing::info!(site = %shared.site.url, "crawl interrupted");
        return Ok(());
    }
    if shared.mode == CrawlMode::OnePage {
        db.set_site_status(site_id, SiteStatus::Indexed, Some("")).await?;
        tracing::info!(site = %shared.site.url, "page re-indexed");
        return Ok(());
    }

    let keep_paths = shared.stored_paths.lock().await.clone();
    if let Err(err) = shared.writer.remove_stale_pages(site_id, keep_paths).await {
        tracing::error!(site = %shared.site.url, %err, "reconciliation failed");
        shared.poison.trip(UNEXPECTED_FAILURE);
        shared.crawling.store(false, Ordering::Release);
        db.set_site_status(site_id, SiteStatus::Failed, Some(UNEXPECTED_FAILURE))
            .await?;
        return Ok(());
    }

    let indexed = shared.indexed_pages.load(Ordering::Acquire);
    if indexed > 0 {
        db.set_site_status(site_id, SiteStatus::Indexed, Some("")).await?;
        tracing::info!(site = %shared.site.url, pages = indexed, "crawl finished");
    } else {
        db.set_site_status(site_id, SiteStatus::Failed, Some(NOTHING_INDEXED))
            .await?;
        tracing::warn!(site = %shared.site.url, "crawl finished without indexing anything");
    }
    Ok(())
}

/// Visited bookkeeping and task spawning for a batch of filtered links.
/// Both slash forms are inserted together, so each URL is scheduled at most
/// once per crawl no matter which form a page links to.
async fn schedule_links(tasks: &mut JoinSet<()>, shared: &Arc<CrawlShared>, batch: Vec<String>) {
    if shared.should_abort() {
        return;
    }
    let mut visited = shared.visited.lock().await;
    for link in batch {
        if visited.contains(&link) {
            continue;
        }
        visited.insert(slash_pair(&link));
        visited.insert(link.clone());
        let shared = Arc::clone(shared);
        tasks.spawn(async move { page_task(shared, link).await });
    }
}

async fn page_task(shared: Arc<CrawlShared>, url: String) {
    let Ok(_permit) = shared.limiter.acquire().await else {
        return;
    };
    if shared.should_abort() || shared.quota.load(Ordering::Acquire) <= 0 {
        return;
    }

    politeness_sleep(&shared).await;
    if shared.should_abort() {
        return;
    }

    let fetched = match shared.fetcher.fetch(&url).await {
        Ok(fetched) => fetched,
        Err(err) => {
            tracing::debug!(url = %url, %err, "fetch failed, dropping branch");
            return;
        }
    };
    if shared.should_abort() {
        return;
    }
    if !fetched.is_text() {
        tracing::debug!(url = %url, content_type = %fetched.content_type, "not text, skipping");
        return;
    }

    // Error statuses still get a page row, just with nothing extracted.
    let analysis = if fetched.is_indexable_status() {
        extract::analyze_page(
            &shared.morphology,
            &shared.field_rules,
            &fetched.final_url,
            &fetched.body,
        )
    } else {
        PageAnalysis {
            lemmas: Vec::new(),
            fingerprint: extract::fingerprint_of(&[]),
            links: Vec::new(),
        }
    };

    let left = shared.quota.fetch_sub(1, Ordering::AcqRel) - 1;
    if left < 0 {
        return;
    }

    let path = extract::page_path(&url, &shared.site.url);
    let record = PageRecord {
        site_id: shared.site.id,
        path: path.clone(),
        code: i64::from(fetched.status),
        content: fetched.body,
        fingerprint: analysis.fingerprint,
    };
    match shared.writer.upsert_page(record, analysis.lemmas).await {
        Ok(outcome) => {
            shared.stored_paths.lock().await.insert(path);
            shared.indexed_pages.fetch_add(1, Ordering::AcqRel);
            tracing::debug!(url = %url, ?outcome, "page stored");
        }
        Err(err) => {
            tracing::error!(url = %url, %err, "index write failed, poisoning crawl");
            shared.poison.trip(UNEXPECTED_FAILURE);
            shared.crawling.store(false, Ordering::Release);
            return;
        }
    }

    if shared.mode == CrawlMode::OnePage {
        return;
    }
    let survivors = extract::filter_links(
        analysis.links,
        &shared.site.url,
        &shared.robots,
        Utc::now().year(),
    );
    if !survivors.is_empty() {
        let _ = shared.links.send(survivors);
    }
}

/// Random crawl delay, cut short when the site is told to stop or the
/// crawl is poisoned.
async fn politeness_sleep(shared: &CrawlShared) {
    let delay_ms = {
        let mut rng = rand::rng();
        rng.random_range(shared.config.delay_min_ms..=shared.config.delay_max_ms)
    };
    let mut stop = shared.stop.clone();
    let mut poisoned = shared.poison.subscribe();
    tokio::select! {
        _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
        _ = stop.wait_for(|stopped| *stopped) => {}
        _ = poisoned.wait_for(|tripped| *tripped) => {}
    }
}
