//! Registry of running site crawls and the operations driving them.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::sync::{Mutex, Semaphore, mpsc, watch};
use tokio::task::JoinHandle;

use super::extract;
use super::fetch::Fetch;
use super::robots;
use super::site::{self, CrawlMode, CrawlShared};
use crate::config::AppConfig;
use crate::error::{Error, OperatorError, Result};
use crate::indexer::IndexWriter;
use crate::morphology::Morphology;
use crate::storage::Database;
use crate::storage::models::{FieldRule, Site, SiteStatus};

/// First unexpected failure of a crawl run. Every site sharing the slot
/// finalizes FAILED with the same message; later trips are ignored.
/// Tripping also wakes any task parked in a politeness delay.
#[derive(Clone)]
pub(crate) struct PoisonSlot {
    message: Arc<OnceLock<String>>,
    tripped: watch::Sender<bool>,
}

impl Default for PoisonSlot {
    fn default() -> Self {
        let (tripped, _) = watch::channel(false);
        Self {
            message: Arc::new(OnceLock::new()),
            tripped,
        }
    }
}

impl PoisonSlot {
    pub(crate) fn trip(&self, message: &str) {
        let _ = self.message.set(message.to_string());
        self.tripped.send_replace(true);
    }

    pub(crate) fn message(&self) -> Option<String> {
        self.message.get().cloned()
    }

    pub(crate) fn is_tripped(&self) -> bool {
        self.message.get().is_some()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<bool> {
        self.tripped.subscribe()
    }
}

struct SiteHandle {
    stop: watch::Sender<bool>,
    done: JoinHandle<()>,
}

struct ManagerInner {
    db: Database,
    writer: IndexWriter,
    fetcher: Arc<dyn Fetch>,
    morphology: Arc<Morphology>,
    config: AppConfig,
    /// Set for the duration of a full indexing run.
    crawling: Arc<AtomicBool>,
    registry: Mutex<HashMap<i64, SiteHandle>>,
}

impl ManagerInner {
    /// Drop a finished site from the registry; the last one out clears the
    /// crawling flag.
    async fn deregister(self: &Arc<Self>, site_id: i64) {
        let mut registry = self.registry.lock().await;
        registry.remove(&site_id);
        if registry.is_empty() {
            self.crawling.store(false, Ordering::Release);
        }
    }
}

/// Owner of all crawl activity. One mutex-guarded map of running sites,
/// keyed by site id; each entry holds the stop signal and the join handle
/// of that site's coordinator task.
#[derive(Clone)]
pub struct CrawlManager {
    inner: Arc<ManagerInner>,
}

impl CrawlManager {
    pub fn new(
        db: Database,
        writer: IndexWriter,
        fetcher: Arc<dyn Fetch>,
        morphology: Arc<Morphology>,
        config: AppConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                db,
                writer,
                fetcher,
                morphology,
                config,
                crawling: Arc::new(AtomicBool::new(false)),
                registry: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Whether a full indexing run is active.
    pub fn is_crawling(&self) -> bool {
        self.inner.crawling.load(Ordering::Acquire)
    }

    /// Number of sites currently registered, single-page re-indexes included.
    pub async fn active_crawls(&self) -> usize {
        self.inner.registry.lock().await.len()
    }

    /// Launch a full crawl of every configured site.
    pub async fn start_all(&self) -> Result<()> {
        if self.inner.crawling.swap(true, Ordering::AcqRel) {
            return Err(OperatorError::IndexingAlreadyRunning.into());
        }
        let (sites, field_rules) = match self.load_seed_data().await {
            Ok(pair) => pair,
            Err(err) => {
                self.inner.crawling.store(false, Ordering::Release);
                return Err(err);
            }
        };

        let poison = PoisonSlot::default();
        let mut registry = self.inner.registry.lock().await;
        let mut launched = 0usize;
        for site in sites {
            if registry.contains_key(&site.id) {
                tracing::warn!(site = %site.url, "site is already being crawled, skipped");
                continue;
            }
            let seed = site.url.clone();
            launch_site(
                &self.inner,
                &mut registry,
                site,
                seed,
                CrawlMode::FullSite,
                field_rules.clone(),
                poison.clone(),
            );
            launched += 1;
        }
        drop(registry);

        if launched == 0 {
            self.inner.crawling.store(false, Ordering::Release);
            return Err(OperatorError::IndexingAlreadyRunning.into());
        }
        tracing::info!(sites = launched, "indexing started");
        Ok(())
    }

    /// Interrupt every registered crawl and wait for the sites to finalize.
    pub async fn stop_all(&self) -> Result<()> {
        if !self.inner.crawling.swap(false, Ordering::AcqRel) {
            return Err(OperatorError::IndexingNotRunning.into());
        }
        let handles: Vec<SiteHandle> = {
            let mut registry = self.inner.registry.lock().await;
            registry.drain().map(|(_, handle)| handle).collect()
        };
        for handle in &handles {
            let _ = handle.stop.send(true);
        }
        for handle in handles {
            if let Err(err) = handle.done.await {
                if err.is_panic() {
                    tracing::error!(%err, "crawl task panicked while stopping");
                }
            }
        }
        tracing::info!("indexing stopped");
        Ok(())
    }

    /// Re-index a single URL belonging to a configured site. Launches a
    /// one-page crawl and returns without waiting for it; the global
    /// crawling flag is not touched.
    pub async fn index_page(&self, url: &str) -> Result<()> {
        let page_url = extract::decode_link(url.trim());
        if let Some(mime) = guessed_content_type(&page_url) {
            return Err(OperatorError::UnsupportedContent(mime.to_string()).into());
        }
        let Some(seed) = self.inner.config.site_for_url(&page_url) else {
            return Err(OperatorError::PageOutsideConfiguredSites.into());
        };
        let Some(site) = self.inner.db.site_by_url(&seed.url).await? else {
            return Err(Error::Internal(format!(
                "configured site {} is missing from storage",
                seed.url
            )));
        };
        let field_rules = self.inner.db.list_field_rules().await?;

        let mut registry = self.inner.registry.lock().await;
        if registry.contains_key(&site.id) {
            return Err(OperatorError::IndexingAlreadyRunning.into());
        }
        tracing::info!(url = %page_url, site = %site.url, "single page re-index launched");
        launch_site(
            &self.inner,
            &mut registry,
            site,
            page_url,
            CrawlMode::OnePage,
            field_rules,
            PoisonSlot::default(),
        );
        Ok(())
    }

    async fn load_seed_data(&self) -> Result<(Vec<Site>, Vec<FieldRule>)> {
        let sites = self.inner.db.list_sites().await?;
        if sites.is_empty() {
            return Err(Error::Internal("no sites are configured".to_string()));
        }
        let field_rules = self.inner.db.list_field_rules().await?;
        Ok((sites, field_rules))
    }
}

/// Register a site and spawn its coordinator. The caller holds the registry
/// lock, so the handle is visible before the task can try to deregister.
fn launch_site(
    inner: &Arc<ManagerInner>,
    registry: &mut HashMap<i64, SiteHandle>,
    site: Site,
    seed_url: String,
    mode: CrawlMode,
    field_rules: Vec<FieldRule>,
    poison: PoisonSlot,
) {
    let (stop_tx, stop_rx) = watch::channel(false);
    let site_id = site.id;
    let task_inner = Arc::clone(inner);
    let done = tokio::spawn(async move {
        run_crawl(task_inner, site, seed_url, mode, field_rules, poison, stop_rx).await;
    });
    registry.insert(site_id, SiteHandle { stop: stop_tx, done });
}

async fn run_crawl(
    inner: Arc<ManagerInner>,
    site: Site,
    seed_url: String,
    mode: CrawlMode,
    field_rules: Vec<FieldRule>,
    poison: PoisonSlot,
    stop: watch::Receiver<bool>,
) {
    let robots = robots::load_robots(
        inner.fetcher.as_ref(),
        &site.url,
        &inner.config.crawl.user_agent,
    )
    .await;

    let site_id = site.id;
    let site_url = site.url.clone();
    let (links_tx, links_rx) = mpsc::unbounded_channel();
    let quota = match mode {
        CrawlMode::FullSite => inner.config.crawl.page_limit,
        CrawlMode::OnePage => 1,
    };
    let shared = Arc::new(CrawlShared {
        site,
        mode,
        config: inner.config.crawl.clone(),
        fetcher: Arc::clone(&inner.fetcher),
        morphology: Arc::clone(&inner.morphology),
        field_rules,
        robots,
        writer: inner.writer.clone(),
        crawling: Arc::clone(&inner.crawling),
        stop,
        poison,
        quota: AtomicI64::new(quota),
        indexed_pages: AtomicUsize::new(0),
        stored_paths: Mutex::new(HashSet::new()),
        visited: Mutex::new(HashSet::new()),
        links: links_tx,
        limiter: Arc::new(Semaphore::new(inner.config.crawl.workers)),
    });

    if let Err(err) = site::run_site_crawl(shared, links_rx, &inner.db, seed_url).await {
        tracing::error!(site = %site_url, %err, "crawl coordinator failed");
        let failed = inner
            .db
            .set_site_status(site_id, SiteStatus::Failed, Some(site::UNEXPECTED_FAILURE))
            .await;
        if let Err(status_err) = failed {
            tracing::error!(site = %site_url, %status_err, "could not record crawl failure");
        }
    }
    inner.deregister(site_id).await;
}

/// Extension-based content-type guess. Single-page requests for URLs that
/// guess to a non-text type are rejected before any fetch.
fn guessed_content_type(url: &str) -> Option<&'static str> {
    let path = match url.split_once(['?', '#']) {
        Some((path, _)) => path,
        None => url,
    };
    let segment = path.rsplit('/').next().unwrap_or(path);
    let (_, extension) = segment.rsplit_once('.')?;
    match extension.to_ascii_lowercase().as_str() {
        "pdf" => Some("application/pdf"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "svg" => Some("image/svg+xml"),
        "zip" => Some("application/zip"),
        "doc" | "docx" => Some("application/msword"),
        "xls" | "xlsx" => Some("application/vnd.ms-excel"),
        "mp3" => Some("audio/mpeg"),
        "mp4" => Some("video/mp4"),
        _ => None,
    }
}
