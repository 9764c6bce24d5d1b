//! Lemma-based search over the inverted index.

use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;

use super::snippet;
use crate::config::{SearchConfig, canonical_site_url};
use crate::crawler::{page_body_text, page_title};
use crate::error::{Error, OperatorError, Result};
use crate::morphology::{self, Morphology};
use crate::storage::Database;
use crate::storage::models::{Site, SiteStatus};

/// One search hit, ready for serialization.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    /// Root URL of the owning site.
    pub site: String,
    pub site_name: String,
    /// Page path below the site root.
    pub uri: String,
    pub title: String,
    pub snippet: String,
    /// Normalized to the best match of the whole result set; the top result
    /// scores exactly 1.0.
    pub relevance: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    /// Total matches before offset/limit.
    pub count: i64,
    pub results: Vec<SearchResult>,
    /// The query minus dropped words, present only when something was
    /// dropped by the popularity filter or by relaxation.
    pub corrected_query: Option<String>,
}

pub struct SearchEngine {
    db: Database,
    morphology: Arc<Morphology>,
    config: SearchConfig,
}

impl SearchEngine {
    pub fn new(db: Database, morphology: Arc<Morphology>, config: SearchConfig) -> Self {
        Self {
            db,
            morphology,
            config,
        }
    }

    /// Run a query against one site or every indexed site.
    pub async fn search(
        &self,
        query: &str,
        site: Option<&str>,
        offset: Option<i64>,
        limit: Option<i64>,
    ) -> Result<SearchOutcome> {
        let lemma_counts = self.morphology.normalize(query);
        if lemma_counts.is_empty() {
            return Err(OperatorError::EmptyQuery.into());
        }
        let scope = self.resolve_scope(site).await?;
        let site_ids: Vec<i64> = scope.iter().map(|site| site.id).collect();

        // Lemmas seen on most of the scope discriminate nothing and are
        // dropped up front.
        let total_pages = self.db.count_pages_in_scope(&site_ids).await?;
        let mut query_lemmas: Vec<String> = lemma_counts.into_keys().collect();
        query_lemmas.sort();
        let mut dropped_any = false;
        let mut kept: Vec<String> = Vec::new();
        for lemma in query_lemmas {
            let pages_with = self.db.count_pages_with_lemma(&site_ids, &lemma).await?;
            if total_pages > 0
                && pages_with as f64 / total_pages as f64 >= self.config.popularity_threshold
            {
                tracing::debug!(lemma = %lemma, "dropped as too popular");
                dropped_any = true;
                continue;
            }
            kept.push(lemma);
        }
        if kept.is_empty() {
            return Err(OperatorError::NothingFound.into());
        }

        // Rarest first, so relaxation sheds the least selective constraint
        // last.
        let mut by_frequency: Vec<(i64, String)> = Vec::with_capacity(kept.len());
        for lemma in kept {
            let frequency = self.db.corpus_frequency(&site_ids, &lemma).await?;
            by_frequency.push((frequency, lemma));
        }
        by_frequency.sort();
        let mut surviving: Vec<String> = by_frequency.into_iter().map(|(_, lemma)| lemma).collect();

        let all_pages = self.db.page_ids_in_scope(&site_ids).await?;
        let mut relaxed = dropped_any;
        let candidates: Vec<i64> = loop {
            match self.intersect(&site_ids, &surviving, &all_pages).await? {
                Some(pages) => break pages,
                None => {
                    let dropped = surviving.remove(0);
                    tracing::debug!(lemma = %dropped, "relaxed out of the query");
                    relaxed = true;
                    if surviving.is_empty() {
                        return Err(OperatorError::NothingFound.into());
                    }
                }
            }
        };

        let corrected_query = relaxed.then(|| keep_known_words(&self.morphology, query, &surviving));

        let scored = self.db.scored_pages(&surviving, &candidates).await?;
        let Some(top) = scored.first() else {
            return Err(OperatorError::NothingFound.into());
        };
        let divisor = if top.relevance > 0.0 { top.relevance } else { 1.0 };
        let count = scored.len() as i64;

        let offset = offset.unwrap_or(0).max(0) as usize;
        let limit = limit.unwrap_or(self.config.default_limit).max(0) as usize;

        // Title and snippet extraction parse HTML, so fan the page slice out
        // over blocking workers.
        let snippet_source = corrected_query.clone().unwrap_or_else(|| query.to_string());
        let snippet_words: Arc<Vec<String>> = Arc::new(
            morphology::split_words(&snippet_source)
                .into_iter()
                .map(|word| word.to_lowercase())
                .collect(),
        );
        let before = self.config.snippet_words_before;
        let after = self.config.snippet_words_after;
        let tasks: Vec<_> = scored
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|row| {
                let morphology = Arc::clone(&self.morphology);
                let words = Arc::clone(&snippet_words);
                tokio::task::spawn_blocking(move || {
                    let title = page_title(&row.content);
                    let body = page_body_text(&row.content);
                    let highlighted = snippet::build_snippet(&morphology, &body, &words, before, after);
                    SearchResult {
                        site: row.site_url,
                        site_name: row.site_name,
                        uri: row.path,
                        title,
                        snippet: highlighted,
                        relevance: row.relevance / divisor,
                    }
                })
            })
            .collect();

        let mut results = Vec::with_capacity(tasks.len());
        for joined in join_all(tasks).await {
            results.push(joined.map_err(|err| Error::Internal(format!("result assembly failed: {err}")))?);
        }

        Ok(SearchOutcome {
            count,
            results,
            corrected_query,
        })
    }

    /// The named site when it is known and INDEXED, otherwise every INDEXED
    /// site. An empty scope is the operator's "no indexed sites" error.
    async fn resolve_scope(&self, site: Option<&str>) -> Result<Vec<Site>> {
        let sites = match site {
            Some(url) => {
                let canonical = canonical_site_url(url);
                match self.db.site_by_url(&canonical).await? {
                    Some(site) if site.status == SiteStatus::Indexed => vec![site],
                    _ => Vec::new(),
                }
            }
            None => self.db.indexed_sites().await?,
        };
        if sites.is_empty() {
            return Err(OperatorError::NoSitesToSearch.into());
        }
        Ok(sites)
    }

    /// Restrict the scope's pages to those holding every lemma, in order.
    /// `None` signals an emptied intersection, asking for relaxation.
    async fn intersect(
        &self,
        site_ids: &[i64],
        lemmas: &[String],
        all_pages: &[i64],
    ) -> Result<Option<Vec<i64>>> {
        let mut candidates = all_pages.to_vec();
        for lemma in lemmas {
            candidates = self.db.page_ids_with_lemma(site_ids, lemma, &candidates).await?;
            if candidates.is_empty() {
                return Ok(None);
            }
        }
        Ok(Some(candidates))
    }
}

/// The original query reduced to the words whose normal forms survived,
/// keeping the user's own casing and order.
fn keep_known_words(morphology: &Morphology, query: &str, surviving: &[String]) -> String {
    let words = morphology::split_words(query);
    words
        .into_iter()
        .filter(|word| {
            morphology
                .word_forms(word)
                .iter()
                .any(|form| surviving.contains(form))
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::indexer::{IndexWriter, PageRecord, WeightedLemma};

    struct Fixture {
        engine: SearchEngine,
        db: Database,
        writer: IndexWriter,
        morphology: Arc<Morphology>,
    }

    async fn fixture() -> Fixture {
        let db = Database::connect_in_memory().await.expect("database");
        let writer = IndexWriter::spawn(db.clone());
        let morphology = Arc::new(Morphology::new());
        let engine = SearchEngine::new(
            db.clone(),
            Arc::clone(&morphology),
            AppConfig::load(None).expect("config").search,
        );
        Fixture {
            engine,
            db,
            writer,
            morphology,
        }
    }

    impl Fixture {
        async fn indexed_site(&self, url: &str, name: &str) -> i64 {
            let site = self.db.upsert_site_seed(url, name).await.expect("site");
            self.db
                .set_site_status(site.id, SiteStatus::Indexed, Some(""))
                .await
                .expect("status");
            site.id
        }

        /// Store a page whose postings use the normal forms of `words`, so
        /// test lemmas always line up with what query normalization produces.
        async fn page(&self, site_id: i64, path: &str, html: &str, words: &[(&str, f64, i64)]) {
            let lemmas = words
                .iter()
                .map(|(word, rank, count)| WeightedLemma {
                    lemma: self.form_of(word),
                    rank: *rank,
                    count: *count,
                })
                .collect();
            self.writer
                .upsert_page(
                    PageRecord {
                        site_id,
                        path: path.to_string(),
                        code: 200,
                        content: html.to_string(),
                        fingerprint: format!("fp:{site_id}:{path}"),
                    },
                    lemmas,
                )
                .await
                .expect("store page");
        }

        fn form_of(&self, word: &str) -> String {
            self.morphology
                .word_forms(word)
                .into_iter()
                .next()
                .expect("word has a normal form")
        }
    }

    #[tokio::test]
    async fn popularity_dropped_word_reports_a_corrected_query() {
        let fx = fixture().await;
        let site_id = fx.indexed_site("https://site.test", "Test").await;
        let granite_html =
            "<html><head><title>Granite page</title></head><body>Solid granite here.</body></html>";
        fx.page(
            site_id,
            "/a",
            granite_html,
            &[("pebble", 0.8, 1), ("granite", 1.0, 1)],
        )
        .await;
        fx.page(
            site_id,
            "/b",
            "<html><head><title>Pebbles</title></head><body>Pebble beach.</body></html>",
            &[("pebble", 0.8, 1)],
        )
        .await;

        let outcome = fx
            .engine
            .search("pebble granite", None, None, None)
            .await
            .expect("search");

        assert_eq!(outcome.corrected_query.as_deref(), Some("granite"));
        assert_eq!(outcome.count, 1);
        assert_eq!(outcome.results.len(), 1);
        let hit = &outcome.results[0];
        assert_eq!(hit.uri, "/a");
        assert_eq!(hit.title, "Granite page");
        assert_eq!(hit.relevance, 1.0);
        assert!(hit.snippet.contains("<b>granite</b>"), "snippet: {}", hit.snippet);
    }

    #[tokio::test]
    async fn relaxation_drops_the_rarest_lemma_first() {
        let fx = fixture().await;
        let site_id = fx.indexed_site("https://site.test", "Test").await;
        fx.page(
            site_id,
            "/rare",
            "<html><body>basalt</body></html>",
            &[("basalt", 1.0, 1)],
        )
        .await;
        fx.page(
            site_id,
            "/common",
            "<html><head><title>Granite</title></head><body>granite granite</body></html>",
            &[("granite", 2.0, 2)],
        )
        .await;

        // No page holds both words; the rarest (basalt, frequency 1) gives
        // way and granite alone decides the result.
        let outcome = fx
            .engine
            .search("basalt granite", None, None, None)
            .await
            .expect("search");

        assert_eq!(outcome.corrected_query.as_deref(), Some("granite"));
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].uri, "/common");
    }

    #[tokio::test]
    async fn relevance_is_normalized_before_pagination() {
        let fx = fixture().await;
        let site_id = fx.indexed_site("https://site.test", "Test").await;
        for (path, rank) in [("/top", 3.0), ("/mid", 2.0), ("/low", 1.0)] {
            fx.page(
                site_id,
                path,
                "<html><head><title>t</title></head><body>granite</body></html>",
                &[("granite", rank, 1)],
            )
            .await;
        }
        // Keeps "granite" under the popularity threshold.
        fx.page(
            site_id,
            "/other",
            "<html><body>basalt</body></html>",
            &[("basalt", 1.0, 1)],
        )
        .await;

        let full = fx
            .engine
            .search("granite", None, None, None)
            .await
            .expect("search");
        assert_eq!(full.count, 3);
        assert_eq!(full.results[0].relevance, 1.0);
        assert!(full.corrected_query.is_none());

        let page_two = fx
            .engine
            .search("granite", None, Some(1), Some(1))
            .await
            .expect("search");
        assert_eq!(page_two.count, 3, "count covers the whole result set");
        assert_eq!(page_two.results.len(), 1);
        assert_eq!(page_two.results[0].uri, "/mid");
        let expected = 2.0 / 3.0;
        assert!((page_two.results[0].relevance - expected).abs() < 1e-9);
    }

    #[tokio::test]
    async fn site_parameter_narrows_the_scope() {
        let fx = fixture().await;
        let first = fx.indexed_site("https://one.test", "One").await;
        let second = fx.indexed_site("https://two.test", "Two").await;
        let html = "<html><head><title>t</title></head><body>granite</body></html>";
        fx.page(first, "/a", html, &[("granite", 1.0, 1)]).await;
        fx.page(second, "/b", html, &[("granite", 1.0, 1)]).await;
        fx.page(
            second,
            "/c",
            "<html><body>basalt</body></html>",
            &[("basalt", 1.0, 1)],
        )
        .await;

        let scoped = fx
            .engine
            .search("granite", Some("https://two.test/"), None, None)
            .await
            .expect("search");
        assert_eq!(scoped.count, 1);
        assert_eq!(scoped.results[0].uri, "/b");
        assert_eq!(scoped.results[0].site, "https://two.test");
        assert_eq!(scoped.results[0].site_name, "Two");
    }

    #[tokio::test]
    async fn operator_errors_cover_the_empty_paths() {
        let fx = fixture().await;

        let empty = fx.engine.search("...", None, None, None).await;
        assert!(matches!(
            empty,
            Err(Error::Operator(OperatorError::EmptyQuery))
        ));

        // A site exists but is not INDEXED yet.
        fx.db
            .upsert_site_seed("https://site.test", "Test")
            .await
            .expect("site");
        let no_scope = fx.engine.search("granite", None, None, None).await;
        assert!(matches!(
            no_scope,
            Err(Error::Operator(OperatorError::NoSitesToSearch))
        ));

        let site_id = fx.indexed_site("https://site.test", "Test").await;
        fx.page(
            site_id,
            "/a",
            "<html><body>granite</body></html>",
            &[("granite", 1.0, 1)],
        )
        .await;
        let missing = fx.engine.search("basalt", None, None, None).await;
        assert!(matches!(
            missing,
            Err(Error::Operator(OperatorError::NothingFound))
        ));
    }
}
