//! SQLite persistence for sites, pages, lemmas, and the inverted index.

pub mod models;

use std::str::FromStr;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool, Transaction};

use crate::error::Result;
use models::{FieldRule, IndexEntry, Lemma, Page, ScoredPage, Site, SiteStatus};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS site (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    status TEXT NOT NULL,
    status_time TEXT NOT NULL,
    last_error TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS page (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    site_id INTEGER NOT NULL REFERENCES site(id) ON DELETE CASCADE,
    path TEXT NOT NULL,
    code INTEGER NOT NULL,
    content TEXT NOT NULL,
    fingerprint TEXT NOT NULL,
    UNIQUE (site_id, path)
);
CREATE TABLE IF NOT EXISTS lemma (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    site_id INTEGER NOT NULL REFERENCES site(id) ON DELETE CASCADE,
    lemma TEXT NOT NULL,
    frequency INTEGER NOT NULL,
    UNIQUE (site_id, lemma)
);
CREATE TABLE IF NOT EXISTS index_entry (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    page_id INTEGER NOT NULL REFERENCES page(id) ON DELETE CASCADE,
    lemma_id INTEGER NOT NULL REFERENCES lemma(id) ON DELETE CASCADE,
    rank REAL NOT NULL,
    count INTEGER NOT NULL,
    UNIQUE (page_id, lemma_id)
);
CREATE TABLE IF NOT EXISTS field_rule (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    selector TEXT NOT NULL,
    weight REAL NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_page_site ON page (site_id);
CREATE INDEX IF NOT EXISTS idx_lemma_site ON lemma (site_id);
CREATE INDEX IF NOT EXISTS idx_entry_page ON index_entry (page_id);
CREATE INDEX IF NOT EXISTS idx_entry_lemma ON index_entry (lemma_id);
"#;

/// Pooled handle over the SQLite database. Reads run concurrently on the
/// pool; all index mutation goes through the single writer (`indexer`),
/// which serializes its transactions.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;
        let db = Self { pool };
        db.ensure_schema().await?;
        Ok(db)
    }

    /// A single-connection in-memory database for tests.
    #[cfg(test)]
    pub(crate) async fn connect_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        let db = Self { pool };
        db.ensure_schema().await?;
        Ok(db)
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    // Sites.

    /// Insert a configured site or refresh its name. New sites start FAILED
    /// until their first crawl.
    pub async fn upsert_site_seed(&self, url: &str, name: &str) -> Result<Site> {
        let site = sqlx::query_as::<_, Site>(
            "INSERT INTO site (url, name, status, status_time, last_error) \
             VALUES (?, ?, 'FAILED', ?, 'not yet indexed') \
             ON CONFLICT (url) DO UPDATE SET name = excluded.name \
             RETURNING id, url, name, status, status_time, last_error",
        )
        .bind(url)
        .bind(name)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(site)
    }

    pub async fn list_sites(&self) -> Result<Vec<Site>> {
        let sites = sqlx::query_as::<_, Site>(
            "SELECT id, url, name, status, status_time, last_error FROM site ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(sites)
    }

    pub async fn site_by_id(&self, id: i64) -> Result<Option<Site>> {
        let site = sqlx::query_as::<_, Site>(
            "SELECT id, url, name, status, status_time, last_error FROM site WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(site)
    }

    pub async fn site_by_url(&self, url: &str) -> Result<Option<Site>> {
        let site = sqlx::query_as::<_, Site>(
            "SELECT id, url, name, status, status_time, last_error FROM site WHERE url = ?",
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(site)
    }

    pub async fn indexed_sites(&self) -> Result<Vec<Site>> {
        let sites = sqlx::query_as::<_, Site>(
            "SELECT id, url, name, status, status_time, last_error FROM site \
             WHERE status = 'INDEXED' ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(sites)
    }

    /// Transition a site's status in one atomic row update. `last_error`
    /// replaces the stored message when given, otherwise the old one stays.
    pub async fn set_site_status(
        &self,
        id: i64,
        status: SiteStatus,
        last_error: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE site SET status = ?, status_time = ?, \
             last_error = COALESCE(?, last_error) WHERE id = ?",
        )
        .bind(status)
        .bind(Utc::now())
        .bind(last_error)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Mark sites a dead process left INDEXING as failed. Returns how many
    /// were touched.
    pub async fn fail_stuck_sites(&self, message: &str) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE site SET status = 'FAILED', status_time = ?, last_error = ? \
             WHERE status = 'INDEXING'",
        )
        .bind(Utc::now())
        .bind(message)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    // Pages.

    pub async fn page_by_path(
        conn: &mut SqliteConnection,
        site_id: i64,
        path: &str,
    ) -> Result<Option<Page>> {
        let page = sqlx::query_as::<_, Page>(
            "SELECT id, site_id, path, code, content, fingerprint FROM page \
             WHERE site_id = ? AND path = ?",
        )
        .bind(site_id)
        .bind(path)
        .fetch_optional(conn)
        .await?;
        Ok(page)
    }

    pub async fn insert_page(
        conn: &mut SqliteConnection,
        site_id: i64,
        path: &str,
        code: i64,
        content: &str,
        fingerprint: &str,
    ) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO page (site_id, path, code, content, fingerprint) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(site_id)
        .bind(path)
        .bind(code)
        .bind(content)
        .bind(fingerprint)
        .execute(conn)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn update_page(
        conn: &mut SqliteConnection,
        id: i64,
        code: i64,
        content: &str,
        fingerprint: &str,
    ) -> Result<()> {
        sqlx::query("UPDATE page SET code = ?, content = ?, fingerprint = ? WHERE id = ?")
            .bind(code)
            .bind(content)
            .bind(fingerprint)
            .bind(id)
            .execute(conn)
            .await?;
        Ok(())
    }

    pub async fn delete_page(conn: &mut SqliteConnection, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM page WHERE id = ?")
            .bind(id)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// (id, path) of every stored page of a site, for stale reconciliation.
    pub async fn page_ids_and_paths(
        conn: &mut SqliteConnection,
        site_id: i64,
    ) -> Result<Vec<(i64, String)>> {
        let rows = sqlx::query_as::<_, (i64, String)>(
            "SELECT id, path FROM page WHERE site_id = ? ORDER BY id",
        )
        .bind(site_id)
        .fetch_all(conn)
        .await?;
        Ok(rows)
    }

    // Lemmas and index entries (writer-transaction scope).

    pub async fn lemma_by_text(
        conn: &mut SqliteConnection,
        site_id: i64,
        text: &str,
    ) -> Result<Option<Lemma>> {
        let lemma = sqlx::query_as::<_, Lemma>(
            "SELECT id, site_id, lemma, frequency FROM lemma WHERE site_id = ? AND lemma = ?",
        )
        .bind(site_id)
        .bind(text)
        .fetch_optional(conn)
        .await?;
        Ok(lemma)
    }

    pub async fn insert_lemma(
        conn: &mut SqliteConnection,
        site_id: i64,
        text: &str,
        frequency: i64,
    ) -> Result<i64> {
        let result = sqlx::query("INSERT INTO lemma (site_id, lemma, frequency) VALUES (?, ?, ?)")
            .bind(site_id)
            .bind(text)
            .bind(frequency)
            .execute(conn)
            .await?;
        Ok(result.last_insert_rowid())
    }

    /// Adjust a lemma's corpus frequency and return the new value.
    pub async fn add_lemma_frequency(
        conn: &mut SqliteConnection,
        id: i64,
        delta: i64,
    ) -> Result<i64> {
        let frequency: i64 =
            sqlx::query_scalar("UPDATE lemma SET frequency = frequency + ? WHERE id = ? RETURNING frequency")
                .bind(delta)
                .bind(id)
                .fetch_one(conn)
                .await?;
        Ok(frequency)
    }

    pub async fn delete_lemma(conn: &mut SqliteConnection, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM lemma WHERE id = ?")
            .bind(id)
            .execute(conn)
            .await?;
        Ok(())
    }

    pub async fn entries_for_page(
        conn: &mut SqliteConnection,
        page_id: i64,
    ) -> Result<Vec<IndexEntry>> {
        let entries = sqlx::query_as::<_, IndexEntry>(
            "SELECT id, page_id, lemma_id, rank, count FROM index_entry WHERE page_id = ?",
        )
        .bind(page_id)
        .fetch_all(conn)
        .await?;
        Ok(entries)
    }

    pub async fn delete_entries_for_page(conn: &mut SqliteConnection, page_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM index_entry WHERE page_id = ?")
            .bind(page_id)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Insert a posting or fold another field's contribution into it.
    pub async fn upsert_index_entry(
        conn: &mut SqliteConnection,
        page_id: i64,
        lemma_id: i64,
        rank: f64,
        count: i64,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO index_entry (page_id, lemma_id, rank, count) VALUES (?, ?, ?, ?) \
             ON CONFLICT (page_id, lemma_id) DO UPDATE \
             SET rank = rank + excluded.rank, count = count + excluded.count",
        )
        .bind(page_id)
        .bind(lemma_id)
        .bind(rank)
        .bind(count)
        .execute(conn)
        .await?;
        Ok(())
    }

    // Search support (read-only, pool scope).

    pub async fn page_ids_in_scope(&self, site_ids: &[i64]) -> Result<Vec<i64>> {
        if site_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT id FROM page WHERE site_id IN (");
        push_id_list(&mut qb, site_ids);
        qb.push(") ORDER BY id");
        let ids = qb.build_query_scalar().fetch_all(&self.pool).await?;
        Ok(ids)
    }

    pub async fn count_pages_in_scope(&self, site_ids: &[i64]) -> Result<i64> {
        if site_ids.is_empty() {
            return Ok(0);
        }
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM page WHERE site_id IN (");
        push_id_list(&mut qb, site_ids);
        qb.push(")");
        let count = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(count)
    }

    /// Distinct pages of the scope containing the lemma; the popularity
    /// filter's numerator.
    pub async fn count_pages_with_lemma(&self, site_ids: &[i64], lemma: &str) -> Result<i64> {
        if site_ids.is_empty() {
            return Ok(0);
        }
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT COUNT(DISTINCT ie.page_id) FROM index_entry ie \
             JOIN lemma l ON l.id = ie.lemma_id WHERE l.lemma = ",
        );
        qb.push_bind(lemma);
        qb.push(" AND l.site_id IN (");
        push_id_list(&mut qb, site_ids);
        qb.push(")");
        let count = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(count)
    }

    /// Summed corpus frequency of a lemma across the scope, for relaxation
    /// ordering.
    pub async fn corpus_frequency(&self, site_ids: &[i64], lemma: &str) -> Result<i64> {
        if site_ids.is_empty() {
            return Ok(0);
        }
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT COALESCE(SUM(frequency), 0) FROM lemma WHERE lemma = ",
        );
        qb.push_bind(lemma);
        qb.push(" AND site_id IN (");
        push_id_list(&mut qb, site_ids);
        qb.push(")");
        let frequency = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(frequency)
    }

    /// The subset of `candidates` having a posting for the lemma.
    pub async fn page_ids_with_lemma(
        &self,
        site_ids: &[i64],
        lemma: &str,
        candidates: &[i64],
    ) -> Result<Vec<i64>> {
        if site_ids.is_empty() || candidates.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT DISTINCT ie.page_id FROM index_entry ie \
             JOIN lemma l ON l.id = ie.lemma_id WHERE l.lemma = ",
        );
        qb.push_bind(lemma);
        qb.push(" AND l.site_id IN (");
        push_id_list(&mut qb, site_ids);
        qb.push(") AND ie.page_id IN (");
        push_id_list(&mut qb, candidates);
        qb.push(") ORDER BY ie.page_id");
        let ids = qb.build_query_scalar().fetch_all(&self.pool).await?;
        Ok(ids)
    }

    /// Candidate pages joined with their site and the relevance sum over the
    /// surviving lemmas, best first.
    pub async fn scored_pages(
        &self,
        lemmas: &[String],
        candidates: &[i64],
    ) -> Result<Vec<ScoredPage>> {
        if lemmas.is_empty() || candidates.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT p.id AS page_id, p.site_id, p.path, p.content, \
             s.url AS site_url, s.name AS site_name, SUM(ie.rank) AS relevance \
             FROM index_entry ie \
             JOIN lemma l ON l.id = ie.lemma_id \
             JOIN page p ON p.id = ie.page_id \
             JOIN site s ON s.id = p.site_id \
             WHERE l.lemma IN (",
        );
        {
            let mut sep = qb.separated(", ");
            for lemma in lemmas {
                sep.push_bind(lemma.as_str());
            }
        }
        qb.push(") AND ie.page_id IN (");
        push_id_list(&mut qb, candidates);
        qb.push(") GROUP BY p.id ORDER BY relevance DESC, p.id");
        let scored = qb.build_query_as().fetch_all(&self.pool).await?;
        Ok(scored)
    }

    // Field rules.

    pub async fn upsert_field_rule(&self, name: &str, selector: &str, weight: f64) -> Result<()> {
        sqlx::query(
            "INSERT INTO field_rule (name, selector, weight) VALUES (?, ?, ?) \
             ON CONFLICT (name) DO UPDATE SET selector = excluded.selector, \
             weight = excluded.weight",
        )
        .bind(name)
        .bind(selector)
        .bind(weight)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Field rules in configuration order; extraction relies on it when
    /// detaching non-primary fields.
    pub async fn list_field_rules(&self) -> Result<Vec<FieldRule>> {
        let rules = sqlx::query_as::<_, FieldRule>(
            "SELECT name, selector, weight FROM field_rule ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rules)
    }

    // Statistics.

    pub async fn count_sites(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM site")
            .fetch_one(&self.pool)
            .await?)
    }

    pub async fn count_pages(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM page")
            .fetch_one(&self.pool)
            .await?)
    }

    pub async fn count_lemmas(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM lemma")
            .fetch_one(&self.pool)
            .await?)
    }

    pub async fn count_pages_for_site(&self, site_id: i64) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM page WHERE site_id = ?")
            .bind(site_id)
            .fetch_one(&self.pool)
            .await?)
    }

    pub async fn count_lemmas_for_site(&self, site_id: i64) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM lemma WHERE site_id = ?")
            .bind(site_id)
            .fetch_one(&self.pool)
            .await?)
    }
}

fn push_id_list(qb: &mut QueryBuilder<'_, Sqlite>, ids: &[i64]) {
    let mut sep = qb.separated(", ");
    for id in ids {
        sep.push_bind(*id);
    }
}
