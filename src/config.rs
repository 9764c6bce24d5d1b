//! Application configuration: TOML file plus environment overrides.

use std::path::Path;

use serde::Deserialize;

use crate::error::Result;

/// Top-level configuration, loaded once at startup.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub crawl: CrawlConfig,
    pub search: SearchConfig,
    /// Sites eligible for crawling. Preloaded into the database at startup.
    pub sites: Vec<SiteSeed>,
    /// Document fields contributing to lemma ranking.
    pub fields: Vec<FieldSeed>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://sitesift.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// User-agent sent with every fetch and matched against robots.txt groups.
    pub user_agent: String,
    /// Referer header sent with page fetches.
    pub referrer: String,
    /// Maximum concurrent page tasks per site.
    pub workers: usize,
    /// Maximum pages indexed per site per crawl pass.
    pub page_limit: i64,
    /// Politeness delay window before each fetch, in milliseconds.
    pub delay_min_ms: u64,
    pub delay_max_ms: u64,
    /// Hard per-request timeout, in seconds.
    pub timeout_secs: u64,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            user_agent: "SitesiftBot/0.1 (+https://github.com/sitesift)".to_string(),
            referrer: "https://www.google.com".to_string(),
            workers: 8,
            page_limit: 100_000,
            delay_min_ms: 500,
            delay_max_ms: 5_000,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// A query lemma found on this fraction of scope pages (or more) is
    /// dropped as too common to discriminate.
    pub popularity_threshold: f64,
    /// Snippet window size around a match, in words.
    pub snippet_words_before: usize,
    pub snippet_words_after: usize,
    /// Result page size when the request does not specify one.
    pub default_limit: i64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            popularity_threshold: 0.9,
            snippet_words_before: 12,
            snippet_words_after: 6,
            default_limit: 20,
        }
    }
}

/// One crawlable site from the configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct SiteSeed {
    pub url: String,
    pub name: String,
}

/// One weighted document field from the configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldSeed {
    pub name: String,
    pub selector: String,
    pub weight: f64,
}

impl AppConfig {
    /// Load configuration from an optional TOML file, then apply
    /// `SITESIFT_*` environment overrides (`SITESIFT_SERVER__BIND`, ...).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        let settings = builder
            .add_source(config::Environment::with_prefix("SITESIFT").separator("__"))
            .build()?;
        let mut loaded: AppConfig = settings.try_deserialize()?;
        for site in &mut loaded.sites {
            site.url = canonical_site_url(&site.url);
        }
        if loaded.fields.is_empty() {
            loaded.fields = default_fields();
        }
        Ok(loaded)
    }

    /// The configured site owning `url`, if any.
    pub fn site_for_url<'a>(&'a self, url: &str) -> Option<&'a SiteSeed> {
        self.sites.iter().find(|site| url.starts_with(&site.url))
    }
}

/// Site urls are stored and prefix-matched without a trailing slash.
pub fn canonical_site_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

fn default_fields() -> Vec<FieldSeed> {
    vec![
        FieldSeed {
            name: "title".to_string(),
            selector: "title".to_string(),
            weight: 1.0,
        },
        FieldSeed {
            name: "body".to_string(),
            selector: "body".to_string(),
            weight: 0.8,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_without_file() {
        let config = AppConfig::load(None).expect("load defaults");
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert_eq!(config.search.popularity_threshold, 0.9);
        assert_eq!(config.fields.len(), 2);
        assert_eq!(config.fields[0].name, "title");
    }

    #[test]
    fn file_overrides_and_site_canonicalization() {
        let mut file = tempfile::NamedTempFile::with_suffix(".toml").expect("temp file");
        write!(
            file,
            r#"
            [crawl]
            workers = 2
            page_limit = 50

            [[sites]]
            url = "https://example.com/"
            name = "Example"
            "#
        )
        .expect("write config");

        let config = AppConfig::load(Some(file.path())).expect("load file");
        assert_eq!(config.crawl.workers, 2);
        assert_eq!(config.crawl.page_limit, 50);
        assert_eq!(config.sites[0].url, "https://example.com");
        assert!(config.site_for_url("https://example.com/page").is_some());
        assert!(config.site_for_url("https://other.org/").is_none());
    }
}
