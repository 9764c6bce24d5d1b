//! HTTP fetching behind a trait so crawls can be scripted in tests.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header;

use crate::config::CrawlConfig;
use crate::error::Result;

/// A fetched document before any parsing. Non-2xx statuses are data here,
/// not errors; only transport failures surface as `Err`.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub final_url: String,
    pub status: u16,
    pub content_type: String,
    pub body: String,
}

impl FetchedPage {
    pub fn is_text(&self) -> bool {
        self.content_type.starts_with("text")
    }

    /// Parseable range: 2xx and 3xx bodies are worth indexing, everything
    /// else is stored as a bare status row.
    pub fn is_indexable_status(&self) -> bool {
        (200..400).contains(&self.status)
    }
}

#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage>;
}

/// Production fetcher: one shared client, fixed user-agent and referer,
/// redirects followed.
pub struct HttpFetcher {
    client: reqwest::Client,
    referrer: String,
}

impl HttpFetcher {
    pub fn new(config: &CrawlConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(10))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            referrer: config.referrer.clone(),
        })
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let response = self
            .client
            .get(url)
            .header(header::REFERER, &self.referrer)
            .send()
            .await?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response.text().await?;
        Ok(FetchedPage {
            final_url,
            status,
            content_type,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_range_gates_indexing() {
        let mut page = FetchedPage {
            final_url: "https://example.com/".to_string(),
            status: 200,
            content_type: "text/html; charset=utf-8".to_string(),
            body: String::new(),
        };
        assert!(page.is_text());
        assert!(page.is_indexable_status());

        page.status = 301;
        assert!(page.is_indexable_status());
        page.status = 404;
        assert!(!page.is_indexable_status());

        page.content_type = "application/pdf".to_string();
        assert!(!page.is_text());
    }
}
