//! HTTP server setup: router and API routes.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::error::ApiError;
use super::indexing;
use super::search;
use super::state::ApiState;

/// Start the HTTP server on the given address.
///
/// Returns a handle that resolves when the server shuts down. The caller
/// passes a `tokio::sync::watch::Receiver<bool>` for graceful shutdown.
pub async fn start_http_server(
    bind: SocketAddr,
    state: Arc<ApiState>,
    shutdown_rx: tokio::sync::watch::Receiver<bool>,
) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(%bind, "HTTP server listening");

    let handle = tokio::spawn(async move {
        let mut shutdown = shutdown_rx;
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.wait_for(|v| *v).await;
            })
            .await
            .ok();
    });

    Ok(handle)
}

fn router(state: Arc<ApiState>) -> Router {
    let api_routes = Router::new()
        .route("/startIndexing", get(indexing::start_indexing))
        .route("/stopIndexing", get(indexing::stop_indexing))
        .route("/indexPage", post(indexing::index_page))
        .route("/search", get(search::search))
        .route("/statistics", get(statistics));

    Router::new()
        .nest("/api", api_routes)
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn statistics(State(state): State<Arc<ApiState>>) -> Result<Json<Value>, ApiError> {
    let snapshot = crate::statistics::collect(&state.db, state.manager.is_crawling()).await?;
    Ok(Json(json!({ "result": true, "statistics": snapshot })))
}

#[cfg(test)]
mod tests {
    use axum::Form;
    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    use super::*;
    use crate::config::{AppConfig, SiteSeed};
    use crate::crawler::{CrawlManager, Fetch, FetchedPage};
    use crate::error::Error;
    use crate::indexer::{IndexWriter, PageRecord, WeightedLemma};
    use crate::morphology::Morphology;
    use crate::search::SearchEngine;
    use crate::storage::Database;
    use crate::storage::models::SiteStatus;

    struct RefusingFetcher;

    #[async_trait::async_trait]
    impl Fetch for RefusingFetcher {
        async fn fetch(&self, url: &str) -> crate::error::Result<FetchedPage> {
            Err(Error::Internal(format!("unexpected fetch of {url}")))
        }
    }

    struct Fixture {
        state: Arc<ApiState>,
        writer: IndexWriter,
        morphology: Arc<Morphology>,
    }

    async fn fixture() -> Fixture {
        let db = Database::connect_in_memory().await.expect("database");
        let writer = IndexWriter::spawn(db.clone());
        let morphology = Arc::new(Morphology::new());
        let mut config = AppConfig::load(None).expect("config");
        config.sites = vec![SiteSeed {
            url: "https://site.test".to_string(),
            name: "Test site".to_string(),
        }];
        let manager = CrawlManager::new(
            db.clone(),
            writer.clone(),
            Arc::new(RefusingFetcher),
            Arc::clone(&morphology),
            config.clone(),
        );
        let engine = SearchEngine::new(db.clone(), Arc::clone(&morphology), config.search);
        Fixture {
            state: Arc::new(ApiState::new(db, manager, engine)),
            writer,
            morphology,
        }
    }

    #[tokio::test]
    async fn search_handler_builds_the_response_envelope() {
        let fx = fixture().await;
        let site = fx
            .state
            .db
            .upsert_site_seed("https://site.test", "Test site")
            .await
            .expect("site");
        fx.state
            .db
            .set_site_status(site.id, SiteStatus::Indexed, Some(""))
            .await
            .expect("status");
        let granite = fx
            .morphology
            .word_forms("granite")
            .into_iter()
            .next()
            .expect("normal form");
        fx.writer
            .upsert_page(
                PageRecord {
                    site_id: site.id,
                    path: "/a".to_string(),
                    code: 200,
                    content: "<html><head><title>Granite</title></head>\
                              <body>Granite shelf.</body></html>"
                        .to_string(),
                    fingerprint: "fp:a".to_string(),
                },
                vec![WeightedLemma {
                    lemma: granite,
                    rank: 1.0,
                    count: 1,
                }],
            )
            .await
            .expect("page");

        // Empty `site=` means all sites, as the dashboard sends it.
        let Json(body) = search::search(
            State(Arc::clone(&fx.state)),
            Query(search::SearchParams {
                query: "granite".to_string(),
                site: Some(String::new()),
                offset: None,
                limit: None,
            }),
        )
        .await
        .expect("search succeeds");

        assert_eq!(body["result"], true);
        assert_eq!(body["count"], 1);
        assert_eq!(body["data"][0]["uri"], "/a");
        assert_eq!(body["data"][0]["site"], "https://site.test");
        assert_eq!(body["data"][0]["relevance"], 1.0);
        assert!(body.get("corrected_query").is_none());
    }

    #[tokio::test]
    async fn statistics_handler_wraps_the_snapshot() {
        let fx = fixture().await;
        fx.state
            .db
            .upsert_site_seed("https://site.test", "Test site")
            .await
            .expect("site");

        let Json(body) = statistics(State(Arc::clone(&fx.state)))
            .await
            .expect("statistics");
        assert_eq!(body["result"], true);
        assert_eq!(body["statistics"]["total"]["sites"], 1);
        assert_eq!(body["statistics"]["total"]["indexing"], false);
        let detail = &body["statistics"]["detailed"][0];
        assert_eq!(detail["url"], "https://site.test");
        assert_eq!(detail["error"], "not yet indexed");
        assert!(detail["statusTime"].is_i64());
    }

    #[tokio::test]
    async fn indexing_endpoints_surface_operator_errors() {
        let fx = fixture().await;

        let err = indexing::stop_indexing(State(Arc::clone(&fx.state)))
            .await
            .expect_err("nothing to stop");
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);

        let err = indexing::index_page(
            State(Arc::clone(&fx.state)),
            Form(indexing::IndexPageForm {
                url: "https://elsewhere.test/p".to_string(),
            }),
        )
        .await
        .expect_err("page outside configured sites");
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn health_always_answers() {
        let Json(body) = health().await;
        assert_eq!(body["status"], "ok");
    }
}
