//! Crawl control endpoints: start, stop, and single-page reindexing.

use axum::extract::State;
use axum::{Form, Json};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

use super::error::ApiError;
use super::state::ApiState;

#[derive(Deserialize)]
pub(super) struct IndexPageForm {
    pub(super) url: String,
}

pub(super) async fn start_indexing(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<Value>, ApiError> {
    state.manager.start_all().await?;
    Ok(Json(json!({ "result": true })))
}

pub(super) async fn stop_indexing(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<Value>, ApiError> {
    state.manager.stop_all().await?;
    Ok(Json(json!({ "result": true })))
}

pub(super) async fn index_page(
    State(state): State<Arc<ApiState>>,
    Form(form): Form<IndexPageForm>,
) -> Result<Json<Value>, ApiError> {
    state.manager.index_page(&form.url).await?;
    Ok(Json(json!({ "result": true })))
}
