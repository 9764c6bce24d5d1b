//! Search endpoint.

use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

use super::error::ApiError;
use super::state::ApiState;

#[derive(Deserialize)]
pub(super) struct SearchParams {
    pub(super) query: String,
    #[serde(default)]
    pub(super) site: Option<String>,
    #[serde(default)]
    pub(super) offset: Option<i64>,
    #[serde(default)]
    pub(super) limit: Option<i64>,
}

pub(super) async fn search(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Value>, ApiError> {
    // The dashboard sends `site=` for an all-sites search.
    let site = params.site.as_deref().filter(|s| !s.is_empty());
    let outcome = state
        .engine
        .search(&params.query, site, params.offset, params.limit)
        .await?;

    let mut body = json!({
        "result": true,
        "count": outcome.count,
        "data": outcome.results,
    });
    if let Some(corrected) = outcome.corrected_query {
        body["corrected_query"] = Value::String(corrected);
    }
    Ok(Json(body))
}
