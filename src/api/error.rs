//! JSON error envelope shared by every API endpoint.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::error::Error;

/// Renders crate errors as `{"result": false, "error": …}`. Operator
/// errors keep their message and map to 400; anything else is logged
/// and collapsed to a generic 500 so internals never leak.
#[derive(Debug)]
pub(super) struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = if self.0.is_operator() {
            (StatusCode::BAD_REQUEST, self.0.to_string())
        } else {
            tracing::error!(error = %self.0, "request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
        };
        let body = Json(json!({ "result": false, "error": message }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OperatorError;

    #[test]
    fn operator_errors_become_bad_requests() {
        let response =
            ApiError::from(Error::from(OperatorError::IndexingNotRunning)).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn internal_errors_become_opaque_server_errors() {
        let response = ApiError::from(Error::Internal("sqlite exploded".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
