//! Read-only HTTP endpoints backing the public results page.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use log::{debug, error};
use serde_json::json;

use crate::error::PollError;
use crate::results::PollView;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/polls/display", get(displayed_poll))
        .route("/polls/{id}", get(poll_by_id))
        .with_state(state)
}

async fn displayed_poll(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let roster = state.roster.snapshot().await;
    let response = match state.results.displayed(&roster).await? {
        Some(view) => Json(view).into_response(),
        None => Json(json!({})).into_response(),
    };
    Ok(response)
}

async fn poll_by_id(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> Result<Json<PollView>, ApiError> {
    let id: i64 = raw_id
        .parse()
        .map_err(|_| PollError::validation(format!("'{}' is not a poll id", raw_id)))?;
    let roster = state.roster.snapshot().await;
    Ok(Json(state.results.by_id(id, &roster).await?))
}

/// Maps [`PollError`] onto an HTTP status and a `{"error": {"code", "message"}}` body.
pub struct ApiError(PollError);

impl From<PollError> for ApiError {
    fn from(err: PollError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0 {
            PollError::Validation(_) => StatusCode::BAD_REQUEST,
            PollError::NotFound(_) => StatusCode::NOT_FOUND,
            PollError::InvalidState(_) | PollError::Conflict(_) => StatusCode::CONFLICT,
            PollError::InternalConsistency(_) => StatusCode::INTERNAL_SERVER_ERROR,
            PollError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.0.kind();

        // Store details stay in the log.
        let message = if status.is_server_error() {
            error!("Results request failed ({}): {}", code, self.0);
            match self.0 {
                PollError::Store(_) => "The poll store is unavailable".to_string(),
                other => other.to_string(),
            }
        } else {
            debug!("Results request rejected ({}): {}", code, self.0);
            self.0.to_string()
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}
