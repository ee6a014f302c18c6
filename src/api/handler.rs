use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use http::StatusCode;
use tracing::instrument;

use crate::api::server::AppState;
use crate::processor::InvocationResult;

/// Queue push endpoint: the request body is a delivery envelope
#[instrument(skip(state, body), fields(invocation_id = %uuid::Uuid::new_v4(), bytes = body.len()))]
pub async fn invoke(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> (StatusCode, Json<InvocationResult>) {
    let result = state.processor.handle_delivery(&body).await;
    let status =
        StatusCode::from_u16(result.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    (status, Json(result))
}

pub async fn health() -> StatusCode {
    StatusCode::OK
}
