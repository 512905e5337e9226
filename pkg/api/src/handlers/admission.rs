use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use pkg_types::admission::AdmissionRequest;
use tracing::debug;

use crate::AppState;

/// POST /api/v1/admission/quota: review one create/update against quota.
/// The verdict travels in the body; the HTTP status is 200 either way.
pub async fn review(
    State(state): State<AppState>,
    Json(request): Json<AdmissionRequest>,
) -> impl IntoResponse {
    debug!(
        uid = %request.uid,
        namespace = %request.namespace,
        operation = %request.operation,
        "Reviewing admission request"
    );
    let response = state.admission.review(&request).await;
    (StatusCode::OK, Json(response))
}
