use axum::{
    Json,
    extract::{Path as AxumPath, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use pkg_state::{QuotaBackend, StoreError};
use pkg_types::quota::ResourceQuota;
use tracing::{info, warn};

use crate::AppState;

fn store_error(action: &str, e: StoreError) -> Response {
    match e {
        StoreError::NotFound(id) => {
            (StatusCode::NOT_FOUND, format!("resource quota {} not found", id)).into_response()
        }
        StoreError::AlreadyExists(id) => (
            StatusCode::CONFLICT,
            format!("resource quota {} already exists", id),
        )
            .into_response(),
        e @ StoreError::Conflict { .. } => (StatusCode::CONFLICT, e.to_string()).into_response(),
        e => {
            warn!("Failed to {} resource quota: {}", action, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to {} resource quota", action),
            )
                .into_response()
        }
    }
}

/// POST /api/v1/namespaces/{ns}/resourcequotas
pub async fn create_quota(
    State(state): State<AppState>,
    AxumPath(ns): AxumPath<String>,
    Json(mut quota): Json<ResourceQuota>,
) -> impl IntoResponse {
    quota.namespace = ns;
    quota.created_at = Utc::now();
    if let Err(e) = quota.validate() {
        return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
    }
    match state.quotas.create(&quota).await {
        Ok(created) => (StatusCode::CREATED, Json(created)).into_response(),
        Err(e) => store_error("create", e),
    }
}

/// GET /api/v1/namespaces/{ns}/resourcequotas: read straight from the store.
pub async fn list_quotas(
    State(state): State<AppState>,
    AxumPath(ns): AxumPath<String>,
) -> impl IntoResponse {
    match state.quotas.list_quotas(&ns).await {
        Ok(quotas) => (StatusCode::OK, Json(quotas)).into_response(),
        Err(e) => store_error("list", e),
    }
}

/// GET /api/v1/namespaces/{ns}/resourcequotas/{name}
pub async fn get_quota(
    State(state): State<AppState>,
    AxumPath((ns, name)): AxumPath<(String, String)>,
) -> impl IntoResponse {
    match state.quotas.get(&ns, &name).await {
        Ok(Some(quota)) => (StatusCode::OK, Json(quota)).into_response(),
        Ok(None) => store_error("get", StoreError::NotFound(format!("{}/{}", ns, name))),
        Err(e) => store_error("get", e),
    }
}

/// PUT /api/v1/namespaces/{ns}/resourcequotas/{name}: replace `hard` and
/// scopes. `used` in the body is ignored.
pub async fn update_quota(
    State(state): State<AppState>,
    AxumPath((ns, name)): AxumPath<(String, String)>,
    Json(mut quota): Json<ResourceQuota>,
) -> impl IntoResponse {
    quota.namespace = ns;
    quota.name = name;
    if let Err(e) = quota.validate() {
        return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
    }
    match state.quotas.update_spec(&quota).await {
        Ok(updated) => (StatusCode::OK, Json(updated)).into_response(),
        Err(e) => store_error("update", e),
    }
}

/// DELETE /api/v1/namespaces/{ns}/resourcequotas/{name}
pub async fn delete_quota(
    State(state): State<AppState>,
    AxumPath((ns, name)): AxumPath<(String, String)>,
) -> impl IntoResponse {
    match state.quotas.delete(&ns, &name).await {
        Ok(()) => {
            info!("Deleted resource quota {}/{} via API", ns, name);
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => store_error("delete", e),
    }
}
