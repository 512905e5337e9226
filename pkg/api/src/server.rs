use axum::{
    Router, middleware,
    routing::{get, post},
};
use pkg_metrics::MetricsRegistry;
use pkg_quota::evaluators::{ObjectCountEvaluator, register_defaults};
use pkg_quota::{
    AccessorConfig, CoordinatorConfig, QuotaAccessor, QuotaAdmission, QuotaCoordinator, Registry,
};
use pkg_state::{QuotaClient, QuotaInformer, client::StateStore};
use pkg_types::config::CountedKind;
use pkg_types::object::GroupKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::AppState;
use crate::handlers::{admission, metrics, quotas};
use crate::request_id::request_id_middleware;

/// Server configuration passed from the binary's CLI.
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub data_dir: String,
    pub coordinator: CoordinatorConfig,
    pub accessor: AccessorConfig,
    pub admission_timeout: Duration,
    pub counted_kinds: Vec<CountedKind>,
}

/// All HTTP routes of the quota server.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/admission/quota", post(admission::review))
        .route(
            "/api/v1/namespaces/{ns}/resourcequotas",
            post(quotas::create_quota).get(quotas::list_quotas),
        )
        .route(
            "/api/v1/namespaces/{ns}/resourcequotas/{name}",
            get(quotas::get_quota)
                .put(quotas::update_quota)
                .delete(quotas::delete_quota),
        )
        .route("/metrics", get(metrics::metrics))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

pub async fn start_server(config: ServerConfig) -> anyhow::Result<()> {
    // Initialize core subsystems
    let store = StateStore::new(&config.data_dir).await?;
    let quota_client = QuotaClient::new(store.clone());
    let metrics = Arc::new(MetricsRegistry::new());
    pkg_quota::metrics::register(&metrics);

    let informer = QuotaInformer::new(quota_client.clone());
    let informer_task = informer.start();
    wait_for_sync(&informer).await;

    let registry = Arc::new(Registry::new());
    register_defaults(&registry);
    for counted in &config.counted_kinds {
        let kind = GroupKind::new(&counted.api_group, &counted.kind);
        registry.add(Arc::new(ObjectCountEvaluator::new(&kind, &counted.resource)));
    }

    let accessor = Arc::new(QuotaAccessor::new(
        &config.accessor,
        Arc::new(informer),
        Arc::new(quota_client.clone()),
        metrics.clone(),
    ));
    let coordinator = QuotaCoordinator::new(config.coordinator, registry, accessor, metrics.clone());
    let workers = coordinator.start();

    let state = AppState {
        quotas: quota_client,
        admission: QuotaAdmission::new(coordinator.clone(), metrics.clone())
            .with_timeout(config.admission_timeout),
        metrics,
    };

    info!("Starting API server on {}", config.addr);
    let listener = TcpListener::bind(config.addr).await?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Stopping quota workers");
    coordinator.shutdown();
    for worker in workers {
        if let Err(e) = worker.await {
            warn!("Quota worker ended abnormally: {}", e);
        }
    }
    informer_task.abort();
    store.close().await?;
    info!("Quota server stopped");
    Ok(())
}

/// Give the informer a bounded head start so the fast path is warm before
/// admission traffic arrives. Cold reads fall back to live lookups anyway.
async fn wait_for_sync(informer: &QuotaInformer) {
    for _ in 0..100 {
        if informer.has_synced() {
            info!("Quota informer synced");
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    warn!("Quota informer not synced yet, serving with live lookups");
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(e) => {
            warn!("Cannot listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use pkg_types::admission::{AdmissionRequest, AdmissionResponse, Operation};
    use pkg_types::machine::{COMPUTE_GROUP, MACHINE_KIND};
    use pkg_types::object::DynamicObject;
    use pkg_types::quota::ResourceQuota;
    use pkg_types::resources::resource_list;
    use serde_json::json;
    use tower::ServiceExt;

    async fn test_state() -> AppState {
        let store = StateStore::in_memory().await.unwrap();
        let quota_client = QuotaClient::new(store);
        let metrics = Arc::new(MetricsRegistry::new());
        pkg_quota::metrics::register(&metrics);
        let registry = Arc::new(Registry::new());
        register_defaults(&registry);
        let informer = QuotaInformer::new(quota_client.clone());
        let accessor = Arc::new(QuotaAccessor::new(
            &AccessorConfig::default(),
            Arc::new(informer),
            Arc::new(quota_client.clone()),
            metrics.clone(),
        ));
        let coordinator =
            QuotaCoordinator::new(CoordinatorConfig::default(), registry, accessor, metrics.clone());
        coordinator.start();
        AppState {
            quotas: quota_client,
            admission: QuotaAdmission::new(coordinator, metrics.clone()),
            metrics,
        }
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn machine_review(uid: &str, cpu: &str) -> serde_json::Value {
        let object = DynamicObject::new(
            &GroupKind::new(COMPUTE_GROUP, MACHINE_KIND),
            "team-a",
            uid,
            json!({ "resources": { "requests": { "cpu": cpu } } }),
        );
        serde_json::to_value(AdmissionRequest {
            uid: uid.to_string(),
            operation: Operation::Create,
            namespace: "team-a".to_string(),
            subresource: String::new(),
            object: Some(object),
            old_object: None,
            dry_run: false,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_quota_crud() {
        let app = router(test_state().await);

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/namespaces/team-a/resourcequotas",
                json!({ "name": "compute", "hard": { "requests.cpu": "4" }, "used": { "requests.cpu": "3" } }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created: ResourceQuota = body_json(response).await;
        assert_eq!(created.namespace, "team-a");
        assert_eq!(created.used, resource_list(&[("requests.cpu", "0")]));

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/namespaces/team-a/resourcequotas",
                json!({ "name": "compute", "hard": { "requests.cpu": "4" } }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app
            .clone()
            .oneshot(json_request(
                "PUT",
                "/api/v1/namespaces/team-a/resourcequotas/compute",
                json!({ "name": "ignored", "hard": { "requests.cpu": "8" } }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let updated: ResourceQuota = body_json(response).await;
        assert_eq!(updated.hard, resource_list(&[("requests.cpu", "8")]));

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/namespaces/team-a/resourcequotas")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let listed: Vec<ResourceQuota> = body_json(response).await;
        assert_eq!(listed.len(), 1);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/v1/namespaces/team-a/resourcequotas/compute")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/namespaces/team-a/resourcequotas/compute")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_quota_is_rejected() {
        let app = router(test_state().await);
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/v1/namespaces/team-a/resourcequotas",
                json!({ "name": "compute", "hard": { "cpu": "-1" } }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_admission_review_charges_and_denies() {
        let state = test_state().await;
        state
            .quotas
            .create(&ResourceQuota::new(
                "team-a",
                "compute",
                resource_list(&[("requests.cpu", "2")]),
            ))
            .await
            .unwrap();
        let app = router(state.clone());

        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/v1/admission/quota", machine_review("vm-1", "2")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let verdict: AdmissionResponse = body_json(response).await;
        assert!(verdict.allowed);
        assert_eq!(verdict.uid, "vm-1");

        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/v1/admission/quota", machine_review("vm-2", "1")))
            .await
            .unwrap();
        let verdict: AdmissionResponse = body_json(response).await;
        assert!(!verdict.allowed);
        let status = verdict.status.unwrap();
        assert_eq!(status.code, 403);
        assert!(status.message.starts_with("exceeded quota: compute"));

        let stored = state.quotas.get("team-a", "compute").await.unwrap().unwrap();
        assert_eq!(stored.used, resource_list(&[("requests.cpu", "2")]));

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("quota_admission_evaluations_total{outcome=\"allowed\"} 1"));
        assert!(text.contains("quota_admission_evaluations_total{outcome=\"denied\"} 1"));
    }

    #[tokio::test]
    async fn test_request_id_is_echoed() {
        let app = router(test_state().await);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .header("x-request-id", "abc-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()["x-request-id"], "abc-123");
    }
}
