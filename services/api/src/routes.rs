use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Json, Router};
use dastaavej::notify::Notifier;
use dastaavej::storage::StorageGateway;
use dastaavej::store::PortalStore;
use dastaavej::workflows::accounts::{account_router, AccountService, Authenticator};
use dastaavej::workflows::applications::{application_router, ApplicationService};
use serde_json::json;
use std::sync::Arc;

pub(crate) fn with_portal_routes<R, S, N>(
    accounts: Arc<AccountService<R, N>>,
    applications: Arc<ApplicationService<R, S, N>>,
) -> Router
where
    R: PortalStore,
    S: StorageGateway + 'static,
    N: Notifier + 'static,
{
    let auth: Arc<dyn Authenticator> = accounts.clone();

    account_router(accounts)
        .merge(application_router(applications, auth))
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
