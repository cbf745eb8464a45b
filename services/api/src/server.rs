use crate::cli::ServeArgs;
use crate::infra::{connect_storage, open_store, tracing_notifier, AppState, Portal};
use crate::routes::with_portal_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use dastaavej::config::AppConfig;
use dastaavej::error::AppError;
use dastaavej::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = open_store(&config.portal).await?;
    let storage = connect_storage(&config.storage).await;
    let backend = storage.backend();
    let portal = Portal::assemble(
        &config.portal,
        store,
        Arc::new(storage),
        tracing_notifier(),
    );

    let app = with_portal_routes(portal.accounts, portal.applications)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        storage = backend,
        data_path = ?config.portal.data_path,
        "dastaavej portal ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
