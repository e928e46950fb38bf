use crate::cli::ServeArgs;
use crate::infra::{build_facade, AppState};
use crate::routes::with_curation_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use talent_pipeline::config::AppConfig;
use talent_pipeline::error::AppError;
use tracing::info;

pub(crate) async fn run(mut config: AppConfig, mut args: ServeArgs) -> Result<(), AppError> {
    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let facade = build_facade(&config.sourcing)?;

    let app = with_curation_routes(facade)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        sourcing_url = %config.sourcing.base_url,
        poll_interval_secs = config.sourcing.poll_interval.as_secs(),
        "talent pipeline api ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
