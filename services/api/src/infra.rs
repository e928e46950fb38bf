use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use talent_pipeline::config::SourcingServiceConfig;
use talent_pipeline::error::AppError;
use talent_pipeline::workflows::sourcing::{CurationError, CurationFacade, HttpSourcingGateway};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Wire the curation facade to the configured sourcing service.
pub(crate) fn build_facade(
    config: &SourcingServiceConfig,
) -> Result<Arc<CurationFacade<HttpSourcingGateway>>, AppError> {
    let gateway = HttpSourcingGateway::new(config).map_err(CurationError::from)?;
    Ok(Arc::new(CurationFacade::new(
        Arc::new(gateway),
        config.poll_interval,
    )))
}
