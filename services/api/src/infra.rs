use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use chrono::Duration;
use metrics_exporter_prometheus::PrometheusHandle;

use kpi_pulse::engine::memory::MemoryStores;
use kpi_pulse::{ConfigStore, EngineStores, KpiService, Period};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Wire a service over fresh in-memory stores. The stores come back too so
/// the demo can inspect what automation produced.
pub(crate) fn build_service(stale_claim_minutes: i64) -> (Arc<KpiService>, MemoryStores) {
    let stores = MemoryStores::new();
    let config = Arc::new(ConfigStore::with_defaults());
    let service = Arc::new(KpiService::new(
        EngineStores::from(&stores),
        config,
        Duration::minutes(stale_claim_minutes),
    ));
    (service, stores)
}

pub(crate) fn parse_period(raw: &str) -> Result<Period, String> {
    Period::parse(raw).map_err(|err| err.to_string())
}
