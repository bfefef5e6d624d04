use std::sync::Arc;

use chrono::Duration;

use crate::engine::domain::{Period, RawMetrics, UserId};
use crate::engine::memory::MemoryStores;
use crate::engine::scoring::config::ConfigStore;
use crate::engine::service::{EngineStores, KpiService, KpiSubmission};

pub(super) struct Harness {
    pub service: Arc<KpiService>,
    pub stores: MemoryStores,
    pub config: Arc<ConfigStore>,
}

pub(super) fn harness() -> Harness {
    let stores = MemoryStores::new();
    let config = Arc::new(ConfigStore::with_defaults());
    let service = Arc::new(KpiService::new(
        EngineStores::from(&stores),
        config.clone(),
        Duration::minutes(15),
    ));
    Harness {
        service,
        stores,
        config,
    }
}

/// A clean month: expected to land in the excellent band with no trainings
/// or audits owed.
pub(super) fn strong_metrics() -> RawMetrics {
    RawMetrics {
        tat: 95.0,
        quality: 95.0,
        app_usage: 98.0,
        neighbor_check: 90.0,
        general_negativity: 5.0,
        major_negativity: 0,
        insufficiency: 0,
    }
}

/// A rough month: expected to land below average with the full training,
/// audit, and email fan-out.
pub(super) fn weak_metrics() -> RawMetrics {
    RawMetrics {
        tat: 60.0,
        quality: 70.0,
        app_usage: 80.0,
        neighbor_check: 65.0,
        general_negativity: 35.0,
        major_negativity: 5,
        insufficiency: 3,
    }
}

pub(super) fn submission(user: &str, period: &str, metrics: RawMetrics) -> KpiSubmission {
    KpiSubmission {
        user: UserId(user.to_string()),
        period: Period::parse(period).expect("valid period"),
        metrics,
    }
}
