//! Shared server state.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use trek_runtime::{SessionDriver, ThreadRegistry};
use trek_store::StateStore;

/// Everything the handlers need, shared behind one `Arc`.
pub struct AppState {
    /// Thread state store.
    pub store: Arc<StateStore>,
    /// Live-run tracking.
    pub registry: Arc<ThreadRegistry>,
    /// Session driver.
    pub driver: Arc<SessionDriver>,
    /// Prometheus render handle.
    pub metrics: PrometheusHandle,
}

impl AppState {
    /// Assemble the server state.
    pub fn new(
        store: Arc<StateStore>,
        registry: Arc<ThreadRegistry>,
        driver: Arc<SessionDriver>,
        metrics: PrometheusHandle,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            registry,
            driver,
            metrics,
        })
    }
}
