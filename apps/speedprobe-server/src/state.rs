use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use rtc_probe::{Negotiator, SessionRegistry};

use crate::client_log::ClientLog;
use crate::config::TransferLimits;

#[derive(Clone)]
pub struct AppState {
    negotiator: Arc<Negotiator>,
    limits: TransferLimits,
    client_log: ClientLog,
    metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(negotiator: Negotiator, limits: TransferLimits) -> Self {
        Self {
            negotiator: Arc::new(negotiator),
            limits,
            client_log: ClientLog::new(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    pub fn negotiator(&self) -> &Negotiator {
        &self.negotiator
    }

    pub fn registry(&self) -> &SessionRegistry {
        self.negotiator.registry()
    }

    pub fn limits(&self) -> TransferLimits {
        self.limits
    }

    pub fn client_log(&self) -> &ClientLog {
        &self.client_log
    }

    /// Prometheus text exposition; empty when no recorder is installed.
    pub fn render_metrics(&self) -> String {
        self.metrics
            .as_ref()
            .map(PrometheusHandle::render)
            .unwrap_or_default()
    }
}
