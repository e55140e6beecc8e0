use serde::{Deserialize, Serialize};
use sonarcore::interface::ChannelDiagnostics;
use sonarcore::telemetry::MetricsSnapshot;

use crate::workflow::runner::{CycleSummary, WorkflowResult};

/// Latest run as served on `GET /diagnostics`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DiagnosticsModel {
    pub scenario: Option<String>,
    pub cycles: Vec<CycleSummary>,
    pub detection_count: usize,
    pub intercepted: bool,
    pub intercept_cycle: Option<u64>,
    pub channels: Vec<ChannelDiagnostics>,
    pub metrics: MetricsSnapshot,
}

impl From<&WorkflowResult> for DiagnosticsModel {
    fn from(result: &WorkflowResult) -> Self {
        Self {
            scenario: result.scenario.clone(),
            cycles: result.cycles.clone(),
            detection_count: result.detection_count(),
            intercepted: result.intercepted,
            intercept_cycle: result.intercept_cycle,
            channels: result.channels.clone(),
            metrics: result.metrics,
        }
    }
}
