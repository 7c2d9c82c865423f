//! Downstream persistence of detection results.

use async_trait::async_trait;

use crate::errors::DetectionError;
use crate::models::Anomaly;

/// Best-effort persistence of the final anomaly list for later query and
/// alerting. Failures are logged and swallowed by the orchestrator; the
/// in-memory result returned to the caller is already complete.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn save(&self, anomalies: &[Anomaly]) -> Result<(), DetectionError>;
}
