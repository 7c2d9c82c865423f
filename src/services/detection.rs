//! Detection orchestrator.
//!
//! Fans one detect request out to the detectors applicable to the requested
//! metric family, merges and ranks their findings, filters by minimum
//! severity, and forwards the result downstream. Owns the learned model's
//! lifecycle (lazy train, persisted reload, explicit retrain) and the rule
//! configuration for the process lifetime.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::detectors::{activity_gap, day_start, learned, rules, statistical, MetricPoint};
use crate::errors::DetectionError;
use crate::feed::{MetricsFeed, SalesRow};
use crate::ml::model_store::{ModelArtifact, ModelStore};
use crate::models::{
    Anomaly, DetectionResponse, DetectionRule, MetricFamily, ModelStatus, RuleUpdateResponse,
    Severity,
};
use crate::rule_store::RuleStore;
use crate::sink::ResultSink;

/// Lookback buckets the engine supports; requests clamp to the nearest one.
const SUPPORTED_WINDOWS: [u32; 3] = [7, 30, 90];

/// Frames smaller than this are not worth analyzing.
const MIN_FRAME_ROWS: usize = 10;

const MODEL_VERSION: &str = "1.0.0";

/// The anomaly detection engine's orchestrator.
pub struct DetectionService {
    feed: Arc<dyn MetricsFeed>,
    sink: Arc<dyn ResultSink>,
    model_store: ModelStore,
    artifact: RwLock<Option<Arc<ModelArtifact>>>,
    rules: Arc<RuleStore>,
    config: EngineConfig,
    retrain_guard: tokio::sync::Mutex<()>,
    detected_today: AtomicU64,
}

impl DetectionService {
    pub fn new(
        feed: Arc<dyn MetricsFeed>,
        sink: Arc<dyn ResultSink>,
        rules: Arc<RuleStore>,
        config: EngineConfig,
    ) -> Self {
        let model_store = ModelStore::new(config.model_dir.clone(), MetricFamily::Sales);
        Self {
            feed,
            sink,
            model_store,
            artifact: RwLock::new(None),
            rules,
            config,
            retrain_guard: tokio::sync::Mutex::new(()),
            detected_today: AtomicU64::new(0),
        }
    }

    /// Run the detector ensemble for one metric family and return a bounded,
    /// severity-ranked anomaly list plus the suggested next-check time.
    ///
    /// Only upstream data unavailability fails this call; every other
    /// failure mode degrades to fewer findings.
    pub async fn detect(
        &self,
        family: MetricFamily,
        window_days: u32,
        min_severity: Severity,
    ) -> Result<DetectionResponse, DetectionError> {
        let window = clamp_window(window_days);
        info!(
            family = %family,
            window_days = window,
            min_severity = %min_severity,
            "starting anomaly detection"
        );

        let mut anomalies = match family {
            MetricFamily::Sales => self.detect_sales(window).await?,
            MetricFamily::Activity => self.detect_activity(window).await?,
            MetricFamily::Leads => self.detect_leads(window).await?,
            MetricFamily::Combined => {
                let mut all = self.detect_sales(window).await?;
                all.extend(self.detect_activity(window).await?);
                all.extend(self.detect_leads(window).await?);
                all
            }
        };

        anomalies.retain(|a| a.severity >= min_severity);
        // Stable sort keeps output deterministic for deterministic inputs.
        anomalies.sort_by(|a, b| {
            b.severity
                .cmp(&a.severity)
                .then(b.detected_at.cmp(&a.detected_at))
        });
        anomalies.truncate(self.config.max_results);

        if !anomalies.is_empty() {
            if let Err(e) = self.sink.save(&anomalies).await {
                warn!(error = %e, "failed to persist anomalies; returning in-memory result");
            }
        }
        self.detected_today
            .fetch_add(anomalies.len() as u64, Ordering::Relaxed);

        let message = format!(
            "detected {} anomalies over the last {} days",
            anomalies.len(),
            window
        );
        info!(count = anomalies.len(), "anomaly detection finished");
        Ok(DetectionResponse {
            total_count: anomalies.len(),
            period_analyzed_days: window,
            model_used: "IsolationForest + Statistical + Rules".to_string(),
            next_check: Utc::now() + chrono::Duration::minutes(self.config.check_interval_minutes),
            message,
            anomalies,
        })
    }

    /// Replace thresholds for the named rules as one batch and remember the
    /// notification channels configured alongside them.
    pub fn configure_rules(
        &self,
        rules: Vec<DetectionRule>,
        notification_channels: Vec<String>,
    ) -> RuleUpdateResponse {
        let updated_count = self.rules.apply(&rules);
        if !notification_channels.is_empty() {
            self.rules
                .set_notification_channels(notification_channels.clone());
        }
        RuleUpdateResponse {
            updated_count,
            notification_channels,
        }
    }

    /// Re-train the learned model from a fresh, larger pull and atomically
    /// replace the stored artifact. A concurrent retrain is skipped rather
    /// than queued; a failed one leaves the previous artifact intact.
    pub async fn retrain(&self) -> Result<(), DetectionError> {
        let Ok(_guard) = self.retrain_guard.try_lock() else {
            info!("retrain already in progress; skipping");
            return Ok(());
        };

        let rows = self.fetch_sales(self.config.retrain_window_days).await?;
        if rows.len() < self.config.retrain_min_rows {
            warn!(
                rows = rows.len(),
                min = self.config.retrain_min_rows,
                "not enough data to retrain; keeping current artifact"
            );
            return Ok(());
        }

        info!(rows = rows.len(), "retraining anomaly model");
        let forest_config = self.config.forest_config();
        let training_rows = rows.clone();
        let trained =
            tokio::task::spawn_blocking(move || learned::train(&training_rows, &forest_config))
                .await;

        match trained {
            Ok(Some(artifact)) => {
                self.publish_artifact(artifact);
                info!("anomaly model retrained");
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => {
                error!(error = %e, "retraining task failed; keeping current artifact");
                Ok(())
            }
        }
    }

    /// Lifecycle snapshot of the learned model.
    pub fn model_status(&self) -> ModelStatus {
        let artifact = self.artifact_snapshot();
        ModelStatus {
            name: "anomaly_detection".to_string(),
            version: MODEL_VERSION.to_string(),
            status: if artifact.is_some() {
                "active".to_string()
            } else {
                "not_trained".to_string()
            },
            last_trained: artifact.map(|a| a.trained_at),
            anomalies_detected_today: self.detected_today.load(Ordering::Relaxed),
        }
    }

    async fn detect_sales(&self, window: u32) -> Result<Vec<Anomaly>, DetectionError> {
        let rows = self.fetch_sales(window).await?;
        if rows.len() < MIN_FRAME_ROWS {
            warn!(rows = rows.len(), "not enough sales data for anomaly analysis");
            return Ok(Vec::new());
        }
        let rule_table = self.rules.snapshot();

        // Learned inference runs on the blocking pool alongside the cheap
        // in-line detectors.
        let learned_task = self.ensure_artifact(&rows).await.map(|artifact| {
            let batch = rows.clone();
            tokio::task::spawn_blocking(move || {
                learned::detect(&batch, &artifact, MetricFamily::Sales)
            })
        });

        let points: Vec<MetricPoint> = rows
            .iter()
            .map(|row| MetricPoint {
                event_time: day_start(row.date),
                entity: format!("manager_{}", row.entity_id),
                value: row.total_amount,
            })
            .collect();
        let statistical_out = statistical::detect(&points, MetricFamily::Sales);
        let rules_out = rules::detect_sales(&rows, &rule_table, MetricFamily::Sales);

        let learned_out = match learned_task {
            Some(task) => match task.await {
                Ok(anomalies) => anomalies,
                Err(e) => {
                    error!(detector = "learned", family = "sales", error = %e,
                        "detector failed; contributing no anomalies");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let mut merged = Vec::new();
        for output in [statistical_out, learned_out, rules_out] {
            merged.extend(dedup_same_detector(output));
        }
        Ok(merged)
    }

    async fn detect_activity(&self, window: u32) -> Result<Vec<Anomaly>, DetectionError> {
        let rows = self.fetch_with_deadline(self.feed.fetch_activity(window)).await?;
        let rule_table = self.rules.snapshot();
        Ok(dedup_same_detector(activity_gap::detect(&rows, &rule_table)))
    }

    async fn detect_leads(&self, window: u32) -> Result<Vec<Anomaly>, DetectionError> {
        let rows = self.fetch_with_deadline(self.feed.fetch_leads(window)).await?;
        let rule_table = self.rules.snapshot();
        Ok(dedup_same_detector(rules::detect_leads(&rows, &rule_table)))
    }

    async fn fetch_sales(&self, window: u32) -> Result<Vec<SalesRow>, DetectionError> {
        self.fetch_with_deadline(self.feed.fetch_sales(window)).await
    }

    /// Run one feed query under the overall fetch deadline. Upstream errors
    /// and timeouts are hard failures: there is nothing to detect in.
    async fn fetch_with_deadline<T>(
        &self,
        fetch: impl std::future::Future<Output = Result<Vec<T>, DetectionError>>,
    ) -> Result<Vec<T>, DetectionError> {
        let deadline = Duration::from_secs(self.config.fetch_timeout_secs);
        match tokio::time::timeout(deadline, fetch).await {
            Ok(Ok(rows)) => Ok(rows),
            Ok(Err(e)) => Err(DetectionError::UpstreamUnavailable(e.to_string())),
            Err(_) => Err(DetectionError::DeadlineExceeded(
                self.config.fetch_timeout_secs,
            )),
        }
    }

    /// Current artifact, lazily loaded from disk or trained from the given
    /// window on first use. `None` disables the learned detector for this
    /// call without failing it.
    async fn ensure_artifact(&self, rows: &[SalesRow]) -> Option<Arc<ModelArtifact>> {
        if let Some(artifact) = self.artifact_snapshot() {
            return Some(artifact);
        }

        match self.model_store.load() {
            Ok(Some(artifact)) => {
                let artifact = Arc::new(artifact);
                self.swap_artifact(artifact.clone());
                return Some(artifact);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "model store unavailable; learned detector disabled for this call");
                return None;
            }
        }

        if rows.len() < learned::MIN_TRAINING_ROWS {
            return None;
        }
        info!(rows = rows.len(), "training anomaly model from current window");
        let forest_config = self.config.forest_config();
        let training_rows = rows.to_vec();
        let trained =
            tokio::task::spawn_blocking(move || learned::train(&training_rows, &forest_config))
                .await;
        match trained {
            Ok(Some(artifact)) => Some(self.publish_artifact(artifact)),
            Ok(None) => None,
            Err(e) => {
                error!(error = %e, "training task failed; learned detector disabled for this call");
                None
            }
        }
    }

    /// Persist (best effort) and publish a freshly trained artifact.
    fn publish_artifact(&self, artifact: ModelArtifact) -> Arc<ModelArtifact> {
        if let Err(e) = self.model_store.save(&artifact) {
            warn!(error = %e, "failed to persist model artifact; keeping it in memory only");
        }
        let artifact = Arc::new(artifact);
        self.swap_artifact(artifact.clone());
        artifact
    }

    fn artifact_snapshot(&self) -> Option<Arc<ModelArtifact>> {
        self.artifact
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn swap_artifact(&self, artifact: Arc<ModelArtifact>) {
        *self
            .artifact
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(artifact);
    }
}

/// Clamp a requested lookback to the nearest supported bucket (ties go to
/// the smaller window; zero clamps up to the smallest).
fn clamp_window(window_days: u32) -> u32 {
    let requested = window_days.max(1);
    SUPPORTED_WINDOWS
        .into_iter()
        .min_by_key(|w| w.abs_diff(requested))
        .unwrap_or(30)
}

/// Suppress exact duplicate emissions from one detector for the same
/// (entity, event time). Findings from different detectors are never
/// deduplicated against each other: they are independent evidence.
fn dedup_same_detector(anomalies: Vec<Anomaly>) -> Vec<Anomaly> {
    let mut seen: HashSet<(String, i64)> = HashSet::new();
    anomalies
        .into_iter()
        .filter(|a| seen.insert((a.affected_entity.clone(), a.event_time.timestamp())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use uuid::Uuid;

    #[test]
    fn window_clamps_to_nearest_supported_bucket() {
        assert_eq!(clamp_window(0), 7);
        assert_eq!(clamp_window(7), 7);
        assert_eq!(clamp_window(10), 7);
        assert_eq!(clamp_window(25), 30);
        assert_eq!(clamp_window(60), 30);
        assert_eq!(clamp_window(61), 90);
        assert_eq!(clamp_window(400), 90);
    }

    #[test]
    fn duplicate_emissions_from_one_detector_are_suppressed() {
        let event = day_start(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
        let anomaly = |entity: &str| Anomaly {
            id: Uuid::new_v4(),
            metric_family: MetricFamily::Sales,
            severity: Severity::Medium,
            detected_at: Utc::now(),
            event_time: event,
            affected_entity: entity.to_string(),
            actual_value: 1.0,
            expected_value: 2.0,
            deviation_percentage: -50.0,
            confidence: 0.8,
            description: String::new(),
        };

        let out = dedup_same_detector(vec![
            anomaly("manager_1"),
            anomaly("manager_1"),
            anomaly("manager_2"),
        ]);
        assert_eq!(out.len(), 2);
    }
}
