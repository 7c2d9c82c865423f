//! Learned (isolation-forest) detection over per-row feature vectors.
//!
//! Catches unusual *combinations* of deal count, amounts, and calendar
//! position that univariate statistics miss.

use chrono::{Datelike, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::detectors::{day_start, median};
use crate::feed::SalesRow;
use crate::ml::isolation_forest::{ForestConfig, IsolationForest};
use crate::ml::model_store::{ModelArtifact, FEATURE_SCHEMA_VERSION};
use crate::ml::scaler::StandardScaler;
use crate::models::{Anomaly, MetricFamily, Severity};

/// Minimum feature rows required to fit a model. Below this, training is
/// skipped and the learned detector contributes nothing.
pub const MIN_TRAINING_ROWS: usize = 10;

/// Fixed feature vector per sales row. All ensemble members agree on this
/// layout; changing it requires bumping `FEATURE_SCHEMA_VERSION`.
pub fn feature_matrix(rows: &[SalesRow]) -> Vec<Vec<f64>> {
    rows.iter()
        .map(|row| {
            vec![
                row.deals_count as f64,
                row.total_amount,
                row.avg_amount,
                row.max_amount,
                row.date.weekday().num_days_from_monday() as f64,
                row.date.day() as f64,
            ]
        })
        .collect()
}

/// Fit a scaler and forest on the given window. Returns `None` when the
/// window is too small to train from.
pub fn train(rows: &[SalesRow], config: &ForestConfig) -> Option<ModelArtifact> {
    let features = feature_matrix(rows);
    if features.len() < MIN_TRAINING_ROWS {
        warn!(
            rows = features.len(),
            min = MIN_TRAINING_ROWS,
            "not enough data to train the anomaly model"
        );
        return None;
    }

    let scaler = StandardScaler::fit(&features);
    let scaled = scaler.transform_all(&features);
    let forest = IsolationForest::fit(&scaled, config);

    Some(ModelArtifact {
        forest,
        scaler,
        trained_at: Utc::now(),
        feature_schema_version: FEATURE_SCHEMA_VERSION,
        row_count_at_training: rows.len(),
    })
}

/// Score a batch with a previously trained artifact.
///
/// Rows are standardized with the *stored* scaler; the batch's own
/// distribution never refits it. A flagged row's score is its distance
/// beyond the learned outlier threshold.
pub fn detect(rows: &[SalesRow], artifact: &ModelArtifact, family: MetricFamily) -> Vec<Anomaly> {
    if rows.is_empty() {
        return Vec::new();
    }
    if !artifact.is_schema_compatible() {
        warn!(
            found = artifact.feature_schema_version,
            expected = FEATURE_SCHEMA_VERSION,
            "skipping learned detection: artifact feature schema mismatch"
        );
        return Vec::new();
    }

    let amounts: Vec<f64> = rows.iter().map(|r| r.total_amount).collect();
    let batch_median = median(&amounts);
    let threshold = artifact.forest.score_threshold();

    rows.iter()
        .filter_map(|row| {
            let features = feature_matrix(std::slice::from_ref(row));
            let scaled = artifact.scaler.transform(&features[0]);
            let raw = artifact.forest.score(&scaled);
            if raw <= threshold {
                return None;
            }
            let score = raw - threshold;
            Some(Anomaly {
                id: Uuid::new_v4(),
                metric_family: family,
                severity: Severity::from_forest_score(score),
                detected_at: Utc::now(),
                event_time: day_start(row.date),
                affected_entity: format!("manager_{}", row.entity_id),
                actual_value: row.total_amount,
                expected_value: batch_median,
                deviation_percentage: score * 100.0,
                confidence: (score * 2.0).min(0.95),
                description: "Learned detection: unusual sales pattern".to_string(),
            })
        })
        .collect()
}
