/*!
 * # Domain Models
 *
 * Core data types shared by every detector and the orchestrator: the
 * `Anomaly` finding record, the ordered `Severity` scale, the closed
 * `MetricFamily` dispatch enum, and the configurable `DetectionRule`.
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Severity scale used for filtering and ranking findings.
///
/// The derived `Ord` follows the declaration order, so
/// `Low < Medium < High < Critical` holds directly.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Numeric level of this severity (low=1 .. critical=4).
    pub fn level(self) -> u8 {
        match self {
            Severity::Low => 1,
            Severity::Medium => 2,
            Severity::High => 3,
            Severity::Critical => 4,
        }
    }

    /// Severity of a standardized-score outlier.
    ///
    /// Calibration is fixed: beyond four sigma a deviation is High, anything
    /// else that got flagged (three sigma) is Medium.
    pub fn from_zscore(z: f64) -> Self {
        if z.abs() > 4.0 {
            Severity::High
        } else {
            Severity::Medium
        }
    }

    /// Severity of an isolation-forest anomaly score (distance beyond the
    /// learned threshold). Fixed cut points 0.3 / 0.1.
    pub fn from_forest_score(score: f64) -> Self {
        if score > 0.3 {
            Severity::High
        } else if score > 0.1 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

/// Category of input data a detection request targets.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MetricFamily {
    Sales,
    Activity,
    Leads,
    Combined,
}

/// One flagged deviation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    /// Opaque unique identifier assigned at detection time.
    pub id: Uuid,
    pub metric_family: MetricFamily,
    pub severity: Severity,
    /// When the engine flagged this anomaly.
    pub detected_at: DateTime<Utc>,
    /// The timestamp the anomaly refers to.
    pub event_time: DateTime<Utc>,
    /// Entity the anomaly is attributed to, e.g. `manager_42` or
    /// `source_referral`.
    pub affected_entity: String,
    pub actual_value: f64,
    /// Baseline the actual value is compared against, same unit as
    /// `actual_value`.
    pub expected_value: f64,
    /// Signed percentage deviation of actual from expected; 0 when the
    /// expected value is 0.
    pub deviation_percentage: f64,
    /// Confidence in [0, 1] that this is a true anomaly.
    pub confidence: f64,
    pub description: String,
}

/// Signed percentage deviation of `actual` from `expected`, guarded against
/// a zero baseline. All detectors compute deviation through this function.
pub fn deviation_percentage(actual: f64, expected: f64) -> f64 {
    if expected == 0.0 {
        0.0
    } else {
        (actual - expected) / expected * 100.0
    }
}

/// Comparison operator carried by a detection rule.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RuleComparison {
    GreaterThan,
    LessThan,
    Equals,
}

/// One configurable threshold, looked up by metric name. Later updates fully
/// replace the threshold for that name (last-write-wins).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRule {
    pub metric: String,
    pub threshold: f64,
    pub comparison: RuleComparison,
    pub enabled: bool,
}

/// Result of one `detect` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionResponse {
    pub anomalies: Vec<Anomaly>,
    pub total_count: usize,
    pub period_analyzed_days: u32,
    pub model_used: String,
    /// When the caller is expected to re-invoke detection.
    pub next_check: DateTime<Utc>,
    pub message: String,
}

/// Result of a `configure_rules` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleUpdateResponse {
    pub updated_count: usize,
    pub notification_channels: Vec<String>,
}

/// Snapshot of the learned model's lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelStatus {
    pub name: String,
    pub version: String,
    /// `active` once a trained artifact is available, `not_trained` before.
    pub status: String,
    pub last_trained: Option<DateTime<Utc>>,
    pub anomalies_detected_today: u64,
}
