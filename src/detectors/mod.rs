/*!
 * # Detector Ensemble
 *
 * Four independent, stateless detection strategies that run over the same
 * fetched frame: dispersion statistics, the learned isolation-forest model,
 * configurable business rules, and activity-gap (presence/absence) checks.
 * Each detector is a pure function of its input plus the current
 * artifact/rule snapshot, so all can be tested in isolation with synthetic
 * frames.
 */

pub mod activity_gap;
pub mod learned;
pub mod rules;
pub mod statistical;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

/// A single numeric observation attributed to an entity, the input shape of
/// the statistical detector.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricPoint {
    pub event_time: DateTime<Utc>,
    pub entity: String,
    pub value: f64,
}

pub(crate) fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Median of a sample; 0 for an empty slice.
pub(crate) fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
