//! Dispersion-based outlier detection (three-sigma Z-score test).

use chrono::Utc;
use uuid::Uuid;

use crate::detectors::MetricPoint;
use crate::models::{deviation_percentage, Anomaly, MetricFamily, Severity};

/// Minimum observations before the test is meaningful. Below this the
/// detector silently contributes nothing.
pub const MIN_SAMPLES: usize = 10;

const ZSCORE_FLAG: f64 = 3.0;

/// Flag every point whose absolute standardized score exceeds three sigma.
///
/// Pure function of its input: sample mean and standard deviation are
/// computed over the given points only.
pub fn detect(points: &[MetricPoint], family: MetricFamily) -> Vec<Anomaly> {
    if points.len() < MIN_SAMPLES {
        return Vec::new();
    }

    let n = points.len() as f64;
    let mean = points.iter().map(|p| p.value).sum::<f64>() / n;
    let variance = points
        .iter()
        .map(|p| (p.value - mean).powi(2))
        .sum::<f64>()
        / (n - 1.0);
    let std = variance.sqrt();
    if std == 0.0 {
        return Vec::new();
    }

    points
        .iter()
        .filter_map(|point| {
            let z = (point.value - mean) / std;
            if z.abs() <= ZSCORE_FLAG {
                return None;
            }
            Some(Anomaly {
                id: Uuid::new_v4(),
                metric_family: family,
                severity: Severity::from_zscore(z),
                detected_at: Utc::now(),
                event_time: point.event_time,
                affected_entity: point.entity.clone(),
                actual_value: point.value,
                expected_value: mean,
                deviation_percentage: deviation_percentage(point.value, mean),
                confidence: (z.abs() / 5.0).min(0.95),
                description: format!("Unusual sales amount: {:.2}", point.value),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::day_start;
    use chrono::NaiveDate;

    fn points(values: &[f64]) -> Vec<MetricPoint> {
        let start = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, &value)| MetricPoint {
                event_time: day_start(start + chrono::Duration::days(i as i64)),
                entity: format!("manager_{}", i % 3),
                value,
            })
            .collect()
    }

    #[test]
    fn below_minimum_sample_size_yields_empty() {
        let pts = points(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
        assert_eq!(pts.len(), 9);
        assert!(detect(&pts, MetricFamily::Sales).is_empty());
    }

    #[test]
    fn zero_variance_yields_empty() {
        let pts = points(&[5.0; 20]);
        assert!(detect(&pts, MetricFamily::Sales).is_empty());
    }

    #[test]
    fn extreme_value_is_flagged_against_sample_mean() {
        let mut values = vec![5000.0; 29];
        values.push(50_000.0);
        let pts = points(&values);
        let anomalies = detect(&pts, MetricFamily::Sales);

        assert_eq!(anomalies.len(), 1);
        let anomaly = &anomalies[0];
        assert_eq!(anomaly.actual_value, 50_000.0);
        assert!((anomaly.expected_value - 6500.0).abs() < 1e-9);
        assert!(anomaly.confidence <= 0.95);
        assert!(anomaly.deviation_percentage > 0.0);
    }

    #[test]
    fn confidence_is_capped_and_severity_derived_from_z() {
        // 99 tight values and one huge one: |z| well above 4.
        let mut values = vec![10.0, 11.0, 9.0, 10.5, 9.5]
            .into_iter()
            .cycle()
            .take(99)
            .collect::<Vec<_>>();
        values.push(1_000.0);
        let anomalies = detect(&points(&values), MetricFamily::Sales);

        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].severity, Severity::High);
        assert_eq!(anomalies[0].confidence, 0.95);
    }
}
