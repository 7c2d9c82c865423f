//! Dormancy detection over presence/absence of daily activity records.
//!
//! This is a calendar-coverage check, not a magnitude check: an entity with
//! records every day never triggers it no matter how small the counts are.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use crate::detectors::day_start;
use crate::feed::ActivityRow;
use crate::models::{Anomaly, MetricFamily, Severity};
use crate::rule_store::{threshold_or, RuleTable, ZERO_ACTIVITY_RULE};

/// Minimum rows in the frame before gaps are evaluated.
pub const MIN_ROWS: usize = 10;

/// Emit one anomaly per entity whose count of missing dates within the
/// frame's full calendar range reaches the `zero_activity_days` threshold.
pub fn detect(rows: &[ActivityRow], rules: &RuleTable) -> Vec<Anomaly> {
    if rows.len() < MIN_ROWS {
        return Vec::new();
    }
    let gap_days = threshold_or(rules, ZERO_ACTIVITY_RULE, 3.0).max(1.0) as usize;

    let first = rows.iter().map(|r| r.date).min();
    let last = rows.iter().map(|r| r.date).max();
    let (Some(first), Some(last)) = (first, last) else {
        return Vec::new();
    };
    let calendar: Vec<NaiveDate> = first
        .iter_days()
        .take_while(|d| *d <= last)
        .collect();

    // BTreeMap keeps output order deterministic across calls.
    let mut present: BTreeMap<&str, BTreeSet<NaiveDate>> = BTreeMap::new();
    for row in rows {
        present
            .entry(row.entity_id.as_str())
            .or_default()
            .insert(row.date);
    }

    present
        .into_iter()
        .filter_map(|(entity, dates)| {
            let missing = calendar.iter().filter(|d| !dates.contains(d)).count();
            if missing < gap_days {
                return None;
            }
            Some(Anomaly {
                id: Uuid::new_v4(),
                metric_family: MetricFamily::Activity,
                severity: Severity::Medium,
                detected_at: Utc::now(),
                event_time: day_start(last),
                affected_entity: format!("manager_{entity}"),
                actual_value: 0.0,
                expected_value: 1.0,
                deviation_percentage: 100.0,
                confidence: 0.9,
                description: format!("Manager {entity} showed no activity for {missing} days"),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule_store::RuleStore;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, day).unwrap()
    }

    fn row(day: u32, entity: &str) -> ActivityRow {
        ActivityRow {
            date: date(day),
            entity_id: entity.to_string(),
            activity_type: "call".to_string(),
            count: 4,
        }
    }

    fn default_table() -> RuleTable {
        (*RuleStore::new().snapshot()).clone()
    }

    /// Frame spanning `span` days where `gappy` skips the last `gap` days.
    fn frame(span: u32, gappy: &str, gap: u32) -> Vec<ActivityRow> {
        let mut rows: Vec<ActivityRow> = (1..=span).map(|d| row(d, "M1")).collect();
        rows.extend((1..=span - gap).map(|d| row(d, gappy)));
        rows
    }

    #[test]
    fn gap_below_threshold_is_silent() {
        let anomalies = detect(&frame(30, "M2", 2), &default_table());
        assert!(anomalies.is_empty());
    }

    #[test]
    fn gap_at_threshold_emits_exactly_one_anomaly() {
        let anomalies = detect(&frame(30, "M2", 3), &default_table());
        assert_eq!(anomalies.len(), 1);
        let a = &anomalies[0];
        assert_eq!(a.affected_entity, "manager_M2");
        assert_eq!(a.actual_value, 0.0);
        assert_eq!(a.expected_value, 1.0);
        assert_eq!(a.deviation_percentage, 100.0);
        assert_eq!(a.severity, Severity::Medium);
        assert_eq!(a.confidence, 0.9);
    }

    #[test]
    fn five_missing_days_in_thirty_day_window() {
        let anomalies = detect(&frame(30, "M2", 5), &default_table());
        assert_eq!(anomalies.len(), 1);
        assert!(anomalies[0].description.contains("5 days"));
    }

    #[test]
    fn interior_gaps_count_toward_the_threshold() {
        // M2 present every day except days 10, 15, 20.
        let mut rows: Vec<ActivityRow> = (1..=30).map(|d| row(d, "M1")).collect();
        rows.extend(
            (1..=30)
                .filter(|d| ![10, 15, 20].contains(d))
                .map(|d| row(d, "M2")),
        );
        let anomalies = detect(&rows, &default_table());
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].affected_entity, "manager_M2");
    }

    #[test]
    fn small_frame_is_skipped() {
        let rows: Vec<ActivityRow> = (1..=5).map(|d| row(d, "M1")).collect();
        assert!(detect(&rows, &default_table()).is_empty());
    }

    #[test]
    fn configured_threshold_is_respected() {
        let store = RuleStore::new();
        store.apply(&[crate::models::DetectionRule {
            metric: ZERO_ACTIVITY_RULE.to_string(),
            threshold: 6.0,
            comparison: crate::models::RuleComparison::GreaterThan,
            enabled: true,
        }]);
        assert!(detect(&frame(30, "M2", 5), &store.snapshot()).is_empty());
        assert_eq!(detect(&frame(30, "M2", 6), &store.snapshot()).len(), 1);
    }
}
