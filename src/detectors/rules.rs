//! Rule-based detection over simple aggregates of the fetched frame.

use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use crate::detectors::{day_start, mean};
use crate::feed::{LeadsRow, SalesRow};
use crate::models::{deviation_percentage, Anomaly, MetricFamily, Severity};
use crate::rule_store::{threshold_or, RuleTable, HIGH_AMOUNT_RULE, LEADS_DROP_RULE, SALES_DROP_RULE};

/// Minimum daily data points before a recent-vs-baseline drop comparison is
/// evaluated (3 recent + at least 4 baseline).
const MIN_DROP_POINTS: usize = 7;
/// A leads frame smaller than this is skipped outright.
const MIN_LEADS_ROWS: usize = 5;

const RECENT_DAYS: usize = 3;
const BASELINE_DAYS: usize = 7;

/// Evaluate the sales rule catalogue: single deals far above the mean, and a
/// drop of recent daily revenue against the trailing baseline.
pub fn detect_sales(rows: &[SalesRow], rules: &RuleTable, family: MetricFamily) -> Vec<Anomaly> {
    let mut anomalies = high_amount_deals(rows, rules, family);
    anomalies.extend(sales_drop(rows, rules, family));
    anomalies
}

fn high_amount_deals(rows: &[SalesRow], rules: &RuleTable, family: MetricFamily) -> Vec<Anomaly> {
    if rows.is_empty() {
        return Vec::new();
    }
    let multiplier = threshold_or(rules, HIGH_AMOUNT_RULE, 5.0);
    let amounts: Vec<f64> = rows.iter().map(|r| r.total_amount).collect();
    let avg = mean(&amounts);
    let cutoff = avg * multiplier;

    rows.iter()
        .filter(|row| row.total_amount > cutoff)
        .map(|row| Anomaly {
            id: Uuid::new_v4(),
            metric_family: family,
            severity: Severity::Medium,
            detected_at: Utc::now(),
            event_time: day_start(row.date),
            affected_entity: format!("manager_{}", row.entity_id),
            actual_value: row.total_amount,
            expected_value: avg,
            deviation_percentage: deviation_percentage(row.total_amount, avg),
            confidence: 0.8,
            description: format!(
                "Deal significantly exceeds the average size ({:.2} vs {:.2})",
                row.total_amount, avg
            ),
        })
        .collect()
}

fn sales_drop(rows: &[SalesRow], rules: &RuleTable, family: MetricFamily) -> Vec<Anomaly> {
    let threshold = threshold_or(rules, SALES_DROP_RULE, 0.3);

    // Daily revenue totals in calendar order.
    let mut daily: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for row in rows {
        *daily.entry(row.date).or_insert(0.0) += row.total_amount;
    }
    let totals: Vec<f64> = daily.values().copied().collect();
    if totals.len() < MIN_DROP_POINTS {
        return Vec::new();
    }

    let n = totals.len();
    let recent = mean(&totals[n - RECENT_DAYS..]);
    let baseline_start = n.saturating_sub(RECENT_DAYS + BASELINE_DAYS);
    let baseline = mean(&totals[baseline_start..n - RECENT_DAYS]);

    if baseline <= 0.0 || recent >= baseline * (1.0 - threshold) {
        return Vec::new();
    }

    let drop_pct = (baseline - recent) / baseline * 100.0;
    vec![Anomaly {
        id: Uuid::new_v4(),
        metric_family: family,
        severity: Severity::High,
        detected_at: Utc::now(),
        event_time: Utc::now(),
        affected_entity: "sales_overall".to_string(),
        actual_value: recent,
        expected_value: baseline,
        deviation_percentage: deviation_percentage(recent, baseline),
        confidence: 0.9,
        description: format!("Sharp drop in overall sales of {drop_pct:.1}%"),
    }]
}

/// Per-source collapse detection for lead flow: the newest three days of
/// each source against its oldest seven within the window.
pub fn detect_leads(rows: &[LeadsRow], rules: &RuleTable) -> Vec<Anomaly> {
    if rows.len() < MIN_LEADS_ROWS {
        return Vec::new();
    }
    let threshold = threshold_or(rules, LEADS_DROP_RULE, 0.5);

    let mut per_source: BTreeMap<&str, BTreeMap<NaiveDate, f64>> = BTreeMap::new();
    for row in rows {
        *per_source
            .entry(row.source.as_str())
            .or_default()
            .entry(row.date)
            .or_insert(0.0) += row.count as f64;
    }

    let mut anomalies = Vec::new();
    for (source, daily) in per_source {
        if daily.len() < MIN_DROP_POINTS {
            continue;
        }
        let counts: Vec<f64> = daily.values().copied().collect();
        let recent = mean(&counts[counts.len() - RECENT_DAYS..]);
        let baseline = mean(&counts[..BASELINE_DAYS.min(counts.len())]);

        if baseline > 0.0 && recent < baseline * (1.0 - threshold) {
            anomalies.push(Anomaly {
                id: Uuid::new_v4(),
                metric_family: MetricFamily::Leads,
                severity: Severity::High,
                detected_at: Utc::now(),
                event_time: Utc::now(),
                affected_entity: format!("source_{source}"),
                actual_value: recent,
                expected_value: baseline,
                deviation_percentage: deviation_percentage(recent, baseline),
                confidence: 0.8,
                description: format!("Sharp drop in leads from source {source}"),
            });
        }
    }
    anomalies
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule_store::RuleStore;
    use crate::models::RuleComparison;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, day).unwrap()
    }

    fn sales_row(day: u32, entity: &str, total: f64) -> SalesRow {
        SalesRow {
            date: date(day),
            entity_id: entity.to_string(),
            deals_count: 3,
            total_amount: total,
            avg_amount: total / 3.0,
            max_amount: total,
        }
    }

    fn default_table() -> RuleTable {
        (*RuleStore::new().snapshot()).clone()
    }

    #[test]
    fn ten_x_deal_emits_one_high_amount_anomaly() {
        // 30 steady days at 5000 per manager, one 50000 spike for M1.
        let mut rows: Vec<SalesRow> = (1..=30)
            .flat_map(|d| {
                vec![
                    sales_row(d, "M1", 5000.0),
                    sales_row(d, "M2", 5000.0),
                ]
            })
            .collect();
        rows.push(sales_row(15, "M1", 50_000.0));

        let table = default_table();
        let anomalies = high_amount_deals(&rows, &table, MetricFamily::Sales);

        assert_eq!(anomalies.len(), 1);
        let a = &anomalies[0];
        assert_eq!(a.affected_entity, "manager_M1");
        assert_eq!(a.actual_value, 50_000.0);
        assert_eq!(a.severity, Severity::Medium);
        assert_eq!(a.confidence, 0.8);
        // Mean over 61 rows: (60 * 5000 + 50000) / 61
        assert!((a.expected_value - 350_000.0 / 61.0).abs() < 1e-9);
    }

    #[test]
    fn sales_drop_compares_recent_against_baseline() {
        // 7 baseline days at 10000 then 3 recent days at 2000: an 80% drop.
        let mut rows: Vec<SalesRow> =
            (1..=7).map(|d| sales_row(d, "M1", 10_000.0)).collect();
        rows.extend((8..=10).map(|d| sales_row(d, "M1", 2000.0)));

        let anomalies = sales_drop(&rows, &default_table(), MetricFamily::Sales);
        assert_eq!(anomalies.len(), 1);
        let a = &anomalies[0];
        assert_eq!(a.affected_entity, "sales_overall");
        assert_eq!(a.actual_value, 2000.0);
        assert_eq!(a.expected_value, 10_000.0);
        assert_eq!(a.severity, Severity::High);
        assert_eq!(a.confidence, 0.9);
        assert_eq!(a.deviation_percentage, -80.0);
    }

    #[test]
    fn steady_sales_trigger_no_drop() {
        let rows: Vec<SalesRow> = (1..=14).map(|d| sales_row(d, "M1", 9000.0)).collect();
        assert!(sales_drop(&rows, &default_table(), MetricFamily::Sales).is_empty());
    }

    #[test]
    fn too_few_daily_points_skips_drop_rule() {
        let rows: Vec<SalesRow> = (1..=6).map(|d| sales_row(d, "M1", 100.0)).collect();
        assert!(sales_drop(&rows, &default_table(), MetricFamily::Sales).is_empty());
    }

    #[test]
    fn custom_threshold_is_honored() {
        let store = RuleStore::new();
        // Require a 90% drop before flagging.
        store.apply(&[crate::models::DetectionRule {
            metric: SALES_DROP_RULE.to_string(),
            threshold: 0.9,
            comparison: RuleComparison::LessThan,
            enabled: true,
        }]);

        let mut rows: Vec<SalesRow> =
            (1..=7).map(|d| sales_row(d, "M1", 10_000.0)).collect();
        rows.extend((8..=10).map(|d| sales_row(d, "M1", 2000.0)));

        // 80% drop is below the 90% bar now.
        assert!(sales_drop(&rows, &store.snapshot(), MetricFamily::Sales).is_empty());
    }

    fn leads_row(day: u32, source: &str, count: u32) -> LeadsRow {
        LeadsRow {
            date: date(day),
            source: source.to_string(),
            count,
        }
    }

    #[test]
    fn collapsing_source_is_flagged_per_source() {
        let mut rows = Vec::new();
        for d in 1..=10 {
            rows.push(leads_row(d, "referral", if d <= 7 { 20 } else { 2 }));
            rows.push(leads_row(d, "organic", 15));
        }

        let anomalies = detect_leads(&rows, &default_table());
        assert_eq!(anomalies.len(), 1);
        let a = &anomalies[0];
        assert_eq!(a.affected_entity, "source_referral");
        assert_eq!(a.severity, Severity::High);
        assert_eq!(a.confidence, 0.8);
        assert_eq!(a.expected_value, 20.0);
        assert_eq!(a.actual_value, 2.0);
    }

    #[test]
    fn tiny_leads_frame_is_skipped() {
        let rows: Vec<LeadsRow> = (1..=4).map(|d| leads_row(d, "referral", 10)).collect();
        assert!(detect_leads(&rows, &default_table()).is_empty());
    }
}
