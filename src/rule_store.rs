//! Runtime-configurable detection rules.
//!
//! The rule table is swapped as a whole `Arc`: concurrent readers always see
//! either the previous table or the new one in full, never a partially
//! applied batch.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::info;

use crate::models::{DetectionRule, RuleComparison};

pub type RuleTable = HashMap<String, DetectionRule>;

pub const HIGH_AMOUNT_RULE: &str = "high_amount_multiplier";
pub const SALES_DROP_RULE: &str = "sales_drop_threshold";
pub const ACTIVITY_DROP_RULE: &str = "activity_drop_threshold";
pub const LEADS_DROP_RULE: &str = "leads_drop_threshold";
pub const ZERO_ACTIVITY_RULE: &str = "zero_activity_days";

/// Threshold for a named rule, falling back to the given default when the
/// rule is absent or disabled.
pub fn threshold_or(table: &RuleTable, metric: &str, default: f64) -> f64 {
    match table.get(metric) {
        Some(rule) if rule.enabled => rule.threshold,
        _ => default,
    }
}

/// Holds the mutable set of detection rules consulted by the rule-based
/// detectors, plus the notification channels configured alongside them.
pub struct RuleStore {
    table: RwLock<Arc<RuleTable>>,
    channels: RwLock<Arc<Vec<String>>>,
}

impl RuleStore {
    /// A store seeded with the default rule catalogue.
    pub fn new() -> Self {
        let defaults = [
            // 30% drop in overall sales
            (SALES_DROP_RULE, 0.3, RuleComparison::LessThan),
            // 50% drop in activity
            (ACTIVITY_DROP_RULE, 0.5, RuleComparison::LessThan),
            // 50% drop in leads per source
            (LEADS_DROP_RULE, 0.5, RuleComparison::LessThan),
            // single deal 5x larger than the mean
            (HIGH_AMOUNT_RULE, 5.0, RuleComparison::GreaterThan),
            // consecutive days without activity
            (ZERO_ACTIVITY_RULE, 3.0, RuleComparison::GreaterThan),
        ];
        let table = defaults
            .into_iter()
            .map(|(metric, threshold, comparison)| {
                (
                    metric.to_string(),
                    DetectionRule {
                        metric: metric.to_string(),
                        threshold,
                        comparison,
                        enabled: true,
                    },
                )
            })
            .collect();
        Self {
            table: RwLock::new(Arc::new(table)),
            channels: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Consistent snapshot of the current rule table.
    pub fn snapshot(&self) -> Arc<RuleTable> {
        self.table
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Apply a batch of rule updates (last-write-wins per metric name) by
    /// building a new table and swapping it in as a whole. Returns the number
    /// of rule records applied.
    pub fn apply(&self, rules: &[DetectionRule]) -> usize {
        let mut next: RuleTable = (*self.snapshot()).clone();
        for rule in rules {
            next.insert(rule.metric.clone(), rule.clone());
        }
        *self
            .table
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Arc::new(next);
        info!(updated = rules.len(), "detection rules updated");
        rules.len()
    }

    pub fn notification_channels(&self) -> Arc<Vec<String>> {
        self.channels
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn set_notification_channels(&self, channels: Vec<String>) {
        *self
            .channels
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Arc::new(channels);
    }
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::new()
    }
}
