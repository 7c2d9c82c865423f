//! Metrics feed contract.
//!
//! The engine treats its metrics store as a pure query function: a lookback
//! window in, tabular rows with a declared per-family column schema out.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::DetectionError;

/// One day of aggregated deal data for one manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesRow {
    pub date: NaiveDate,
    /// Manager the deals are attributed to.
    pub entity_id: String,
    pub deals_count: u32,
    pub total_amount: f64,
    pub avg_amount: f64,
    pub max_amount: f64,
}

/// One day of activity records for one manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRow {
    pub date: NaiveDate,
    pub entity_id: String,
    pub activity_type: String,
    pub count: u32,
}

/// Daily lead count per acquisition source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadsRow {
    pub date: NaiveDate,
    pub source: String,
    pub count: u32,
}

/// Supplier of historical time-series rows for a requested lookback window.
///
/// Implementations wrap whatever columnar store the deployment uses; the
/// engine only depends on the row schemas above.
#[async_trait]
pub trait MetricsFeed: Send + Sync {
    async fn fetch_sales(&self, window_days: u32) -> Result<Vec<SalesRow>, DetectionError>;

    async fn fetch_activity(&self, window_days: u32)
        -> Result<Vec<ActivityRow>, DetectionError>;

    async fn fetch_leads(&self, window_days: u32) -> Result<Vec<LeadsRow>, DetectionError>;
}
