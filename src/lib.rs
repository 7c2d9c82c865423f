//! Anomaly Detection Engine
//!
//! This crate detects abnormal patterns in time-stamped CRM business metrics
//! (sales transactions, manager activity, lead counts) by combining three
//! independent detection strategies: closed-form statistics, an unsupervised
//! isolation-forest learner with a persisted model lifecycle, and
//! runtime-configurable business rules. Findings are merged, ranked by
//! severity, and forwarded to a downstream sink.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod detectors;
pub mod errors;
pub mod feed;
pub mod ml;
pub mod models;
pub mod rule_store;
pub mod services;
pub mod sink;

pub use config::EngineConfig;
pub use errors::DetectionError;
pub use feed::MetricsFeed;
pub use models::{Anomaly, DetectionResponse, DetectionRule, MetricFamily, Severity};
pub use rule_store::RuleStore;
pub use services::detection::DetectionService;
pub use sink::ResultSink;
