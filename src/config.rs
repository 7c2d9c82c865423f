use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

use crate::ml::isolation_forest::ForestConfig;

const DEFAULT_ENV: &str = "development";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_MODEL_DIR: &str = "ml_models";
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_RESULTS: usize = 100;
const DEFAULT_CHECK_INTERVAL_MINUTES: i64 = 15;
const DEFAULT_RETRAIN_WINDOW_DAYS: u32 = 90;
const DEFAULT_RETRAIN_MIN_ROWS: usize = 20;

/// Engine configuration, loadable from `config/<RUN_ENV>.toml` plus
/// `APP__`-prefixed environment variables.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding persisted model artifacts.
    pub model_dir: String,

    /// Overall deadline for one metrics-feed fetch.
    pub fetch_timeout_secs: u64,

    /// Cap on the anomaly list returned by one detect call.
    pub max_results: usize,

    /// Cadence suggested to callers via `next_check`.
    pub check_interval_minutes: i64,

    /// Lookback window used by explicit retraining.
    pub retrain_window_days: u32,

    /// Minimum rows before an explicit retrain replaces the artifact.
    pub retrain_min_rows: usize,

    /// Expected outlier fraction assumed during training.
    pub contamination: f64,

    pub forest_trees: usize,

    /// Fixed seed keeping detection deterministic for a given window.
    pub forest_seed: u64,

    pub log_level: String,
    pub log_json: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_dir: DEFAULT_MODEL_DIR.to_string(),
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            max_results: DEFAULT_MAX_RESULTS,
            check_interval_minutes: DEFAULT_CHECK_INTERVAL_MINUTES,
            retrain_window_days: DEFAULT_RETRAIN_WINDOW_DAYS,
            retrain_min_rows: DEFAULT_RETRAIN_MIN_ROWS,
            contamination: 0.1,
            forest_trees: 100,
            forest_seed: 42,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_json: false,
        }
    }
}

impl EngineConfig {
    /// Training hyperparameters derived from this configuration.
    pub fn forest_config(&self) -> ForestConfig {
        ForestConfig {
            n_trees: self.forest_trees,
            contamination: self.contamination,
            seed: self.forest_seed,
            ..ForestConfig::default()
        }
    }
}

/// Load configuration from the optional per-environment file and the
/// environment overlay (`APP__FETCH_TIMEOUT_SECS=10` etc).
pub fn load_config() -> Result<EngineConfig, ConfigError> {
    let run_env = env::var("RUN_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());
    Config::builder()
        .add_source(File::with_name(&format!("config/{run_env}")).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?
        .try_deserialize()
}

/// Initialize the tracing subscriber. `RUST_LOG` overrides the configured
/// level; repeated calls are no-ops.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default_directive = format!("anomaly_engine={level}");
    let directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);
    let filter = EnvFilter::new(directive);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .try_init()
            .ok();
    }
}
