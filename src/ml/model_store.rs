//! Persisted model artifact and its on-disk store.

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::DetectionError;
use crate::ml::isolation_forest::IsolationForest;
use crate::ml::scaler::StandardScaler;
use crate::models::MetricFamily;

/// Version tag of the feature vector layout. Bumping it invalidates any
/// persisted artifact, which is then ignored on load and rebuilt on demand.
pub const FEATURE_SCHEMA_VERSION: u32 = 1;

/// The trained unsupervised model's persisted state: fitted forest, fitted
/// feature scaler, and training metadata. Never mutated in place; retraining
/// produces a new artifact that atomically replaces the old one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub forest: IsolationForest,
    pub scaler: StandardScaler,
    pub trained_at: DateTime<Utc>,
    pub feature_schema_version: u32,
    pub row_count_at_training: usize,
}

impl ModelArtifact {
    pub fn is_schema_compatible(&self) -> bool {
        self.feature_schema_version == FEATURE_SCHEMA_VERSION
    }
}

/// Durable storage for one metric family's model artifact.
pub struct ModelStore {
    path: PathBuf,
}

impl ModelStore {
    pub fn new(dir: impl Into<PathBuf>, family: MetricFamily) -> Self {
        let mut path = dir.into();
        path.push(format!("{family}_anomaly_model.json"));
        Self { path }
    }

    /// Load the persisted artifact, if a compatible one exists.
    ///
    /// Missing files, corrupt JSON, and schema-version mismatches all return
    /// `Ok(None)` (logged): the engine then retrains on demand instead of
    /// crashing on an unusable artifact.
    pub fn load(&self) -> Result<Option<ModelArtifact>, DetectionError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)?;
        let artifact: ModelArtifact = match serde_json::from_str(&raw) {
            Ok(artifact) => artifact,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring corrupt model artifact");
                return Ok(None);
            }
        };
        if !artifact.is_schema_compatible() {
            warn!(
                path = %self.path.display(),
                found = artifact.feature_schema_version,
                expected = FEATURE_SCHEMA_VERSION,
                "ignoring model artifact with incompatible feature schema"
            );
            return Ok(None);
        }
        info!(path = %self.path.display(), trained_at = %artifact.trained_at, "loaded model artifact");
        Ok(Some(artifact))
    }

    /// Persist an artifact with write-new-then-rename so a failure mid-write
    /// cannot destroy the previously working artifact.
    pub fn save(&self, artifact: &ModelArtifact) -> Result<(), DetectionError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(artifact)?)?;
        fs::rename(&tmp, &self.path)?;
        info!(path = %self.path.display(), rows = artifact.row_count_at_training, "saved model artifact");
        Ok(())
    }
}
