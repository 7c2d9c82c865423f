/*!
 * # Machine Learning Module
 *
 * The unsupervised half of the detection ensemble: feature standardization,
 * a deterministic isolation forest, and the persisted model artifact with
 * its on-disk store.
 */

pub mod isolation_forest;
pub mod model_store;
pub mod scaler;

pub use isolation_forest::{ForestConfig, IsolationForest};
pub use model_store::{ModelArtifact, ModelStore, FEATURE_SCHEMA_VERSION};
pub use scaler::StandardScaler;
