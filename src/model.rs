//! Fitted model artifacts: a standard scaler and a regressor, both exported
//! as JSON by the training pipeline and loaded once at startup.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::ModelLoadError;
use crate::models::{FeatureVector, FEATURE_COUNT, FIELDS};

#[derive(Debug, Clone, Deserialize)]
pub struct StandardScaler {
    pub feature_names: Vec<String>,
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    fn validate(&self) -> Result<(), String> {
        let expected: Vec<&str> = FIELDS.iter().map(|field| field.key).collect();
        if self.feature_names != expected {
            return Err(format!(
                "feature order {:?} does not match expected {:?}",
                self.feature_names, expected
            ));
        }
        if self.mean.len() != FEATURE_COUNT || self.scale.len() != FEATURE_COUNT {
            return Err(format!(
                "expected {FEATURE_COUNT} mean/scale entries, found {}/{}",
                self.mean.len(),
                self.scale.len()
            ));
        }
        if self.mean.iter().chain(&self.scale).any(|value| !value.is_finite()) {
            return Err("mean/scale contain non-finite values".to_string());
        }
        Ok(())
    }

    pub fn transform(&self, values: &[f64; FEATURE_COUNT]) -> [f64; FEATURE_COUNT] {
        let mut scaled = [0.0; FEATURE_COUNT];
        for (index, value) in values.iter().enumerate() {
            // zero variance at fit time means the feature was constant
            let scale = if self.scale[index] == 0.0 {
                1.0
            } else {
                self.scale[index]
            };
            scaled[index] = (value - self.mean[index]) / scale;
        }
        scaled
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Leaf {
        leaf: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// One regression tree stored as a flat node array rooted at index 0.
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct RegressionTree {
    nodes: Vec<TreeNode>,
}

impl RegressionTree {
    fn validate(&self) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("empty tree".to_string());
        }
        for (index, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Leaf { leaf } if !leaf.is_finite() => {
                    return Err(format!("node {index} has a non-finite leaf value"));
                }
                TreeNode::Leaf { .. } => {}
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= FEATURE_COUNT {
                        return Err(format!("node {index} splits on unknown feature {feature}"));
                    }
                    if !threshold.is_finite() {
                        return Err(format!("node {index} has a non-finite threshold"));
                    }
                    // children must point forward so traversal always terminates
                    for child in [left, right] {
                        if *child <= index || *child >= self.nodes.len() {
                            return Err(format!("node {index} has invalid child {child}"));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    pub fn evaluate(&self, values: &[f64; FEATURE_COUNT]) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                TreeNode::Leaf { leaf } => return *leaf,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if values[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Regressor {
    GradientBoosting {
        init: f64,
        learning_rate: f64,
        trees: Vec<RegressionTree>,
    },
    Linear {
        coefficients: Vec<f64>,
        intercept: f64,
    },
}

impl Regressor {
    fn validate(&self) -> Result<(), String> {
        match self {
            Self::GradientBoosting {
                init,
                learning_rate,
                trees,
            } => {
                if !init.is_finite() || !learning_rate.is_finite() {
                    return Err("init/learning_rate must be finite".to_string());
                }
                for (index, tree) in trees.iter().enumerate() {
                    tree.validate().map_err(|reason| format!("tree {index}: {reason}"))?;
                }
                Ok(())
            }
            Self::Linear {
                coefficients,
                intercept,
            } => {
                if coefficients.len() != FEATURE_COUNT {
                    return Err(format!(
                        "expected {FEATURE_COUNT} coefficients, found {}",
                        coefficients.len()
                    ));
                }
                if !intercept.is_finite() || coefficients.iter().any(|c| !c.is_finite()) {
                    return Err("coefficients must be finite".to_string());
                }
                Ok(())
            }
        }
    }

    pub fn predict(&self, values: &[f64; FEATURE_COUNT]) -> f64 {
        match self {
            Self::GradientBoosting {
                init,
                learning_rate,
                trees,
            } => {
                let boost: f64 = trees.iter().map(|tree| tree.evaluate(values)).sum();
                init + learning_rate * boost
            }
            Self::Linear {
                coefficients,
                intercept,
            } => {
                intercept
                    + coefficients
                        .iter()
                        .zip(values)
                        .map(|(coefficient, value)| coefficient * value)
                        .sum::<f64>()
            }
        }
    }
}

/// Immutable scaler + regressor pair shared by every request.
#[derive(Debug, Clone)]
pub struct ModelArtifacts {
    pub regressor: Regressor,
    pub scaler: StandardScaler,
}

impl ModelArtifacts {
    pub fn load(model_path: &Path, scaler_path: &Path) -> Result<Self, ModelLoadError> {
        // both artifacts are required, so report a missing one before parsing either
        for path in [model_path, scaler_path] {
            if !path.exists() {
                return Err(ModelLoadError::Missing {
                    path: path.to_path_buf(),
                });
            }
        }

        let regressor: Regressor = read_artifact(model_path)?;
        regressor
            .validate()
            .map_err(|reason| malformed(model_path, reason))?;

        let scaler: StandardScaler = read_artifact(scaler_path)?;
        scaler
            .validate()
            .map_err(|reason| malformed(scaler_path, reason))?;

        Ok(Self { regressor, scaler })
    }

    /// Model output in log space, before the `expm1` inverse.
    pub fn predict_log(&self, features: &FeatureVector) -> f64 {
        let scaled = self.scaler.transform(&features.to_array());
        self.regressor.predict(&scaled)
    }
}

fn read_artifact<T: DeserializeOwned>(path: &Path) -> Result<T, ModelLoadError> {
    let content = std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ModelLoadError::Missing {
                path: path.to_path_buf(),
            }
        } else {
            ModelLoadError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    serde_json::from_str(&content).map_err(|err| malformed(path, err.to_string()))
}

fn malformed(path: &Path, reason: String) -> ModelLoadError {
    ModelLoadError::Malformed {
        path: path.to_path_buf(),
        reason,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;
    use tempfile::TempDir;

    pub(crate) fn scaler_json() -> serde_json::Value {
        json!({
            "feature_names": FIELDS.iter().map(|field| field.key).collect::<Vec<_>>(),
            "mean": [1000.0, 5.0, 200.0, 80.0, 70.0, 50.0, 5.0, 10.0, 200.0, 10.0],
            "scale": [500.0, 2.0, 100.0, 10.0, 10.0, 25.0, 5.0, 5.0, 100.0, 0.0],
        })
    }

    /// Splits on scaled interactions, then on scaled participation.
    pub(crate) fn boosting_json() -> serde_json::Value {
        json!({
            "kind": "gradient_boosting",
            "init": 10.0,
            "learning_rate": 0.5,
            "trees": [
                [
                    {"feature": 0, "threshold": 0.0, "left": 1, "right": 2},
                    {"leaf": -1.0},
                    {"feature": 4, "threshold": 0.5, "left": 3, "right": 4},
                    {"leaf": 1.0},
                    {"leaf": 2.0}
                ],
                [
                    {"leaf": 0.4}
                ]
            ]
        })
    }

    pub(crate) fn artifacts() -> ModelArtifacts {
        ModelArtifacts {
            regressor: serde_json::from_value(boosting_json()).unwrap(),
            scaler: serde_json::from_value(scaler_json()).unwrap(),
        }
    }

    fn write_pair(model: &serde_json::Value, scaler: &serde_json::Value) -> (TempDir, PathBuf, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let model_path = dir.path().join("model.json");
        let scaler_path = dir.path().join("scaler.json");
        std::fs::write(&model_path, model.to_string()).unwrap();
        std::fs::write(&scaler_path, scaler.to_string()).unwrap();
        (dir, model_path, scaler_path)
    }

    #[test]
    fn scaler_standardizes_and_guards_zero_scale() {
        let scaler: StandardScaler = serde_json::from_value(scaler_json()).unwrap();
        let scaled = scaler.transform(&[1500.0, 5.0, 100.0, 90.0, 70.0, 50.0, 0.0, 10.0, 200.0, 12.0]);
        assert_eq!(scaled[0], 1.0);
        assert_eq!(scaled[1], 0.0);
        assert_eq!(scaled[2], -1.0);
        assert_eq!(scaled[3], 1.0);
        assert_eq!(scaled[6], -1.0);
        assert_eq!(scaled[9], 2.0);
    }

    #[test]
    fn tree_routes_left_on_equal_threshold() {
        let regressor: Regressor = serde_json::from_value(boosting_json()).unwrap();
        let Regressor::GradientBoosting { trees, .. } = &regressor else {
            panic!("expected gradient boosting");
        };
        let mut values = [0.0; FEATURE_COUNT];
        assert_eq!(trees[0].evaluate(&values), -1.0);
        values[0] = 0.1;
        assert_eq!(trees[0].evaluate(&values), 1.0);
        values[4] = 0.6;
        assert_eq!(trees[0].evaluate(&values), 2.0);
    }

    #[test]
    fn boosting_sums_scaled_trees() {
        let regressor: Regressor = serde_json::from_value(boosting_json()).unwrap();
        let mut values = [0.0; FEATURE_COUNT];
        values[0] = 1.0;
        values[4] = 1.0;
        let expected = 10.0 + 0.5 * (2.0 + 0.4);
        assert!((regressor.predict(&values) - expected).abs() < 1e-12);
    }

    #[test]
    fn linear_regressor_is_dot_product_plus_intercept() {
        let regressor: Regressor = serde_json::from_value(json!({
            "kind": "linear",
            "coefficients": [1.0, 2.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, -1.0],
            "intercept": 3.0
        }))
        .unwrap();
        regressor.validate().unwrap();
        let mut values = [0.0; FEATURE_COUNT];
        values[0] = 2.0;
        values[1] = 1.5;
        values[9] = 4.0;
        assert_eq!(regressor.predict(&values), 3.0 + 2.0 + 3.0 - 4.0);
    }

    #[test]
    fn load_reads_both_artifacts() {
        let (_dir, model_path, scaler_path) = write_pair(&boosting_json(), &scaler_json());
        let loaded = ModelArtifacts::load(&model_path, &scaler_path).unwrap();
        let features = FeatureVector::from_array([1000.0, 5.0, 200.0, 80.0, 70.0, 50.0, 5.0, 10.0, 200.0, 10.0]);
        // everything scales to zero: first tree goes left
        assert!((loaded.predict_log(&features) - (10.0 + 0.5 * (-1.0 + 0.4))).abs() < 1e-12);
    }

    #[test]
    fn bundled_demo_artifacts_load() {
        let demos = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos");
        let loaded = ModelArtifacts::load(&demos.join("model.json"), &demos.join("scaler.json")).unwrap();
        let estimate = loaded.predict_log(&FeatureVector::defaults()).exp_m1();
        assert!(estimate.is_finite() && estimate > 0.0);
    }

    #[test]
    fn missing_file_is_reported_as_missing() {
        let (dir, model_path, _scaler_path) = write_pair(&boosting_json(), &scaler_json());
        let err = ModelArtifacts::load(&model_path, &dir.path().join("absent.json")).unwrap_err();
        assert!(err.is_missing());
        assert!(err.to_string().contains("absent.json"));
    }

    #[test]
    fn unparseable_file_is_malformed() {
        let (_dir, model_path, scaler_path) = write_pair(&boosting_json(), &scaler_json());
        std::fs::write(&model_path, "not json").unwrap();
        let err = ModelArtifacts::load(&model_path, &scaler_path).unwrap_err();
        assert!(matches!(err, ModelLoadError::Malformed { .. }));
        assert!(!err.is_missing());
    }

    #[test]
    fn scaler_with_wrong_feature_order_is_rejected() {
        let mut scaler = scaler_json();
        scaler["feature_names"][0] = json!("advisors");
        scaler["feature_names"][1] = json!("interactions");
        let (_dir, model_path, scaler_path) = write_pair(&boosting_json(), &scaler);
        let err = ModelArtifacts::load(&model_path, &scaler_path).unwrap_err();
        assert!(err.to_string().contains("feature order"), "{err}");
    }

    #[test]
    fn cyclic_tree_is_rejected() {
        let mut model = boosting_json();
        model["trees"][0][2]["left"] = json!(0);
        let (_dir, model_path, scaler_path) = write_pair(&model, &scaler_json());
        let err = ModelArtifacts::load(&model_path, &scaler_path).unwrap_err();
        assert!(err.to_string().contains("invalid child 0"), "{err}");
    }

    #[test]
    fn out_of_range_feature_is_rejected() {
        let mut model = boosting_json();
        model["trees"][0][0]["feature"] = json!(10);
        let (_dir, model_path, scaler_path) = write_pair(&model, &scaler_json());
        let err = ModelArtifacts::load(&model_path, &scaler_path).unwrap_err();
        assert!(err.to_string().contains("unknown feature 10"), "{err}");
    }
}
