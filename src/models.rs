use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::features::FEATURE_COUNT;

const LEAF: i64 = -1;

/// A persisted binary classifier. Class 0 is not-spam, class 1 is spam.
///
/// Externally tagged, so the same shape decodes from JSON and bincode.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpamModel {
    RandomForest(RandomForest),
    LogisticRegression(LogisticRegression),
}

impl SpamModel {
    pub fn kind(&self) -> ModelKind {
        match self {
            SpamModel::RandomForest(_) => ModelKind::RandomForest,
            SpamModel::LogisticRegression(_) => ModelKind::LogisticRegression,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            SpamModel::RandomForest(forest) => forest.validate(),
            SpamModel::LogisticRegression(linear) => linear.validate(),
        }
    }

    /// Class probabilities `[p_not_spam, p_spam]` for one scaled row.
    pub fn predict_proba(&self, row: &DVector<f64>) -> [f64; 2] {
        match self {
            SpamModel::RandomForest(forest) => forest.predict_proba(row),
            SpamModel::LogisticRegression(linear) => linear.predict_proba(row),
        }
    }

    /// Class label for one scaled row; ties resolve to class 0.
    pub fn predict(&self, row: &DVector<f64>) -> u8 {
        argmax(self.predict_proba(row))
    }
}

pub fn argmax(proba: [f64; 2]) -> u8 {
    if proba[1] > proba[0] {
        1
    } else {
        0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    RandomForest,
    LogisticRegression,
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKind::RandomForest => write!(f, "Random Forest"),
            ModelKind::LogisticRegression => write!(f, "Logistic Regression"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    pub n_features: usize,
    pub trees: Vec<DecisionTree>,
}

impl RandomForest {
    pub fn validate(&self) -> Result<(), String> {
        if self.n_features != FEATURE_COUNT {
            return Err(format!(
                "forest expects {} features, schema has {}",
                self.n_features, FEATURE_COUNT
            ));
        }
        if self.trees.is_empty() {
            return Err("forest has no trees".to_string());
        }
        for (idx, tree) in self.trees.iter().enumerate() {
            tree.validate(self.n_features)
                .map_err(|e| format!("tree {}: {}", idx, e))?;
        }
        Ok(())
    }

    /// Mean of the per-tree leaf distributions.
    pub fn predict_proba(&self, row: &DVector<f64>) -> [f64; 2] {
        let mut sum = [0.0, 0.0];
        for tree in &self.trees {
            let leaf = tree.leaf_distribution(row);
            sum[0] += leaf[0];
            sum[1] += leaf[1];
        }
        let n = self.trees.len() as f64;
        [sum[0] / n, sum[1] / n]
    }
}

/// A CART tree in flat node-array form, root at index 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeNode {
    pub feature: i64,
    pub threshold: f64,
    pub left: i64,
    pub right: i64,
    /// Per-class weights, only meaningful on leaves.
    pub value: [f64; 2],
}

impl TreeNode {
    pub fn split(feature: usize, threshold: f64, left: usize, right: usize) -> Self {
        Self {
            feature: feature as i64,
            threshold,
            left: left as i64,
            right: right as i64,
            value: [0.0, 0.0],
        }
    }

    pub fn leaf(not_spam: f64, spam: f64) -> Self {
        Self {
            feature: LEAF,
            threshold: 0.0,
            left: LEAF,
            right: LEAF,
            value: [not_spam, spam],
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.left == LEAF && self.right == LEAF
    }
}

impl DecisionTree {
    pub fn new(nodes: Vec<TreeNode>) -> Self {
        Self { nodes }
    }

    fn validate(&self, n_features: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("empty tree".to_string());
        }
        let n = self.nodes.len() as i64;
        for (idx, node) in self.nodes.iter().enumerate() {
            if node.is_leaf() {
                let total = node.value[0] + node.value[1];
                let weights_ok = node.value.iter().all(|v| v.is_finite() && *v >= 0.0);
                // The sum is the normaliser, so it must be finite as well.
                if !weights_ok || !total.is_finite() || total <= 0.0 {
                    return Err(format!("node {}: invalid leaf weights {:?}", idx, node.value));
                }
                continue;
            }
            if node.feature < 0 || node.feature as usize >= n_features {
                return Err(format!("node {}: feature index {} out of range", idx, node.feature));
            }
            if !node.threshold.is_finite() {
                return Err(format!("node {}: non-finite threshold", idx));
            }
            // Children must point forward, which also rules out cycles.
            for child in [node.left, node.right] {
                if child <= idx as i64 || child >= n {
                    return Err(format!("node {}: child index {} out of range", idx, child));
                }
            }
        }
        Ok(())
    }

    fn leaf_distribution(&self, row: &DVector<f64>) -> [f64; 2] {
        let mut idx = 0usize;
        loop {
            let node = &self.nodes[idx];
            if node.is_leaf() {
                let total = node.value[0] + node.value[1];
                return [node.value[0] / total, node.value[1] / total];
            }
            idx = if row[node.feature as usize] <= node.threshold {
                node.left as usize
            } else {
                node.right as usize
            };
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl LogisticRegression {
    pub fn validate(&self) -> Result<(), String> {
        if self.coefficients.len() != FEATURE_COUNT {
            return Err(format!(
                "expected {} coefficients, found {}",
                FEATURE_COUNT,
                self.coefficients.len()
            ));
        }
        if !self.coefficients.iter().chain([&self.intercept]).all(|v| v.is_finite()) {
            return Err("non-finite coefficient".to_string());
        }
        Ok(())
    }

    pub fn predict_proba(&self, row: &DVector<f64>) -> [f64; 2] {
        let weights = DVector::from_column_slice(&self.coefficients);
        let z = weights.dot(row) + self.intercept;
        let spam = 1.0 / (1.0 + (-z).exp());
        [1.0 - spam, spam]
    }
}

/// A fitted feature transform applied before inference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureScaler {
    Standard(StandardScaler),
    MinMax(MinMaxScaler),
}

impl FeatureScaler {
    pub fn name(&self) -> &'static str {
        match self {
            FeatureScaler::Standard(_) => "standard",
            FeatureScaler::MinMax(_) => "min_max",
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            FeatureScaler::Standard(s) => {
                if let Some(mean) = &s.mean {
                    check_vector("mean", mean)?;
                }
                if let Some(scale) = &s.scale {
                    check_vector("scale", scale)?;
                }
                Ok(())
            }
            FeatureScaler::MinMax(s) => {
                check_vector("min", &s.min)?;
                check_vector("scale", &s.scale)
            }
        }
    }

    pub fn transform(&self, row: &DVector<f64>) -> DVector<f64> {
        match self {
            FeatureScaler::Standard(s) => s.transform(row),
            FeatureScaler::MinMax(s) => s.transform(row),
        }
    }
}

fn check_vector(name: &str, values: &[f64]) -> Result<(), String> {
    if values.len() != FEATURE_COUNT {
        return Err(format!(
            "scaler {} has {} entries, expected {}",
            name,
            values.len(),
            FEATURE_COUNT
        ));
    }
    if !values.iter().all(|v| v.is_finite()) {
        return Err(format!("scaler {} contains non-finite values", name));
    }
    Ok(())
}

/// Standardization `(x - mean) / scale`; either part may be absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Option<Vec<f64>>,
    pub scale: Option<Vec<f64>>,
}

impl StandardScaler {
    pub fn transform(&self, row: &DVector<f64>) -> DVector<f64> {
        let mut out = row.clone();
        if let Some(mean) = &self.mean {
            out -= DVector::from_column_slice(mean);
        }
        if let Some(scale) = &self.scale {
            // zero-variance columns were left unscaled at fit time
            let scale = DVector::from_iterator(
                scale.len(),
                scale.iter().map(|s| if *s == 0.0 { 1.0 } else { *s }),
            );
            out.component_div_assign(&scale);
        }
        out
    }
}

/// Range scaling `x * scale + min`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinMaxScaler {
    pub min: Vec<f64>,
    pub scale: Vec<f64>,
}

impl MinMaxScaler {
    pub fn transform(&self, row: &DVector<f64>) -> DVector<f64> {
        row.component_mul(&DVector::from_column_slice(&self.scale))
            + DVector::from_column_slice(&self.min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row_with(idx: usize, value: f64) -> DVector<f64> {
        let mut row = DVector::zeros(FEATURE_COUNT);
        row[idx] = value;
        row
    }

    fn stump(feature: usize, threshold: f64, left: [f64; 2], right: [f64; 2]) -> DecisionTree {
        DecisionTree::new(vec![
            TreeNode::split(feature, threshold, 1, 2),
            TreeNode::leaf(left[0], left[1]),
            TreeNode::leaf(right[0], right[1]),
        ])
    }

    #[test]
    fn test_forest_averages_normalized_leaves() {
        let forest = RandomForest {
            n_features: FEATURE_COUNT,
            trees: vec![
                stump(51, 0.5, [30.0, 10.0], [2.0, 8.0]),
                stump(15, 1.0, [1.0, 0.0], [0.0, 1.0]),
            ],
        };
        assert!(forest.validate().is_ok());

        // tree1 → right (0.2, 0.8), tree2 → left (1.0, 0.0)
        let proba = forest.predict_proba(&row_with(51, 3.0));
        assert!((proba[0] - 0.6).abs() < 1e-12);
        assert!((proba[1] - 0.4).abs() < 1e-12);

        let model = SpamModel::RandomForest(forest);
        assert_eq!(model.predict(&row_with(51, 3.0)), 0);
    }

    #[test]
    fn test_split_threshold_is_inclusive_left() {
        let tree = stump(0, 1.0, [1.0, 0.0], [0.0, 1.0]);
        assert_eq!(tree.leaf_distribution(&row_with(0, 1.0)), [1.0, 0.0]);
        assert_eq!(tree.leaf_distribution(&row_with(0, 1.0001)), [0.0, 1.0]);
    }

    #[test]
    fn test_tie_resolves_to_not_spam() {
        assert_eq!(argmax([0.5, 0.5]), 0);
        assert_eq!(argmax([0.49, 0.51]), 1);
    }

    #[test]
    fn test_forest_validation_rejects_bad_structure() {
        let backwards = RandomForest {
            n_features: FEATURE_COUNT,
            trees: vec![DecisionTree::new(vec![
                TreeNode::leaf(1.0, 0.0),
                TreeNode::split(0, 1.0, 0, 0),
            ])],
        };
        assert!(backwards.validate().unwrap_err().contains("child index"));

        let wide = RandomForest {
            n_features: FEATURE_COUNT,
            trees: vec![stump(FEATURE_COUNT, 0.0, [1.0, 0.0], [0.0, 1.0])],
        };
        assert!(wide.validate().unwrap_err().contains("feature index"));

        let empty_leaf = RandomForest {
            n_features: FEATURE_COUNT,
            trees: vec![stump(0, 0.0, [0.0, 0.0], [0.0, 1.0])],
        };
        assert!(empty_leaf.validate().unwrap_err().contains("leaf weights"));

        let wrong_schema = RandomForest { n_features: 12, trees: vec![] };
        assert!(wrong_schema.validate().is_err());
    }

    #[test]
    fn test_leaf_weights_overflowing_their_sum_are_rejected() {
        let huge = RandomForest {
            n_features: FEATURE_COUNT,
            trees: vec![DecisionTree::new(vec![TreeNode::leaf(1e308, 1e308)])],
        };
        assert!(huge.validate().unwrap_err().contains("leaf weights"));

        // Large but summable weights still normalise to a distribution.
        let large = RandomForest {
            n_features: FEATURE_COUNT,
            trees: vec![DecisionTree::new(vec![TreeNode::leaf(1e307, 3e307)])],
        };
        assert!(large.validate().is_ok());
        let proba = large.predict_proba(&row_with(0, 0.0));
        assert!((proba[0] + proba[1] - 1.0).abs() < 1e-12);
        assert!((proba[1] - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_logistic_regression_probabilities() {
        let mut coefficients = vec![0.0; FEATURE_COUNT];
        coefficients[51] = 2.0;
        let model = LogisticRegression { coefficients, intercept: -1.0 };
        assert!(model.validate().is_ok());

        let at_boundary = model.predict_proba(&row_with(51, 0.5));
        assert!((at_boundary[1] - 0.5).abs() < 1e-12);

        let spammy = model.predict_proba(&row_with(51, 5.0));
        assert!(spammy[1] > 0.99);
        assert!((spammy[0] + spammy[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_standard_scaler_treats_zero_scale_as_one() {
        let scaler = StandardScaler {
            mean: Some(vec![1.0; FEATURE_COUNT]),
            scale: Some({
                let mut scale = vec![2.0; FEATURE_COUNT];
                scale[0] = 0.0;
                scale
            }),
        };
        let out = scaler.transform(&DVector::from_element(FEATURE_COUNT, 5.0));
        assert_eq!(out[0], 4.0);
        assert_eq!(out[1], 2.0);
    }

    #[test]
    fn test_standard_scaler_without_mean() {
        let scaler = StandardScaler { mean: None, scale: Some(vec![4.0; FEATURE_COUNT]) };
        let out = scaler.transform(&DVector::from_element(FEATURE_COUNT, 2.0));
        assert_eq!(out[10], 0.5);
    }

    #[test]
    fn test_min_max_scaler() {
        let scaler = FeatureScaler::MinMax(MinMaxScaler {
            min: vec![-1.0; FEATURE_COUNT],
            scale: vec![0.5; FEATURE_COUNT],
        });
        assert!(scaler.validate().is_ok());
        let out = scaler.transform(&DVector::from_element(FEATURE_COUNT, 4.0));
        assert_eq!(out[56], 1.0);
    }

    #[test]
    fn test_scaler_validation_checks_length() {
        let scaler = FeatureScaler::Standard(StandardScaler {
            mean: Some(vec![0.0; 3]),
            scale: None,
        });
        assert!(scaler.validate().unwrap_err().contains("mean"));
    }
}
