//! Gradient-boosted decision tree ensemble for binary classification.
//!
//! Trees are stored as flat node arrays exported from the training job.
//! Each split sends a sample left when `x[feature] <= threshold`; the raw
//! margin is `base_score` plus the reached leaf of every tree, and the
//! probability of default is its sigmoid.

use crate::error::ScoringError;
use crate::models::inference::sigmoid;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<TreeNode>,
}

impl Tree {
    fn validate(&self, tree_index: usize, n_features: usize) -> Result<(), ScoringError> {
        if self.nodes.is_empty() {
            return Err(ScoringError::model_unavailable(format!(
                "tree {tree_index} has no nodes"
            )));
        }

        for (i, node) in self.nodes.iter().enumerate() {
            match *node {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if feature >= n_features {
                        return Err(ScoringError::model_unavailable(format!(
                            "tree {tree_index} node {i} splits on feature {feature}, model has {n_features}"
                        )));
                    }
                    if threshold.is_nan() {
                        return Err(ScoringError::model_unavailable(format!(
                            "tree {tree_index} node {i} has a NaN threshold"
                        )));
                    }
                    // Children must point forward so evaluation always terminates
                    for child in [left, right] {
                        if child <= i || child >= self.nodes.len() {
                            return Err(ScoringError::model_unavailable(format!(
                                "tree {tree_index} node {i} has invalid child {child}"
                            )));
                        }
                    }
                }
                TreeNode::Leaf { value } => {
                    if !value.is_finite() {
                        return Err(ScoringError::model_unavailable(format!(
                            "tree {tree_index} leaf {i} is not finite"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn leaf_value(&self, features: &[f64]) -> f64 {
        let mut index = 0;
        loop {
            match self.nodes[index] {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if features[feature] <= threshold { left } else { right };
                }
                TreeNode::Leaf { value } => return value,
            }
        }
    }
}

/// Additive tree ensemble with a logistic link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEnsemble {
    #[serde(default)]
    pub base_score: f64,
    pub trees: Vec<Tree>,
}

impl TreeEnsemble {
    pub fn from_json_str(json: &str, n_features: usize) -> Result<Self, ScoringError> {
        let ensemble: Self = serde_json::from_str(json)
            .map_err(|e| ScoringError::model_unavailable(format!("invalid tree ensemble: {e}")))?;
        ensemble.validate(n_features)?;
        Ok(ensemble)
    }

    pub fn validate(&self, n_features: usize) -> Result<(), ScoringError> {
        if self.trees.is_empty() {
            return Err(ScoringError::model_unavailable("tree ensemble has no trees"));
        }
        if !self.base_score.is_finite() {
            return Err(ScoringError::model_unavailable(
                "tree ensemble base score is not finite",
            ));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(i, n_features)?;
        }
        Ok(())
    }

    pub fn margin(&self, features: &[f64]) -> f64 {
        self.trees
            .iter()
            .fold(self.base_score, |acc, tree| acc + tree.leaf_value(features))
    }

    pub fn predict(&self, features: &[f64]) -> f64 {
        sigmoid(self.margin(features))
    }
}
