// This module wraps the statistical win-probability model used to price every game.
// The search treats it as an opaque function: feature vector in, probability the home team wins out.
// Two variants exist, one trained with the point spread and one without.

use crate::error::{Result, SurvivorError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelVariant {
    /// Trained with the point spread
    Full,
    NoSpread,
}

/// A predictor of home-team win probability.
/// `feature_names` gives the exact order in which `predict` expects its inputs.
pub trait WinPredictor: Send + Sync {
    fn feature_names(&self, variant: ModelVariant) -> &[String];

    fn predict(&self, variant: ModelVariant, inputs: &[f64]) -> Result<f64>;
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Logistic regression exported as coefficients: P(home wins) = sigmoid(intercept + coef · x)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticModel {
    pub feature_names: Vec<String>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl LogisticModel {
    pub fn new(feature_names: Vec<String>, coefficients: Vec<f64>, intercept: f64) -> Result<Self> {
        let model = LogisticModel {
            feature_names,
            coefficients,
            intercept,
        };
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<()> {
        if self.feature_names.len() != self.coefficients.len() {
            return Err(SurvivorError::Predictor(format!(
                "model has {} feature names but {} coefficients",
                self.feature_names.len(),
                self.coefficients.len()
            )));
        }
        if !self.intercept.is_finite() || self.coefficients.iter().any(|c| !c.is_finite()) {
            return Err(SurvivorError::Predictor("model parameters must be finite".to_string()));
        }
        Ok(())
    }

    pub fn predict_proba(&self, inputs: &[f64]) -> Result<f64> {
        if inputs.len() != self.coefficients.len() {
            return Err(SurvivorError::Predictor(format!(
                "expected {} inputs, got {}",
                self.coefficients.len(),
                inputs.len()
            )));
        }
        let z = self.intercept
            + self
                .coefficients
                .iter()
                .zip(inputs)
                .map(|(c, x)| c * x)
                .sum::<f64>();
        let p = sigmoid(z);
        if !p.is_finite() {
            return Err(SurvivorError::Predictor(format!("non-finite probability from z = {}", z)));
        }
        Ok(p)
    }
}

/// The full and no-spread models, as exported to JSON by the training pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPair {
    pub full: LogisticModel,
    pub no_spread: LogisticModel,
}

impl ModelPair {
    /// Load a model pair from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let pair: ModelPair = serde_json::from_str(json)?;
        pair.full.validate()?;
        pair.no_spread.validate()?;
        Ok(pair)
    }

    fn model(&self, variant: ModelVariant) -> &LogisticModel {
        match variant {
            ModelVariant::Full => &self.full,
            ModelVariant::NoSpread => &self.no_spread,
        }
    }
}

impl WinPredictor for ModelPair {
    fn feature_names(&self, variant: ModelVariant) -> &[String] {
        &self.model(variant).feature_names
    }

    fn predict(&self, variant: ModelVariant, inputs: &[f64]) -> Result<f64> {
        self.model(variant).predict_proba(inputs)
    }
}
