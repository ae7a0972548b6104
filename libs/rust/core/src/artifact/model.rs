//! Model artifacts behind the opaque `predict(input) -> scores` capability.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use super::{extension, LoadError};

/// Inference capability of a loaded model. Implementations must not mutate shared state
/// in `predict`; handles are shared across request workers.
pub trait Predictor: Send + Sync {
    fn predict(&self, input: &[f32]) -> Result<Vec<f32>>;
    fn info(&self) -> ModelInfo;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub format: String,
    pub input_dim: usize,
    pub output_dim: usize,
    pub labels: Vec<String>,
    pub parameters: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation { #[default] Softmax, Sigmoid, Identity }

/// Single dense layer classifier serialized as JSON: `scores = act(W x + b)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseModel {
    pub input_dim: usize,
    #[serde(default)]
    pub labels: Vec<String>,
    pub weights: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
    #[serde(default)]
    pub activation: Activation,
}

impl DenseModel {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.weights.is_empty() { return Err("model has no output units".into()); }
        if self.weights.len() != self.bias.len() {
            return Err(format!("{} weight rows but {} bias terms", self.weights.len(), self.bias.len()));
        }
        if let Some((i, row)) = self.weights.iter().enumerate().find(|(_, r)| r.len() != self.input_dim) {
            return Err(format!("weight row {i} has {} columns, expected {}", row.len(), self.input_dim));
        }
        if !self.labels.is_empty() && self.labels.len() != self.weights.len() {
            return Err(format!("{} labels for {} outputs", self.labels.len(), self.weights.len()));
        }
        Ok(())
    }

    pub fn output_dim(&self) -> usize { self.weights.len() }
}

impl Predictor for DenseModel {
    fn predict(&self, input: &[f32]) -> Result<Vec<f32>> {
        if input.len() != self.input_dim {
            bail!("input has {} values, model expects {}", input.len(), self.input_dim);
        }
        let mut out: Vec<f32> = self.weights.iter().zip(&self.bias)
            .map(|(row, b)| row.iter().zip(input).map(|(w, x)| w * x).sum::<f32>() + b)
            .collect();
        match self.activation {
            Activation::Softmax => softmax(&mut out),
            Activation::Sigmoid => out.iter_mut().for_each(|x| *x = 1.0 / (1.0 + (-*x).exp())),
            Activation::Identity => {}
        }
        Ok(out)
    }

    fn info(&self) -> ModelInfo {
        ModelInfo {
            format: "dense-json".into(),
            input_dim: self.input_dim,
            output_dim: self.output_dim(),
            labels: self.labels.clone(),
            parameters: self.weights.iter().map(Vec::len).sum::<usize>() + self.bias.len(),
        }
    }
}

pub(crate) fn softmax(v: &mut [f32]) {
    if v.is_empty() { return; }
    let max = v.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0;
    for x in v.iter_mut() { *x = (*x - max).exp(); sum += *x; }
    if sum > 0.0 { for x in v.iter_mut() { *x /= sum; } }
}

pub fn load_model(path: &Path) -> std::result::Result<Arc<dyn Predictor>, LoadError> {
    match extension(path).as_str() {
        "json" => {
            let bytes = std::fs::read(path).map_err(|e| LoadError::io(path, e))?;
            let model: DenseModel = serde_json::from_slice(&bytes).map_err(|e| LoadError::malformed(path, e))?;
            model.validate().map_err(|e| LoadError::malformed(path, e))?;
            Ok(Arc::new(model))
        }
        #[cfg(feature = "onnx")]
        "onnx" => {
            if !path.exists() { return Err(LoadError::Missing(path.to_path_buf())); }
            let model = onnx::OnnxModel::load(path).map_err(|e| LoadError::malformed(path, format!("{e:#}")))?;
            Ok(Arc::new(model))
        }
        _ => Err(LoadError::Unsupported(path.to_path_buf())),
    }
}

#[cfg(feature = "onnx")]
mod onnx {
    use super::{ModelInfo, Predictor};
    use anyhow::Result;
    use std::path::Path;
    use tract_onnx::prelude::*;

    pub struct OnnxModel {
        plan: TypedRunnableModel<TypedModel>,
        input_dim: usize,
        output_dim: usize,
    }

    fn concrete_len(fact: &TypedFact) -> usize {
        fact.shape.as_concrete().map(|s| s.iter().product::<usize>()).unwrap_or(0)
    }

    impl OnnxModel {
        pub fn load(path: &Path) -> Result<Self> {
            let model = tract_onnx::onnx().model_for_path(path)?.into_optimized()?;
            let input_dim = concrete_len(model.input_fact(0)?);
            let output_dim = concrete_len(model.output_fact(0)?);
            let plan = model.into_runnable()?;
            Ok(Self { plan, input_dim, output_dim })
        }
    }

    impl Predictor for OnnxModel {
        fn predict(&self, input: &[f32]) -> Result<Vec<f32>> {
            if self.input_dim != 0 && input.len() != self.input_dim {
                anyhow::bail!("input has {} values, model expects {}", input.len(), self.input_dim);
            }
            let tensor = Tensor::from_shape(&[1, input.len()], input)?;
            let outputs = self.plan.run(tvec!(tensor.into()))?;
            let view = outputs[0].to_array_view::<f32>()?;
            Ok(view.iter().copied().collect())
        }

        fn info(&self) -> ModelInfo {
            ModelInfo { format: "onnx".into(), input_dim: self.input_dim, output_dim: self.output_dim, labels: Vec::new(), parameters: 0 }
        }
    }
}
