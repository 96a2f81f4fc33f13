//! ONNX Runtime backed classifier

use crate::error::ScoringError;
use ort::memory::Allocator;
use ort::session::{builder::GraphOptimizationLevel, Session, SessionOutputs};
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType, DynValue, Tensor};
use std::fmt;
use std::path::Path;
use std::sync::RwLock;
use tracing::{debug, info};

/// Loaded ONNX session with its resolved input/output names
pub struct OnnxModel {
    /// Session::run needs `&mut`, so the session sits behind a lock
    session: RwLock<Session>,
    input_name: String,
    output_name: String,
    input_width: Option<usize>,
}

impl fmt::Debug for OnnxModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnnxModel")
            .field("input_name", &self.input_name)
            .field("output_name", &self.output_name)
            .field("input_width", &self.input_width)
            .finish_non_exhaustive()
    }
}

fn unavailable(e: impl fmt::Display) -> ScoringError {
    ScoringError::model_unavailable(e.to_string())
}

impl OnnxModel {
    /// Load an ONNX model file
    pub fn load<P: AsRef<Path>>(path: P, intra_threads: usize) -> Result<Self, ScoringError> {
        let path = path.as_ref();

        ort::init().commit().map_err(unavailable)?;

        info!(path = %path.display(), threads = intra_threads, "Loading ONNX model");

        let session = Session::builder()
            .map_err(unavailable)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(unavailable)?
            .with_intra_threads(intra_threads)
            .map_err(unavailable)?
            .commit_from_file(path)
            .map_err(|e| {
                ScoringError::model_unavailable(format!(
                    "failed to load model from {}: {e}",
                    path.display()
                ))
            })?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| ScoringError::model_unavailable("ONNX model declares no inputs"))?;
        let input_name = input.name.clone();
        let input_width = input.input_type.tensor_shape().and_then(|shape| {
            let dims: Vec<i64> = shape.iter().copied().collect();
            width_from_dims(&dims)
        });

        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob"))
            .or_else(|| session.outputs.last())
            .map(|o| o.name.clone())
            .ok_or_else(|| ScoringError::model_unavailable("ONNX model declares no outputs"))?;

        info!(
            input = %input_name,
            output = %output_name,
            width = ?input_width,
            "ONNX model loaded"
        );

        Ok(Self {
            session: RwLock::new(session),
            input_name,
            output_name,
            input_width,
        })
    }

    /// Fixed feature width of the input tensor, `None` when the dimension
    /// is symbolic
    pub fn input_width(&self) -> Option<usize> {
        self.input_width
    }

    /// Probability of the positive (default) class for one feature row
    pub fn predict(&self, features: &[f32]) -> Result<f64, ScoringError> {
        let shape = vec![1_i64, features.len() as i64];
        let input = Tensor::from_array((shape, features.to_vec()))
            .map_err(|e| ScoringError::inference(format!("failed to build input tensor: {e}")))?;

        let mut session = self
            .session
            .write()
            .map_err(|e| ScoringError::inference(format!("session lock poisoned: {e}")))?;

        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input])
            .map_err(|e| ScoringError::inference(e.to_string()))?;

        extract_probability(&outputs, &self.output_name)
    }
}

/// Last dimension of a `[batch, features]` input shape; negative means dynamic
fn width_from_dims(dims: &[i64]) -> Option<usize> {
    dims.last()
        .copied()
        .filter(|d| *d > 0)
        .and_then(|d| usize::try_from(d).ok())
}

/// Handles tensor outputs (`[1, 2]`, `[1, 1]`) and seq(map(int64, float))
/// outputs as exported by tree-boosting converters.
fn extract_probability(outputs: &SessionOutputs, output_name: &str) -> Result<f64, ScoringError> {
    let output = outputs.get(output_name).ok_or_else(|| {
        ScoringError::inference(format!("model produced no `{output_name}` output"))
    })?;

    if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
        let dims: Vec<i64> = shape.iter().copied().collect();
        let classes = dims.last().copied().unwrap_or(0);
        let prob = match (classes, data) {
            (c, [_, positive, ..]) if c >= 2 => *positive,
            (1, [single, ..]) => *single,
            _ => {
                return Err(ScoringError::inference(format!(
                    "unexpected probability tensor shape {dims:?}"
                )))
            }
        };
        debug!(prob = prob, "Extracted probability from tensor");
        return Ok(prob as f64);
    }

    if DynSequenceValueType::can_downcast(&output.dtype()) {
        return extract_from_sequence_map(output);
    }

    Err(ScoringError::inference(format!(
        "output `{output_name}` is neither a tensor nor a sequence of maps"
    )))
}

fn extract_from_sequence_map(output: &DynValue) -> Result<f64, ScoringError> {
    let allocator = Allocator::default();

    let sequence = output
        .downcast_ref::<DynSequenceValueType>()
        .map_err(|e| ScoringError::inference(format!("failed to downcast to sequence: {e}")))?;

    let maps = sequence
        .try_extract_sequence::<DynMapValueType>(&allocator)
        .map_err(|e| ScoringError::inference(e.to_string()))?;

    let first = maps
        .first()
        .ok_or_else(|| ScoringError::inference("empty probability sequence"))?;

    let pairs = first
        .try_extract_key_values::<i64, f32>()
        .map_err(|e| ScoringError::inference(e.to_string()))?;

    pairs
        .iter()
        .find(|(class, _)| *class == 1)
        .map(|(_, prob)| *prob as f64)
        .ok_or_else(|| ScoringError::inference("no probability for class 1"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_width_from_dims() {
        assert_eq!(width_from_dims(&[-1, 17]), Some(17));
        assert_eq!(width_from_dims(&[1, 12]), Some(12));
        assert_eq!(width_from_dims(&[-1, -1]), None);
        assert_eq!(width_from_dims(&[]), None);
    }
}
