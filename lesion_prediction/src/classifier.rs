use crate::preprocess::InputTensor;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("input tensor shape {actual:?} does not match the model input {expected:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    #[error("model produced {actual} class scores, expected {expected}")]
    OutputLength { expected: usize, actual: usize },
    #[error("inference failed: {0}")]
    Runtime(String),
}

/// Categorical distribution over the label set, one score per class.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityVector(Vec<f32>);

impl ProbabilityVector {
    pub fn new(probabilities: Vec<f32>) -> Self {
        Self(probabilities)
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

/// A loaded, frozen multi-class model.
///
/// Implementations are shared read-only between concurrent requests; any
/// exclusive access the runtime needs must be handled inside `infer`.
pub trait Classifier: Send + Sync + 'static {
    fn infer(&self, tensor: &InputTensor) -> Result<ProbabilityVector, InferenceError>;
}

pub(crate) fn check_input_shape(
    tensor: &InputTensor,
    expected: &[usize],
) -> Result<(), InferenceError> {
    if tensor.shape() != expected {
        return Err(InferenceError::ShapeMismatch {
            expected: expected.to_vec(),
            actual: tensor.shape().to_vec(),
        });
    }
    Ok(())
}

pub(crate) fn check_output_len(
    probabilities: &ProbabilityVector,
    expected: usize,
) -> Result<(), InferenceError> {
    if probabilities.len() != expected {
        return Err(InferenceError::OutputLength {
            expected,
            actual: probabilities.len(),
        });
    }
    Ok(())
}
