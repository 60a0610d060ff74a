use crate::{
    classifier::{check_input_shape, check_output_len, Classifier, InferenceError, ProbabilityVector},
    config::{ModelConfig, Validatable},
    preprocess::InputTensor,
};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::{
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("invalid model configuration: {0}")]
    Config(String),
    #[error("failed to load model {path}: {message}")]
    Session { path: String, message: String },
    #[error("model {0} declares no outputs")]
    NoOutput(String),
}

fn build_session(path: &Path) -> Result<Session, String> {
    Session::builder()
        .map_err(|e| e.to_string())?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| e.to_string())?
        .commit_from_file(path)
        .map_err(|e| e.to_string())
}

/// ONNX Runtime classifier backed by a round-robin pool of sessions.
#[derive(Clone)]
pub struct OrtClassifier {
    sessions: Arc<Vec<Arc<Mutex<Session>>>>,
    counter: Arc<AtomicUsize>,
    output_name: String,
    input_shape: [usize; 4],
    num_classes: usize,
}

impl OrtClassifier {
    pub fn new(model_config: &ModelConfig, num_classes: usize) -> Result<Self, ModelLoadError> {
        model_config.validate().map_err(ModelLoadError::Config)?;

        let path = model_config.get_path();
        let num_instances = model_config.num_instances;
        let sessions = (0..num_instances)
            .map(|_| {
                let session = build_session(&path).map_err(|message| ModelLoadError::Session {
                    path: path.display().to_string(),
                    message,
                })?;
                Ok(Arc::new(Mutex::new(session)))
            })
            .collect::<Result<Vec<_>, ModelLoadError>>()?;

        let output_name = {
            let session = sessions[0]
                .lock()
                .map_err(|e| ModelLoadError::Config(format!("session mutex poisoned: {}", e)))?;
            session
                .outputs
                .first()
                .map(|output| output.name.clone())
                .ok_or_else(|| ModelLoadError::NoOutput(path.display().to_string()))?
        };

        tracing::info!(
            "Created {} ONNX sessions for {:?}, reading output {}",
            num_instances,
            path,
            output_name
        );

        let size = model_config.input_size as usize;
        Ok(Self {
            sessions: Arc::new(sessions),
            counter: Arc::new(AtomicUsize::new(0)),
            output_name,
            input_shape: [1, size, size, 3],
            num_classes,
        })
    }

    fn run_inference(&self, tensor: &InputTensor) -> Result<Vec<f32>, InferenceError> {
        let index = self.counter.fetch_add(1, Ordering::SeqCst) % self.sessions.len();
        let mut session = self.sessions[index]
            .lock()
            .map_err(|e| InferenceError::Runtime(format!("session mutex poisoned: {}", e)))?;

        tracing::debug!("Handling request with session {}", index);
        let input = tensor.as_array();
        let owned_buffer;
        let input_view = if input.is_standard_layout() {
            input.view()
        } else {
            owned_buffer = input.as_standard_layout().into_owned();
            owned_buffer.view()
        };

        let tensor_ref = TensorRef::from_array_view(input_view)
            .map_err(|e| InferenceError::Runtime(format!("failed to build tensor: {}", e)))?;

        let outputs = session
            .run(ort::inputs![tensor_ref])
            .map_err(|e| InferenceError::Runtime(e.to_string()))?;

        let (_, data) = outputs[self.output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| InferenceError::Runtime(format!("failed to extract tensor: {}", e)))?;

        Ok(data.to_vec())
    }
}

impl Classifier for OrtClassifier {
    fn infer(&self, tensor: &InputTensor) -> Result<ProbabilityVector, InferenceError> {
        check_input_shape(tensor, &self.input_shape)?;

        let probabilities = ProbabilityVector::new(self.run_inference(tensor)?);
        check_output_len(&probabilities, self.num_classes)?;

        Ok(probabilities)
    }
}
