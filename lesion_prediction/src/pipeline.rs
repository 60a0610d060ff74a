use crate::{
    classifier::{check_output_len, Classifier, InferenceError},
    config::Config,
    decision::DecisionPolicy,
    decoder::{DecodeError, ImageDecoder},
    labels::{LabelError, LabelTable},
    preprocess::{PreprocessError, Preprocessor},
    response::PredictionResponse,
};
use std::{path::Path, sync::Arc, time::Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{0}")]
    Decode(#[from] DecodeError),
    #[error("{0}")]
    Preprocess(#[from] PreprocessError),
    #[error("{0}")]
    Inference(#[from] InferenceError),
    #[error("{0}")]
    Label(#[from] LabelError),
}

/// Decode, preprocess, classify, decide and shape the response for one stored upload.
#[derive(Clone)]
pub struct InferencePipeline {
    decoder: ImageDecoder,
    preprocessor: Preprocessor,
    classifier: Arc<dyn Classifier>,
    policy: DecisionPolicy,
    labels: Arc<LabelTable>,
}

impl InferencePipeline {
    pub fn new(
        decoder: ImageDecoder,
        preprocessor: Preprocessor,
        classifier: Arc<dyn Classifier>,
        policy: DecisionPolicy,
        labels: Arc<LabelTable>,
    ) -> Self {
        Self {
            decoder,
            preprocessor,
            classifier,
            policy,
            labels,
        }
    }

    pub fn from_config(
        config: &Config,
        classifier: Arc<dyn Classifier>,
        labels: Arc<LabelTable>,
    ) -> Self {
        Self::new(
            ImageDecoder::new(config.model.color_order),
            Preprocessor::new(config.model.input_size),
            classifier,
            DecisionPolicy::from(&config.decision),
            labels,
        )
    }

    pub fn run(&self, path: &Path, public_path: &str) -> Result<PredictionResponse, PipelineError> {
        let start = Instant::now();

        let image = self.decoder.decode_path(path)?;
        let tensor = self.preprocessor.transform(&image)?;
        let probabilities = self.classifier.infer(&tensor)?;
        check_output_len(&probabilities, self.labels.len())?;

        let decision = self.policy.decide(&probabilities);
        tracing::info!(
            "Prediction took {:.3}s: class_id={}, confidence={:.2}%, low_confidence={}",
            start.elapsed().as_secs_f64(),
            decision.predicted_index,
            decision.confidence_percent,
            decision.is_low_confidence
        );

        if decision.is_low_confidence {
            return Ok(PredictionResponse::low_confidence(public_path));
        }

        let label_info = self.labels.resolve(decision.predicted_index)?;
        Ok(PredictionResponse::reportable(
            &decision,
            label_info,
            public_path,
        ))
    }
}
