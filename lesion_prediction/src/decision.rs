use crate::classifier::ProbabilityVector;
use crate::config::DecisionConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub predicted_index: usize,
    pub confidence_percent: f32,
    pub is_low_confidence: bool,
}

/// Turns a class distribution into a reportable or "no risk" decision.
///
/// The threshold is an operational cutoff in percent, not a calibrated
/// probability: anything strictly below it is treated as low confidence.
#[derive(Debug, Clone, Copy)]
pub struct DecisionPolicy {
    low_confidence_threshold: f32,
}

impl DecisionPolicy {
    pub fn new(low_confidence_threshold: f32) -> Self {
        Self {
            low_confidence_threshold,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.low_confidence_threshold
    }

    pub fn is_low_confidence(&self, confidence_percent: f32) -> bool {
        confidence_percent < self.low_confidence_threshold
    }

    pub fn decide(&self, probabilities: &ProbabilityVector) -> Decision {
        let (predicted_index, probability) = argmax(probabilities.as_slice());
        let confidence_percent = probability * 100.0;

        Decision {
            predicted_index,
            confidence_percent,
            is_low_confidence: self.is_low_confidence(confidence_percent),
        }
    }
}

impl From<&DecisionConfig> for DecisionPolicy {
    fn from(config: &DecisionConfig) -> Self {
        Self::new(config.low_confidence_threshold)
    }
}

// Strict comparison keeps the first of equal maxima.
fn argmax(values: &[f32]) -> (usize, f32) {
    values
        .iter()
        .copied()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (index, value)| {
            if value > best.1 {
                (index, value)
            } else {
                best
            }
        })
}
