use crate::{decision::Decision, labels::LabelInfo};
use serde::Serialize;

pub const NO_RISK_MESSAGE: &str = "You do not appear to carry a significant skin cancer risk.";

/// Success payload of the prediction endpoint. Field names are part of the public API.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PredictionResponse {
    LowConfidence {
        message: String,
        file_path: String,
    },
    Reportable {
        label: String,
        confidence: String,
        info: String,
        file_path: String,
    },
}

impl PredictionResponse {
    pub fn low_confidence(file_path: &str) -> Self {
        Self::LowConfidence {
            message: NO_RISK_MESSAGE.to_string(),
            file_path: file_path.to_string(),
        }
    }

    pub fn reportable(decision: &Decision, label_info: LabelInfo, file_path: &str) -> Self {
        Self::Reportable {
            label: label_info.label,
            confidence: format_confidence(decision.confidence_percent),
            info: label_info.info,
            file_path: file_path.to_string(),
        }
    }

    pub fn is_low_confidence(&self) -> bool {
        matches!(self, Self::LowConfidence { .. })
    }
}

fn format_confidence(confidence_percent: f32) -> String {
    format!("{:.2}%", confidence_percent)
}
