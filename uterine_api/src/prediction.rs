use serde::{Deserialize, Serialize};

pub const NORMAL_LABEL: &str = "Normal";
pub const ABNORMAL_LABEL: &str = "Abnormal";

/// Outcome of one inference call as sent back to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    #[serde(rename = "prediction")]
    pub predicted_class: i64,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl PredictionResult {
    pub fn new(predicted_class: i64, label: impl Into<String>) -> Self {
        Self {
            predicted_class,
            label: label.into(),
            confidence: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn is_abnormal(&self) -> bool {
        self.predicted_class == 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// Maps a sigmoid score onto the binary normal / abnormal classes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreClassifier {
    threshold: f32,
}

impl Default for ScoreClassifier {
    fn default() -> Self {
        Self { threshold: 0.5 }
    }
}

impl ScoreClassifier {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn classify(&self, probability: f32) -> PredictionResult {
        if probability > self.threshold {
            PredictionResult::new(1, ABNORMAL_LABEL).with_confidence(probability)
        } else {
            PredictionResult::new(0, NORMAL_LABEL).with_confidence(1.0 - probability)
        }
    }
}
