use crate::form::{FormState, Outcome};
use std::fmt;

pub const SUBMIT_CAPTION: &str = "Run AI Diagnosis";
pub const BUSY_CAPTION: &str = "Analyzing...";
pub const DISCLAIMER: &str = "Disclaimer: This tool is for educational/research purposes only and should not replace professional medical advice.";

/// Visual style of a result panel, keyed on the predicted class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Treatment {
    Flagged,
    Normal,
}

impl Treatment {
    pub fn for_class(predicted_class: i64) -> Self {
        if predicted_class == 1 {
            Treatment::Flagged
        } else {
            Treatment::Normal
        }
    }

    pub fn css_class(&self) -> &'static str {
        match self {
            Treatment::Flagged => "flagged",
            Treatment::Normal => "normal",
        }
    }

    pub fn background(&self) -> &'static str {
        match self {
            Treatment::Flagged => "#f8d7da",
            Treatment::Normal => "#d4edda",
        }
    }

    pub fn recommendation(&self) -> &'static str {
        match self {
            Treatment::Flagged => "Recommendation: This result suggests an abnormality. Please refer to clinical findings and radiologist review.",
            Treatment::Normal => "Recommendation: No immediate abnormality detected by the AI. Periodic follow-up is advised.",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum View {
    Idle,
    Busy,
    Result {
        label: String,
        treatment: Treatment,
        confidence: Option<f32>,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub view: View,
    pub submit_enabled: bool,
    pub submit_caption: &'static str,
    pub preview_url: Option<String>,
}

/// A rejected selection outranks the busy indicator and any settled outcome.
pub fn render(state: &FormState) -> Rendered {
    let view = if let Some(err) = state.selection_error() {
        View::Error {
            message: err.user_message(),
        }
    } else if state.is_in_flight() {
        View::Busy
    } else {
        match state.outcome() {
            None => View::Idle,
            Some(Outcome::Result(result)) => View::Result {
                label: result.label.clone(),
                treatment: Treatment::for_class(result.predicted_class),
                confidence: result.confidence,
            },
            Some(Outcome::Error(err)) => View::Error {
                message: err.user_message(),
            },
        }
    };

    Rendered {
        view,
        submit_enabled: state.can_submit(),
        submit_caption: if state.is_in_flight() {
            BUSY_CAPTION
        } else {
            SUBMIT_CAPTION
        },
        preview_url: state.preview_url().map(str::to_owned),
    }
}

impl fmt::Display for Rendered {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.view {
            View::Idle => write!(f, "[{}]", self.submit_caption),
            View::Busy => write!(f, "{}", BUSY_CAPTION),
            View::Result {
                label,
                treatment,
                confidence,
            } => {
                write!(f, "Result: {} ({})", label, treatment.css_class())?;
                if let Some(confidence) = confidence {
                    write!(f, ", confidence {:.2}%", confidence * 100.0)?;
                }
                write!(f, "\n{}\n{}", treatment.recommendation(), DISCLAIMER)
            }
            View::Error { message } => write!(f, "Error: {}", message),
        }
    }
}
