use thiserror::Error;
use uterine_api::CovariateError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("server error ({}): {message}", describe_status(.status))]
    Server {
        status: Option<u16>,
        message: String,
    },
}

fn describe_status(status: &Option<u16>) -> String {
    status
        .map(|s| s.to_string())
        .unwrap_or_else(|| "no status".into())
}

impl ClientError {
    /// Text shown in the form. Validation problems are specific, the rest generic.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Validation(message) => message.clone(),
            ClientError::Transport(_) => {
                "Error connecting to AI Server. Check your connection and try again.".into()
            }
            ClientError::Server { .. } => {
                "The AI Server could not complete the diagnosis. Please try again.".into()
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self, ClientError::Validation(_))
    }
}

impl From<CovariateError> for ClientError {
    fn from(err: CovariateError) -> Self {
        ClientError::Validation(err.to_string())
    }
}
