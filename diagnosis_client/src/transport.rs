use crate::error::ClientError;
use async_trait::async_trait;
use reqwest::{
    multipart::{Form, Part},
    StatusCode,
};
use std::time::Duration;
use tracing::instrument;
use uterine_api::{
    ErrorBody, PredictionResult, UploadRequest, IMAGE_FIELD, INFERTILITY_FIELD,
    MISCARRIAGES_FIELD,
};

/// Carries one upload to the prediction endpoint.
#[async_trait]
pub trait PredictionTransport: Send + Sync {
    async fn send(&self, request: UploadRequest) -> Result<PredictionResult, ClientError>;
}

/// Multipart upload over HTTP.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn build_form(request: UploadRequest) -> Result<Form, ClientError> {
        let UploadRequest { image, covariates } = request;
        let part = Part::bytes(image.bytes.to_vec())
            .file_name(image.file_name)
            .mime_str(&image.content_type)
            .map_err(|e| ClientError::Validation(format!("invalid content type: {}", e)))?;

        Ok(Form::new()
            .part(IMAGE_FIELD, part)
            .text(INFERTILITY_FIELD, covariates.infertility_value())
            .text(MISCARRIAGES_FIELD, covariates.miscarriages_value()))
    }
}

fn error_message(status: StatusCode, body: &[u8]) -> String {
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(body) => body.error,
        Err(_) if body.is_empty() => status.to_string(),
        Err(_) => String::from_utf8_lossy(body).into_owned(),
    }
}

/// Maps a finished HTTP exchange onto the client's error taxonomy.
fn interpret_response(status: StatusCode, body: &[u8]) -> Result<PredictionResult, ClientError> {
    if status.is_client_error() {
        return Err(ClientError::Validation(error_message(status, body)));
    }

    if !status.is_success() {
        return Err(ClientError::Server {
            status: Some(status.as_u16()),
            message: error_message(status, body),
        });
    }

    serde_json::from_slice::<PredictionResult>(body).map_err(|e| ClientError::Server {
        status: Some(status.as_u16()),
        message: format!("malformed prediction response: {}", e),
    })
}

#[async_trait]
impl PredictionTransport for HttpTransport {
    #[instrument(skip(self, request), fields(endpoint = %self.endpoint))]
    async fn send(&self, request: UploadRequest) -> Result<PredictionResult, ClientError> {
        let form = Self::build_form(request)?;

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        tracing::debug!("Endpoint answered {} ({} bytes)", status, body.len());
        interpret_response(status, &body)
    }
}
