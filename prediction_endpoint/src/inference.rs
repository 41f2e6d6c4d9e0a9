use crate::config::InferenceConfig;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::instrument;
use uterine_api::{
    PredictionResult, ScoreClassifier, UploadRequest, IMAGE_FIELD, INFERTILITY_FIELD,
    MISCARRIAGES_FIELD,
};

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("inference failed: {0}")]
    Failed(String),
    #[error("inference collaborator returned an unusable response: {0}")]
    BadResponse(String),
    #[error("inference collaborator unavailable: {0}")]
    Unavailable(String),
}

/// The model behind the endpoint. Implementations own their own model state.
#[async_trait]
pub trait Inference: Send + Sync + 'static {
    async fn infer(&self, request: UploadRequest) -> Result<PredictionResult, InferenceError>;
}

#[derive(Debug, Deserialize)]
struct ScoreResponse {
    probability: f32,
}

/// Forwards uploads to an external model server that answers with a score.
#[derive(Clone)]
pub struct RemoteInference {
    client: reqwest::Client,
    url: String,
    classifier: ScoreClassifier,
}

impl RemoteInference {
    pub fn new(config: &InferenceConfig) -> Result<Self, InferenceError> {
        let client = reqwest::Client::builder()
            .timeout(config.get_timeout())
            .build()
            .map_err(|e| InferenceError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            url: config.url.clone(),
            classifier: ScoreClassifier::new(config.threshold),
        })
    }

    fn build_form(request: UploadRequest) -> Result<reqwest::multipart::Form, InferenceError> {
        let UploadRequest { image, covariates } = request;
        let part = reqwest::multipart::Part::bytes(image.bytes.to_vec())
            .file_name(image.file_name)
            .mime_str(&image.content_type)
            .map_err(|e| InferenceError::Failed(format!("invalid content type: {}", e)))?;

        Ok(reqwest::multipart::Form::new()
            .part(IMAGE_FIELD, part)
            .text(INFERTILITY_FIELD, covariates.infertility_value())
            .text(MISCARRIAGES_FIELD, covariates.miscarriages_value()))
    }
}

#[async_trait]
impl Inference for RemoteInference {
    #[instrument(skip(self, request), fields(url = %self.url))]
    async fn infer(&self, request: UploadRequest) -> Result<PredictionResult, InferenceError> {
        let form = Self::build_form(request)?;

        let response = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| InferenceError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(InferenceError::Failed(format!("HTTP {}: {}", status, text)));
        }

        let score: ScoreResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::BadResponse(e.to_string()))?;

        if !(0.0..=1.0).contains(&score.probability) {
            return Err(InferenceError::BadResponse(format!(
                "probability {} outside [0, 1]",
                score.probability
            )));
        }

        tracing::debug!("Model score {:.3}", score.probability);
        Ok(self.classifier.classify(score.probability))
    }
}

/// Round-robin over collaborator instances, one call at a time per instance.
pub struct InferencePool<I: Inference> {
    instances: Vec<Mutex<I>>,
    counter: AtomicUsize,
}

impl<I: Inference> InferencePool<I> {
    pub fn new(instances: Vec<I>) -> Result<Self, InferenceError> {
        if instances.is_empty() {
            return Err(InferenceError::Unavailable(
                "inference pool needs at least one instance".into(),
            ));
        }

        tracing::info!("Created {} inference instances", instances.len());

        Ok(Self {
            instances: instances.into_iter().map(Mutex::new).collect(),
            counter: AtomicUsize::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

#[async_trait]
impl<I: Inference> Inference for InferencePool<I> {
    async fn infer(&self, request: UploadRequest) -> Result<PredictionResult, InferenceError> {
        let index = self.counter.fetch_add(1, Ordering::SeqCst) % self.instances.len();
        let instance = self.instances[index].lock().await;

        tracing::debug!("Handling request with inference instance {}", index);
        instance.infer(request).await
    }
}
