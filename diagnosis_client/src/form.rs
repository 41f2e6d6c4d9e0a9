use crate::{
    error::ClientError,
    preview::{PreviewHandle, PreviewRegistry},
    render::{render, Rendered},
    transport::PredictionTransport,
};
use parking_lot::Mutex;
use tracing::instrument;
use uterine_api::{CovariateField, Covariates, ImageUpload, PredictionResult, UploadRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Covariate {
    Infertility(bool),
    PriorMiscarriages(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Result(PredictionResult),
    Error(ClientError),
}

/// How a call to [`FormController::submit`] ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// No image selected; nothing was sent.
    NotReady,
    /// Another request is still in flight; nothing was sent.
    Busy,
    Completed(PredictionResult),
    Failed(ClientError),
    /// The form moved on (new image or teardown) before the response arrived.
    Abandoned,
}

#[derive(Debug, Default)]
pub struct FormState {
    image: Option<ImageUpload>,
    preview: Option<PreviewHandle>,
    covariates: Covariates,
    pending: Option<u64>,
    last_request_id: u64,
    outcome: Option<Outcome>,
    selection_error: Option<ClientError>,
}

impl FormState {
    pub fn image(&self) -> Option<&ImageUpload> {
        self.image.as_ref()
    }

    pub fn preview_url(&self) -> Option<&str> {
        self.preview.as_ref().map(PreviewHandle::url)
    }

    pub fn covariates(&self) -> Covariates {
        self.covariates
    }

    pub fn is_in_flight(&self) -> bool {
        self.pending.is_some()
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    pub fn result(&self) -> Option<&PredictionResult> {
        match &self.outcome {
            Some(Outcome::Result(result)) => Some(result),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ClientError> {
        match &self.outcome {
            Some(Outcome::Error(err)) => Some(err),
            _ => None,
        }
    }

    /// Last rejected selection. Request settlement never clears it.
    pub fn selection_error(&self) -> Option<&ClientError> {
        self.selection_error.as_ref()
    }

    pub fn can_submit(&self) -> bool {
        self.image.is_some() && self.pending.is_none()
    }

    /// Drops any in-flight request id so its response is ignored on arrival.
    fn abandon_pending(&mut self) {
        if let Some(id) = self.pending.take() {
            tracing::debug!("Abandoning in-flight request {}", id);
        }
    }
}

/// Owns the form state; all mutation goes through the named transitions below.
pub struct FormController<T: PredictionTransport> {
    transport: T,
    previews: PreviewRegistry,
    state: Mutex<FormState>,
}

impl<T: PredictionTransport> FormController<T> {
    pub fn new(transport: T) -> Self {
        Self::with_previews(transport, PreviewRegistry::new())
    }

    pub fn with_previews(transport: T, previews: PreviewRegistry) -> Self {
        Self {
            transport,
            previews,
            state: Mutex::new(FormState::default()),
        }
    }

    pub fn previews(&self) -> &PreviewRegistry {
        &self.previews
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn select_image(&self, image: ImageUpload) -> Result<(), ClientError> {
        if let Err(err) = validate_image(&image) {
            tracing::warn!("Rejected selection {}: {}", image.file_name, err);
            self.state.lock().selection_error = Some(err.clone());
            return Err(err);
        }

        let preview = self.previews.create(&image);
        let superseded = {
            let mut state = self.state.lock();
            state.abandon_pending();
            state.outcome = None;
            state.selection_error = None;
            state.image = Some(image);
            state.preview.replace(preview)
        };
        drop(superseded);

        Ok(())
    }

    pub fn set_covariate(&self, covariate: Covariate) {
        let mut state = self.state.lock();
        match covariate {
            Covariate::Infertility(flag) => state.covariates.infertility = flag,
            Covariate::PriorMiscarriages(count) => state.covariates.prior_miscarriages = count,
        }
    }

    /// Parses raw text from an input widget. Malformed text leaves the state untouched.
    pub fn set_covariate_input(
        &self,
        field: CovariateField,
        raw: &str,
    ) -> Result<(), ClientError> {
        let covariate = match field {
            CovariateField::Infertility => {
                Covariate::Infertility(Covariates::parse_infertility(raw)?)
            }
            CovariateField::PriorMiscarriages => {
                Covariate::PriorMiscarriages(Covariates::parse_miscarriages(raw)?)
            }
        };
        self.set_covariate(covariate);
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn submit(&self) -> Submission {
        let (request_id, request) = {
            let mut state = self.state.lock();
            let Some(image) = state.image.clone() else {
                return Submission::NotReady;
            };
            if state.pending.is_some() {
                return Submission::Busy;
            }

            state.last_request_id += 1;
            let request_id = state.last_request_id;
            state.pending = Some(request_id);
            state.outcome = None;
            state.selection_error = None;

            (request_id, UploadRequest::new(image, state.covariates))
        };

        tracing::debug!("Submitting request {}", request_id);
        let response = self.transport.send(request).await;

        self.settle(request_id, response)
    }

    fn settle(
        &self,
        request_id: u64,
        response: Result<PredictionResult, ClientError>,
    ) -> Submission {
        let mut state = self.state.lock();
        if state.pending != Some(request_id) {
            tracing::debug!("Discarding response for stale request {}", request_id);
            return Submission::Abandoned;
        }
        state.pending = None;

        match response {
            Ok(result) => {
                tracing::info!(
                    "Request {} completed: {} ({})",
                    request_id,
                    result.label,
                    result.predicted_class
                );
                state.outcome = Some(Outcome::Result(result.clone()));
                Submission::Completed(result)
            }
            Err(err) => {
                tracing::warn!("Request {} failed: {}", request_id, err);
                state.outcome = Some(Outcome::Error(err.clone()));
                Submission::Failed(err)
            }
        }
    }

    /// Teardown: abandons any in-flight request and releases the preview.
    pub fn close(&self) {
        let preview = {
            let mut state = self.state.lock();
            state.abandon_pending();
            state.preview.take()
        };
        drop(preview);
    }

    pub fn render(&self) -> Rendered {
        render(&self.state.lock())
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&FormState) -> R) -> R {
        f(&self.state.lock())
    }
}

fn validate_image(image: &ImageUpload) -> Result<(), ClientError> {
    if !image.is_image() {
        return Err(ClientError::Validation(format!(
            "{} is not an image ({})",
            image.file_name, image.content_type
        )));
    }
    if image.is_empty() {
        return Err(ClientError::Validation(format!(
            "{} is empty",
            image.file_name
        )));
    }
    Ok(())
}
