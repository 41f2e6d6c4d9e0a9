use crate::{inference::InferenceError, server::SharedState};
use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use std::time::Instant;
use thiserror::Error;
use tracing::instrument;
use uterine_api::{
    CovariateError, Covariates, ErrorBody, ImageUpload, PredictionResult, UploadRequest,
    IMAGE_FIELD, INFERTILITY_FIELD, MISCARRIAGES_FIELD,
};

#[derive(Error, Debug)]
pub enum PredictError {
    #[error("invalid multipart upload: {message}")]
    Multipart { status: StatusCode, message: String },
    #[error("missing `image` upload")]
    MissingImage,
    #[error(transparent)]
    Covariate(#[from] CovariateError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error("inference timed out after {0} ms")]
    Timeout(u128),
}

impl PredictError {
    pub fn status(&self) -> StatusCode {
        match self {
            PredictError::Multipart { status, .. } => *status,
            PredictError::MissingImage | PredictError::Covariate(_) => StatusCode::BAD_REQUEST,
            PredictError::Inference(InferenceError::BadResponse(_)) => StatusCode::BAD_GATEWAY,
            PredictError::Inference(_) => StatusCode::INTERNAL_SERVER_ERROR,
            PredictError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    fn outcome(&self) -> &'static str {
        if self.status().is_client_error() {
            "rejected"
        } else {
            "failed"
        }
    }
}

impl From<MultipartRejection> for PredictError {
    fn from(rejection: MultipartRejection) -> Self {
        PredictError::Multipart {
            status: StatusCode::BAD_REQUEST,
            message: rejection.body_text(),
        }
    }
}

impl From<axum::extract::multipart::MultipartError> for PredictError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        let status = err.status();
        PredictError::Multipart {
            status: if status.is_client_error() {
                status
            } else {
                StatusCode::BAD_REQUEST
            },
            message: err.body_text(),
        }
    }
}

impl IntoResponse for PredictError {
    fn into_response(self) -> Response {
        (self.status(), Json(ErrorBody::new(self.to_string()))).into_response()
    }
}

#[instrument(skip(state, multipart))]
pub async fn predict(
    State(state): State<SharedState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictionResult>, PredictError> {
    let result = run_prediction(&state, multipart).await;

    match &result {
        Ok(prediction) => {
            tracing::info!(
                prediction = prediction.predicted_class,
                label = %prediction.label,
                "Prediction served"
            );
            state.metrics.record_request("success");
        }
        Err(err) if err.status().is_client_error() => {
            tracing::warn!("Rejected prediction request: {}", err);
            state.metrics.record_request(err.outcome());
        }
        Err(err) => {
            tracing::error!("Prediction failed: {:?}", err);
            state.metrics.record_request(err.outcome());
        }
    }

    result.map(Json)
}

async fn run_prediction(
    state: &SharedState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<PredictionResult, PredictError> {
    let request = read_upload(multipart?).await?;
    tracing::debug!(
        bytes = request.image.len(),
        content_type = %request.image.content_type,
        "Upload received"
    );

    let started = Instant::now();
    let outcome =
        tokio::time::timeout(state.inference_timeout, state.inference.infer(request)).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(Ok(prediction)) => {
            state.metrics.record_inference_duration(elapsed_ms, "success");
            Ok(prediction)
        }
        Ok(Err(err)) => {
            state.metrics.record_inference_duration(elapsed_ms, "error");
            Err(err.into())
        }
        Err(_) => {
            state.metrics.record_inference_duration(elapsed_ms, "timeout");
            Err(PredictError::Timeout(state.inference_timeout.as_millis()))
        }
    }
}

async fn read_upload(mut multipart: Multipart) -> Result<UploadRequest, PredictError> {
    let mut image = None;
    let mut infertility = None;
    let mut miscarriages = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some(IMAGE_FIELD) => {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let file_name = field.file_name().unwrap_or(IMAGE_FIELD).to_string();
                let bytes = field.bytes().await?;
                if !bytes.is_empty() {
                    image = Some(ImageUpload::new(bytes, content_type, file_name));
                }
            }
            Some(INFERTILITY_FIELD) => infertility = Some(field.text().await?),
            Some(MISCARRIAGES_FIELD) => miscarriages = Some(field.text().await?),
            other => tracing::debug!("Ignoring multipart field {:?}", other),
        }
    }

    let image = image.ok_or(PredictError::MissingImage)?;
    let covariates = Covariates::from_form(infertility.as_deref(), miscarriages.as_deref())?;

    Ok(UploadRequest::new(image, covariates))
}

#[cfg(test)]
mod tests {
    use crate::config::{Config, CorsConfig, InferenceConfig, LogLevel, ServerConfig};
    use crate::inference::{Inference, InferenceError};
    use crate::server::{build_router, SharedState};
    use crate::telemetry::Metrics;
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
        Router,
    };
    use http_body_util::BodyExt;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    };
    use std::time::Duration;
    use tower::ServiceExt;
    use uterine_api::{Covariates, PredictionResult, UploadRequest};

    const BOUNDARY: &str = "diagnosis-test-boundary";
    const ORIGIN: &str = "http://localhost:3000";

    #[derive(Clone)]
    enum Behaviour {
        Respond(PredictionResult),
        Fail,
        Garbage,
        Hang,
        Panic,
    }

    struct MockInference {
        behaviour: Behaviour,
        calls: Arc<AtomicUsize>,
        last_request: Arc<Mutex<Option<UploadRequest>>>,
    }

    #[async_trait]
    impl Inference for MockInference {
        async fn infer(&self, request: UploadRequest) -> Result<PredictionResult, InferenceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(request);

            match &self.behaviour {
                Behaviour::Respond(result) => Ok(result.clone()),
                Behaviour::Fail => Err(InferenceError::Failed("model crashed".into())),
                Behaviour::Garbage => Err(InferenceError::BadResponse("not json".into())),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Err(InferenceError::Failed("unreachable".into()))
                }
                Behaviour::Panic => panic!("model exploded"),
            }
        }
    }

    struct Harness {
        router: Router,
        calls: Arc<AtomicUsize>,
        last_request: Arc<Mutex<Option<UploadRequest>>>,
    }

    fn test_config() -> Config {
        Config {
            server: ServerConfig {
                host: "127.0.0.1".into(),
                port: 0,
                max_body_bytes: 1024 * 1024,
            },
            log_level: LogLevel::Debug,
            cors: CorsConfig::default(),
            inference: InferenceConfig {
                url: "http://127.0.0.1:9/score".into(),
                timeout_ms: 50,
                threshold: 0.5,
                instances: 1,
            },
        }
    }

    fn harness(behaviour: Behaviour) -> Harness {
        let calls = Arc::new(AtomicUsize::new(0));
        let last_request = Arc::new(Mutex::new(None));
        let inference = Arc::new(MockInference {
            behaviour,
            calls: calls.clone(),
            last_request: last_request.clone(),
        });

        let config = test_config();
        let state = SharedState::new(
            inference,
            config.inference.get_timeout(),
            Arc::new(Metrics::new().unwrap()),
        );
        let router = build_router(state, &config).unwrap();

        Harness {
            router,
            calls,
            last_request,
        }
    }

    enum Part<'a> {
        File(&'a str, &'a str, &'a [u8]),
        Text(&'a str, &'a str),
    }

    fn multipart_request(parts: &[Part]) -> Request<Body> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            match part {
                Part::File(name, content_type, bytes) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"; filename=\"scan.png\"\r\nContent-Type: {}\r\n\r\n",
                            name, content_type
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(bytes);
                }
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"\r\n\r\n{}",
                            name, value
                        )
                        .as_bytes(),
                    );
                }
            }
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        Request::builder()
            .method(Method::POST)
            .uri("/api/predict")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .header(header::ORIGIN, ORIGIN)
            .body(Body::from(body))
            .unwrap()
    }

    fn full_upload() -> Request<Body> {
        multipart_request(&[
            Part::File("image", "image/png", b"\x89PNG\r\n\x1a\nfake"),
            Part::Text("inf", "1"),
            Part::Text("misc", "2"),
        ])
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn returns_prediction_from_collaborator() {
        let h = harness(Behaviour::Respond(PredictionResult::new(1, "Abnormal")));

        let response = h.router.clone().oneshot(full_upload()).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            ORIGIN
        );
        assert_eq!(
            json_body(response).await,
            serde_json::json!({ "prediction": 1, "label": "Abnormal" })
        );

        assert_eq!(h.calls.load(Ordering::SeqCst), 1);
        let seen = h.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(seen.covariates, Covariates::new(true, 2));
        assert_eq!(seen.image.content_type, "image/png");
        assert_eq!(seen.image.file_name, "scan.png");
    }

    #[tokio::test]
    async fn missing_image_is_rejected_without_inference() {
        let h = harness(Behaviour::Respond(PredictionResult::new(0, "Normal")));
        let request = multipart_request(&[Part::Text("inf", "0"), Part::Text("misc", "0")]);

        let response = h.router.clone().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().contains("image"));
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_image_part_counts_as_missing() {
        let h = harness(Behaviour::Respond(PredictionResult::new(0, "Normal")));
        let request = multipart_request(&[
            Part::File("image", "image/png", b""),
            Part::Text("inf", "0"),
            Part::Text("misc", "0"),
        ]);

        let response = h.router.clone().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn malformed_covariate_is_rejected() {
        let h = harness(Behaviour::Respond(PredictionResult::new(0, "Normal")));
        let request = multipart_request(&[
            Part::File("image", "image/png", b"png"),
            Part::Text("inf", "0"),
            Part::Text("misc", "-4"),
        ]);

        let response = h.router.clone().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().contains("misc"));
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn non_multipart_body_is_a_client_error() {
        let h = harness(Behaviour::Respond(PredictionResult::new(0, "Normal")));
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/predict")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"inf":0}"#))
            .unwrap();

        let response = h.router.clone().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["error"].is_string());
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn collaborator_failure_is_a_server_error() {
        let h = harness(Behaviour::Fail);

        let response = h.router.clone().oneshot(full_upload()).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().contains("model crashed"));
    }

    #[tokio::test]
    async fn unusable_collaborator_response_is_a_bad_gateway() {
        let h = harness(Behaviour::Garbage);

        let response = h.router.clone().oneshot(full_upload()).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn hanging_collaborator_times_out() {
        let h = harness(Behaviour::Hang);

        let response = h.router.clone().oneshot(full_upload()).await.unwrap();

        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn panicking_collaborator_does_not_take_down_the_router() {
        let h = harness(Behaviour::Panic);

        let response = h.router.clone().oneshot(full_upload()).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            json_body(response).await,
            serde_json::json!({ "error": "internal server error" })
        );

        let response = h
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(h.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn preflight_advertises_cors_allowance() {
        let h = harness(Behaviour::Respond(PredictionResult::new(0, "Normal")));
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/predict")
            .header(header::ORIGIN, ORIGIN)
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();

        let response = h.router.clone().oneshot(request).await.unwrap();

        assert!(response.status().is_success());
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            ORIGIN
        );
        let methods = response.headers()[header::ACCESS_CONTROL_ALLOW_METHODS]
            .to_str()
            .unwrap()
            .to_string();
        assert!(methods.contains("POST"));
        assert_eq!(h.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_origin_gets_no_cors_allowance() {
        let h = harness(Behaviour::Respond(PredictionResult::new(0, "Normal")));
        let mut request = full_upload();
        request
            .headers_mut()
            .insert(header::ORIGIN, "http://evil.example".parse().unwrap());

        let response = h.router.clone().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none());
    }

    #[tokio::test]
    async fn exposes_health_and_metrics() {
        let h = harness(Behaviour::Respond(PredictionResult::new(0, "Normal")));

        let health = h
            .router
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);
        let body = json_body(health).await;
        assert_eq!(body["status"], "Available");
        assert_eq!(body["inference_timeout_ms"], 50);

        let metrics = h
            .router
            .clone()
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(metrics.status(), StatusCode::OK);
    }
}
