use crate::{
    config::{Config, CorsConfig},
    inference::Inference,
    routes::api_routes,
    telemetry::Metrics,
};
use axum::{
    extract::DefaultBodyLimit,
    http::{Method, StatusCode},
    response::{IntoResponse, Json, Response},
    Router,
};
use axum_otel_metrics::HttpMetricsLayerBuilder;
use std::{any::Any, net::SocketAddr, sync::Arc, time::Duration};
use tokio::{net::TcpListener, sync::broadcast::Receiver, task::JoinHandle};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, Any as AnyOrigin, CorsLayer},
    trace::TraceLayer,
};
use uterine_api::ErrorBody;

#[derive(Clone)]
pub struct SharedState {
    pub inference: Arc<dyn Inference>,
    pub inference_timeout: Duration,
    pub metrics: Arc<Metrics>,
}

impl SharedState {
    pub fn new(
        inference: Arc<dyn Inference>,
        inference_timeout: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            inference,
            inference_timeout,
            metrics,
        }
    }
}

pub fn cors_layer(config: &CorsConfig) -> Result<CorsLayer, String> {
    let allow_origin = if config.allows_any_origin() {
        AllowOrigin::from(AnyOrigin)
    } else {
        AllowOrigin::list(config.origin_headers()?)
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(AnyOrigin)
        .max_age(Duration::from_secs(3600)))
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let details = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!("Request handler panicked: {}", details);

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody::new("internal server error")),
    )
        .into_response()
}

/// Routes plus the per-request layers: body limit, panic isolation, CORS, tracing.
pub fn build_router(state: SharedState, config: &Config) -> anyhow::Result<Router> {
    let cors = cors_layer(&config.cors).map_err(anyhow::Error::msg)?;

    Ok(api_routes()
        .with_state(state)
        .layer(DefaultBodyLimit::max(config.server.max_body_bytes))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(cors)
        .layer(TraceLayer::new_for_http()))
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    /// The HTTP metrics layer reports to the global meter provider; install
    /// `metrics` globally first to export it alongside the endpoint's own series.
    pub async fn new(
        inference: Arc<dyn Inference>,
        metrics: Arc<Metrics>,
        config: &Config,
    ) -> anyhow::Result<Self> {
        let addr = config.server.get_address();

        let metrics_layer = HttpMetricsLayerBuilder::new().build();

        let app_state = SharedState::new(inference, config.inference.get_timeout(), metrics);

        let router = build_router(app_state, config)?.layer(metrics_layer);

        let listener = TcpListener::bind(addr).await?;

        Ok(Self { router, listener })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(
        self,
        shutdown_rx: Receiver<()>,
    ) -> anyhow::Result<JoinHandle<anyhow::Result<()>>> {
        tracing::info!("Starting app on {}", self.listener.local_addr()?);

        let listener = self.listener;
        let router = self.router;
        let server_handle = tokio::spawn({
            let mut shutdown_rx = shutdown_rx;
            async move {
                axum::serve(listener, router)
                    .with_graceful_shutdown(async move {
                        shutdown_rx.recv().await.ok();
                    })
                    .await?;
                tracing::info!("HTTP server stopped");
                Ok(())
            }
        });

        Ok(server_handle)
    }
}
