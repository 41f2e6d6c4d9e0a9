mod health;
mod metrics;
mod predict;

use crate::server::SharedState;
use axum::{
    routing::{get, post},
    Router,
};
use uterine_api::PREDICT_ROUTE;

pub use predict::PredictError;

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route(PREDICT_ROUTE, post(predict::predict))
        .route("/health", get(health::healthcheck))
        .route("/metrics", get(metrics::metrics_handler))
}
