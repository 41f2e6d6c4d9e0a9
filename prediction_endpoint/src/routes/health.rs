use crate::server::SharedState;
use axum::{extract::State, Json};
use serde::Serialize;

#[derive(Serialize)]
pub struct Health {
    status: &'static str,
    version: &'static str,
    inference_timeout_ms: u128,
}

/// Liveness only; the inference collaborator is not probed.
pub async fn healthcheck(State(state): State<SharedState>) -> Json<Health> {
    Json(Health {
        status: "Available",
        version: env!("CARGO_PKG_VERSION"),
        inference_timeout_ms: state.inference_timeout.as_millis(),
    })
}
