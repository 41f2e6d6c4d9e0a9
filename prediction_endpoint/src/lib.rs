mod routes;
mod telemetry;

pub mod app;
pub mod config;
pub mod inference;
pub mod server;

pub use app::start_app;
pub use inference::{Inference, InferenceError, InferencePool, RemoteInference};
pub use routes::PredictError;
pub use telemetry::Metrics;
