//! Wire contract shared by the prediction endpoint and the diagnosis client.

mod covariates;
mod prediction;
mod upload;

pub use covariates::{CovariateError, CovariateField, Covariates};
pub use prediction::{ErrorBody, PredictionResult, ScoreClassifier, ABNORMAL_LABEL, NORMAL_LABEL};
pub use upload::{ImageUpload, UploadRequest};

pub const PREDICT_ROUTE: &str = "/api/predict";

pub const IMAGE_FIELD: &str = "image";
pub const INFERTILITY_FIELD: &str = "inf";
pub const MISCARRIAGES_FIELD: &str = "misc";
