//! Form controller for submitting an ultrasound scan plus clinical covariates
//! to the prediction endpoint and rendering the outcome.

mod error;
mod form;
mod image_file;
mod preview;
mod render;
mod transport;

pub use error::ClientError;
pub use form::{Covariate, FormController, FormState, Outcome, Submission};
pub use image_file::{load_image, sniff_content_type};
pub use preview::{PreviewHandle, PreviewRegistry};
pub use render::{render, Rendered, Treatment, View};
pub use transport::{HttpTransport, PredictionTransport};
