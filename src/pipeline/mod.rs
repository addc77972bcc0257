// Pipeline module
// Orchestrates decode -> extract -> classify and translates failures for the caller

pub mod error;
pub mod orchestrator;
pub mod timeout;

pub use error::{ClassifyFailure, ErrorKind, PipelineError};
pub use orchestrator::{render_outcome, Pipeline};
pub use timeout::{classify_file_with_timeout, predict_file_with_timeout};
