//! Error taxonomy shared by the pipeline and its collaborators.

use thiserror::Error;

use crate::auth::AuthError;

/// Failures raised by the core. Provider-level HTTP failures are not errors
/// here: they are rendered into an [`crate::render::AiCallResult`] instead.
#[derive(Error, Debug)]
pub enum Error {
    /// Rejected before any network call (empty text, missing file, ...).
    #[error("{0}")]
    InputValidation(String),

    /// Transport failures on every attempt.
    #[error("max retries exceeded after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("could not save report: {0}")]
    Persistence(String),

    #[error("text recognition failed: {0}")]
    Ocr(String),

    #[error("upload failed: {0}")]
    Storage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn invalid(message: impl Into<String>) -> Self {
        Error::InputValidation(message.into())
    }

    pub fn is_input_validation(&self) -> bool {
        matches!(self, Error::InputValidation(_))
    }
}
