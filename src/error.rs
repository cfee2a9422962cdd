//! Error kinds shared across the graph store, calculators, pipeline and
//! repository. Calculators return `InvalidInput` synchronously;
//! everything that crosses an I/O boundary can additionally surface
//! `Transient` or `Conflict`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("fatal error: {0}")]
    Fatal(String),
}

impl EngineError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Whether a caller at the port boundary should retry this error
    /// (exponential backoff, up to 3 attempts).
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Transient(_))
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::DatabaseBusy
                    || err.code == rusqlite::ErrorCode::DatabaseLocked =>
            {
                EngineError::Transient(e.to_string())
            }
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                EngineError::Conflict(e.to_string())
            }
            other => EngineError::Fatal(other.to_string()),
        }
    }
}

/// Maps an [`EngineError`] to the status-code-and-message shape every
/// handler in this crate returns.
pub fn status_code(err: &EngineError) -> axum::http::StatusCode {
    use axum::http::StatusCode;
    match err {
        EngineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::InsufficientData(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::Conflict(_) => StatusCode::CONFLICT,
        EngineError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
        EngineError::Fatal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
