use settlement_engine::{EscalationError, SqliteDatabaseError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
}

impl From<SqliteDatabaseError> for ServerError {
    fn from(e: SqliteDatabaseError) -> Self {
        Self::InitializeError(format!("Database error: {e}"))
    }
}

impl From<EscalationError> for ServerError {
    fn from(e: EscalationError) -> Self {
        Self::BackendError(e.to_string())
    }
}
