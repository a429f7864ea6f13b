use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Unknown client: {0}")]
    UnknownClient(String),

    #[error("Object {name} already registered in scope {scope} as {existing}")]
    ObjectCollision {
        name: String,
        scope: String,
        existing: String,
    },

    #[error("Timed out after {waited_ms}ms waiting for {name}")]
    LockTimeout { name: String, waited_ms: u64 },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Dispatch to client {client} failed: {message}")]
    Dispatch { client: String, message: String },

    #[error("Persisting {script} from {client} failed at {target}: {message}")]
    Persist {
        script: String,
        client: String,
        target: String,
        message: String,
    },

    #[error("Coordinator is shutting down")]
    ShutDown,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoordinatorError {
    pub fn invalid(message: impl Into<String>) -> Self {
        CoordinatorError::InvalidArgument(message.into())
    }

    pub fn illegal(message: impl Into<String>) -> Self {
        CoordinatorError::IllegalState(message.into())
    }

    /// Contract violations are the caller's fault; everything else is a
    /// resource or transport failure.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            CoordinatorError::InvalidArgument(_)
                | CoordinatorError::IllegalState(_)
                | CoordinatorError::UnknownClient(_)
                | CoordinatorError::ObjectCollision { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;

impl IntoResponse for CoordinatorError {
    fn into_response(self) -> Response {
        let status = match &self {
            CoordinatorError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            CoordinatorError::IllegalState(_) => StatusCode::CONFLICT,
            CoordinatorError::UnknownClient(_) => StatusCode::NOT_FOUND,
            CoordinatorError::ObjectCollision { .. } => StatusCode::CONFLICT,
            CoordinatorError::LockTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            CoordinatorError::Transport(_) => StatusCode::BAD_GATEWAY,
            CoordinatorError::Dispatch { .. } => StatusCode::BAD_GATEWAY,
            CoordinatorError::Persist { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            CoordinatorError::ShutDown => StatusCode::SERVICE_UNAVAILABLE,
            CoordinatorError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CoordinatorError::Sqlite(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CoordinatorError::Serialization(_) => StatusCode::BAD_REQUEST,
        };

        let body = serde_json::json!({
            "error": self.to_string(),
        });

        (status, axum::Json(body)).into_response()
    }
}
