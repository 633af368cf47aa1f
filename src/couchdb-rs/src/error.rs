use reqwest::StatusCode;
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Not modified")]
    NotModified,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("Not acceptable: {0}")]
    NotAcceptable(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Bad content type: {0}")]
    BadContentType(String),

    #[error("Requested range not satisfiable: {0}")]
    RangeNotSatisfiable(String),

    #[error("Expectation failed: {0}")]
    ExpectationFailed(String),

    #[error("Internal server error: {0}")]
    InternalServerError(String),

    #[error("Server error: {status} - {message}")]
    Server { status: u16, message: String },

    #[error("Invalid response from server: {0}")]
    InvalidResponse(String),

    #[error("Invalid database name: {0}")]
    InvalidDatabaseName(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// CouchDB error body: `{"error": "not_found", "reason": "missing"}`
#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    reason: Option<String>,
}

impl ClientError {
    /// Map a non-success status and its body to an error
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let message = match serde_json::from_str::<ErrorBody>(body) {
            Ok(ErrorBody {
                error,
                reason: Some(reason),
            }) => format!("{}: {}", error, reason),
            Ok(ErrorBody { error, reason: None }) => error,
            Err(_) => body.trim().to_string(),
        };

        match status.as_u16() {
            304 => ClientError::NotModified,
            400 => ClientError::BadRequest(message),
            401 => ClientError::Unauthorized(message),
            403 => ClientError::Forbidden(message),
            404 => ClientError::NotFound(message),
            405 => ClientError::MethodNotAllowed(message),
            406 => ClientError::NotAcceptable(message),
            409 => ClientError::Conflict(message),
            412 => ClientError::PreconditionFailed(message),
            415 => ClientError::BadContentType(message),
            416 => ClientError::RangeNotSatisfiable(message),
            417 => ClientError::ExpectationFailed(message),
            500 => ClientError::InternalServerError(message),
            status => ClientError::Server { status, message },
        }
    }

    /// HTTP status this error stands for, if it came from the server
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::NotModified => Some(304),
            ClientError::BadRequest(_) => Some(400),
            ClientError::Unauthorized(_) => Some(401),
            ClientError::Forbidden(_) => Some(403),
            ClientError::NotFound(_) => Some(404),
            ClientError::MethodNotAllowed(_) => Some(405),
            ClientError::NotAcceptable(_) => Some(406),
            ClientError::Conflict(_) => Some(409),
            ClientError::PreconditionFailed(_) => Some(412),
            ClientError::BadContentType(_) => Some(415),
            ClientError::RangeNotSatisfiable(_) => Some(416),
            ClientError::ExpectationFailed(_) => Some(417),
            ClientError::InternalServerError(_) => Some(500),
            ClientError::Server { status, .. } => Some(*status),
            ClientError::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
