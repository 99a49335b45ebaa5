use serde_json::{json, Value};
use thiserror::Error;

/// Classified failures shared by the request pipeline and the normalizer.
///
/// Every variant carries a human-readable message; `Display` is what ends up
/// in `metadata.error_message` of a product envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScrapeError {
    /// The ASIN fails the format check or cannot be located in the URL.
    #[error("invalid ASIN: {0}")]
    InvalidIdentifier(String),
    /// Credentials fail validation or the API rejected them.
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),
    /// The API kept throttling until retries ran out.
    #[error("rate limit exceeded: {0}")]
    RateLimited(String),
    /// Transport or server failure that survived every retry.
    #[error("API connection error: {0}")]
    ConnectionFailure(String),
    /// The body could not be decoded as JSON.
    #[error("data extraction error: {0}")]
    MalformedResponse(String),
    /// Decodable, but missing `results` / `content`.
    #[error("validation error: {0}")]
    StructuralValidation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl ScrapeError {
    pub const INVALID_ASIN: &'static str = "invalid_asin";
    pub const INVALID_CREDENTIALS: &'static str = "invalid_credentials";
    pub const RATE_LIMIT: &'static str = "rate_limit";
    pub const CONNECTION_ERROR: &'static str = "connection_error";
    pub const DATA_EXTRACTION_ERROR: &'static str = "data_extraction_error";
    pub const VALIDATION_ERROR: &'static str = "validation_error";
    pub const UNEXPECTED_ERROR: &'static str = "unexpected_error";

    /// Stable serialization tag of the error kind.
    pub fn tag(&self) -> &'static str {
        match self {
            ScrapeError::InvalidIdentifier(_) => Self::INVALID_ASIN,
            ScrapeError::InvalidCredentials(_) => Self::INVALID_CREDENTIALS,
            ScrapeError::RateLimited(_) => Self::RATE_LIMIT,
            ScrapeError::ConnectionFailure(_) => Self::CONNECTION_ERROR,
            ScrapeError::MalformedResponse(_) => Self::DATA_EXTRACTION_ERROR,
            ScrapeError::StructuralValidation(_) => Self::VALIDATION_ERROR,
            ScrapeError::Unexpected(_) => Self::UNEXPECTED_ERROR,
        }
    }

    /// The message without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            ScrapeError::InvalidIdentifier(m)
            | ScrapeError::InvalidCredentials(m)
            | ScrapeError::RateLimited(m)
            | ScrapeError::ConnectionFailure(m)
            | ScrapeError::MalformedResponse(m)
            | ScrapeError::StructuralValidation(m)
            | ScrapeError::Unexpected(m) => m,
        }
    }

    /// Kind-level retry eligibility.
    ///
    /// Client-class HTTP statuses surface as `ConnectionFailure` too, but the
    /// pipeline decides those per attempt and never retries them.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ScrapeError::RateLimited(_) | ScrapeError::ConnectionFailure(_)
        )
    }

    /// Error-shaped payload: `{"error": <tag>, "message": <message>}`.
    pub fn to_marker(&self) -> Value {
        json!({
            "error": self.tag(),
            "message": self.message(),
        })
    }

    /// Maps an error marker found in a payload back to its kind.
    pub fn from_marker(tag: &str, message: &str) -> Self {
        let message = message.to_string();
        match tag {
            Self::INVALID_ASIN => ScrapeError::InvalidIdentifier(message),
            Self::INVALID_CREDENTIALS => ScrapeError::InvalidCredentials(message),
            Self::RATE_LIMIT => ScrapeError::RateLimited(message),
            Self::CONNECTION_ERROR => ScrapeError::ConnectionFailure(message),
            Self::DATA_EXTRACTION_ERROR => ScrapeError::MalformedResponse(message),
            Self::VALIDATION_ERROR => ScrapeError::StructuralValidation(message),
            _ => ScrapeError::Unexpected(format!("API returned error: {}", message)),
        }
    }
}

/// Transport-level faults. These never leave the pipeline; they are folded
/// into a [`ScrapeError`] once retries are settled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request failed: {0}")]
    Other(String),
}

impl From<wreq::Error> for TransportError {
    fn from(err: wreq::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout(err.to_string())
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else {
            TransportError::Other(err.to_string())
        }
    }
}
