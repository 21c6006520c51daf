//! Gateway error types.
//!
//! [`LookupError`] is the typed outcome of a failed lookup; [`ApiError`] is
//! its stable JSON shape with an HTTP status.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Machine-checkable error codes carried in every error body
pub mod codes {
    pub const VALIDATION_ERROR: &str = "validation_error";
    pub const RATE_LIMITED: &str = "rate_limited";
    pub const SESSION_UNAVAILABLE: &str = "session_unavailable";
    pub const SEND_FAILED: &str = "send_failed";
    pub const CORRELATION_TIMEOUT: &str = "correlation_timeout";
    pub const PARSE_FAILURE: &str = "parse_failure";
    pub const INTERNAL_ERROR: &str = "internal_error";
}

/// Longest diagnostic text surfaced to clients.
pub const MAX_DIAGNOSTIC_LEN: usize = 200;

/// Longest raw reply excerpt attached to a parse failure.
pub const MAX_RAW_EXCERPT_LEN: usize = 500;

/// Why a lookup failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    /// Missing or blank query identifier
    #[error("missing query identifier")]
    Validation,

    /// Admission refused by the rate limiter
    #[error("rate limit exceeded, retry in {}ms", retry_after.as_millis())]
    RateLimited { retry_after: Duration },

    /// Connect, authorization or destination resolution failed
    #[error("session unavailable: {0}")]
    SessionUnavailable(String),

    /// The session is ready but no conversation qualifies as destination
    #[error("session unavailable: no eligible destination found")]
    NoDestination,

    /// The command could not be posted
    #[error("send failed: {0}")]
    SendFailed(String),

    /// No matching reply before the deadline
    #[error("no reply within {}ms", waited.as_millis())]
    CorrelationTimeout { waited: Duration },

    /// A reply arrived but could not be turned into text
    #[error("parse failure: {reason}")]
    ParseFailure {
        reason: String,
        raw_excerpt: Option<String>,
    },

    /// Unexpected collaborator failure
    #[error("internal error: {0}")]
    Internal(String),
}

impl LookupError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation => codes::VALIDATION_ERROR,
            Self::RateLimited { .. } => codes::RATE_LIMITED,
            Self::SessionUnavailable(_) | Self::NoDestination => codes::SESSION_UNAVAILABLE,
            Self::SendFailed(_) => codes::SEND_FAILED,
            Self::CorrelationTimeout { .. } => codes::CORRELATION_TIMEOUT,
            Self::ParseFailure { .. } => codes::PARSE_FAILURE,
            Self::Internal(_) => codes::INTERNAL_ERROR,
        }
    }

    /// True for timeouts (counted separately in metrics)
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::CorrelationTimeout { .. })
    }
}

/// Client-facing error with an HTTP status
#[derive(Debug, Clone)]
pub struct ApiError {
    /// HTTP status
    pub status: StatusCode,
    /// Stable error code (see [`codes`])
    pub code: &'static str,
    /// Human readable message
    pub message: String,
    /// Extra top-level fields merged into the body
    pub data: Option<serde_json::Value>,
    /// Retry hint, emitted as `Retry-After`
    pub retry_after: Option<Duration>,
}

impl ApiError {
    /// Create a new API error
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            data: None,
            retry_after: None,
        }
    }

    /// Attach extra fields
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Missing query parameter, with usage hints
    pub fn missing_parameter() -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            codes::VALIDATION_ERROR,
            "Missing fam parameter",
        )
        .with_data(serde_json::json!({
            "usage": "GET /api?fam=upi@fam",
            "example": "GET /api?fam=priyanshis@fam"
        }))
    }

    /// Rate limited
    pub fn rate_limited(retry_after: Duration) -> Self {
        let mut error = Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            codes::RATE_LIMITED,
            "Rate limit exceeded",
        )
        .with_data(serde_json::json!({
            "retry_after_ms": retry_after.as_millis() as u64
        }));
        error.retry_after = Some(retry_after);
        error
    }

    /// Session could not be made ready
    pub fn session_unavailable(details: &str) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::SESSION_UNAVAILABLE,
            "Failed to initialize Telegram client",
        )
        .with_data(serde_json::json!({ "details": bounded(details, MAX_DIAGNOSTIC_LEN) }))
    }

    /// No destination conversation
    pub fn no_destination() -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::SESSION_UNAVAILABLE,
            "No group found",
        )
    }

    /// Command could not be posted
    pub fn send_failed(details: &str) -> Self {
        Self::new(
            StatusCode::BAD_GATEWAY,
            codes::SEND_FAILED,
            "Failed to send command",
        )
        .with_data(serde_json::json!({ "details": bounded(details, MAX_DIAGNOSTIC_LEN) }))
    }

    /// Reply did not arrive in time
    pub fn timeout(waited: Duration) -> Self {
        Self::new(
            StatusCode::GATEWAY_TIMEOUT,
            codes::CORRELATION_TIMEOUT,
            "No response from bot within timeout",
        )
        .with_data(serde_json::json!({ "waited_ms": waited.as_millis() as u64 }))
    }

    /// Reply arrived but could not be read
    pub fn parse_failure(raw_excerpt: Option<&str>) -> Self {
        let error = Self::new(
            StatusCode::BAD_GATEWAY,
            codes::PARSE_FAILURE,
            "Failed to parse bot response",
        );
        match raw_excerpt {
            Some(raw) => error.with_data(serde_json::json!({
                "raw_text": bounded(raw, MAX_RAW_EXCERPT_LEN)
            })),
            None => error,
        }
    }

    /// Internal error
    pub fn internal(details: &str) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::INTERNAL_ERROR,
            "Internal server error",
        )
        .with_data(serde_json::json!({ "message": bounded(details, MAX_DIAGNOSTIC_LEN) }))
    }

    /// JSON body
    pub fn to_json(&self) -> serde_json::Value {
        let mut body = serde_json::json!({
            "error": self.message,
            "code": self.code,
        });
        if let (Some(serde_json::Value::Object(extra)), Some(map)) =
            (&self.data, body.as_object_mut())
        {
            for (key, value) in extra {
                map.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
        body
    }
}

impl From<&LookupError> for ApiError {
    fn from(error: &LookupError) -> Self {
        match error {
            LookupError::Validation => ApiError::missing_parameter(),
            LookupError::RateLimited { retry_after } => ApiError::rate_limited(*retry_after),
            LookupError::SessionUnavailable(details) => ApiError::session_unavailable(details),
            LookupError::NoDestination => ApiError::no_destination(),
            LookupError::SendFailed(details) => ApiError::send_failed(details),
            LookupError::CorrelationTimeout { waited } => ApiError::timeout(*waited),
            LookupError::ParseFailure { raw_excerpt, .. } => {
                ApiError::parse_failure(raw_excerpt.as_deref())
            }
            LookupError::Internal(details) => ApiError::internal(details),
        }
    }
}

impl From<LookupError> for ApiError {
    fn from(error: LookupError) -> Self {
        ApiError::from(&error)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl Serialize for ApiError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_json().serialize(serializer)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.to_json())).into_response();
        if let Some(retry_after) = self.retry_after {
            let secs = retry_after.as_millis().div_ceil(1000).max(1);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

/// Truncate `text` to at most `max` characters on a char boundary.
pub fn bounded(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Gateway-level errors (startup and serving, not per lookup)
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Server socket bind error
    #[error("server bind error: {0}")]
    Bind(String),

    /// Serving failed
    #[error("server error: {0}")]
    Serve(String),
}
