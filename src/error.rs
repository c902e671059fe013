//! Error taxonomy and classification for gateway operations
//!
//! Every failure that crosses the gateway boundary is a [`GatewayError`].
//! [`classify`] is the single translation point from raw transport failures
//! into the closed [`ErrorKind`] taxonomy; layers above it (operations,
//! retry, callers) only ever observe already-classified errors.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Closed taxonomy of gateway failure kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Network or connection failure
    Network,

    /// Operation timed out
    Timeout,

    /// Credentials rejected or operation forbidden
    AccessDenied,

    /// Bucket does not exist
    BucketNotFound,

    /// Object does not exist
    ObjectNotFound,

    /// Bucket name is already taken
    BucketExists,

    /// Bucket name rejected by the service
    InvalidBucketName,

    /// Unclassified failure
    Unknown,

    /// Required connection configuration is absent
    ConfigurationMissing,
}

impl ErrorKind {
    /// Whether a failure of this kind is worth another attempt
    ///
    /// Only transient-looking failures retry; everything else is definitive
    /// and surfaces immediately.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::Network | ErrorKind::Timeout | ErrorKind::Unknown
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Network => "NETWORK",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::AccessDenied => "ACCESS_DENIED",
            ErrorKind::BucketNotFound => "BUCKET_NOT_FOUND",
            ErrorKind::ObjectNotFound => "OBJECT_NOT_FOUND",
            ErrorKind::BucketExists => "BUCKET_EXISTS",
            ErrorKind::InvalidBucketName => "INVALID_BUCKET_NAME",
            ErrorKind::Unknown => "UNKNOWN",
            ErrorKind::ConfigurationMissing => "CONFIGURATION_MISSING",
        };
        f.write_str(name)
    }
}

/// Classified gateway failure
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct GatewayError {
    /// Failure kind from the closed taxonomy
    pub kind: ErrorKind,

    /// Human-readable message, safe to surface to callers
    pub message: String,

    /// HTTP-like status hint for response mapping
    pub status_hint: Option<u16>,

    /// Bucket or bucket/key the failure relates to, when known
    pub resource: Option<String>,
}

impl GatewayError {
    /// Create an error with no status hint
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status_hint: None,
            resource: None,
        }
    }

    /// Create an error with an explicit status hint
    pub fn with_status(kind: ErrorKind, message: impl Into<String>, status: u16) -> Self {
        Self {
            kind,
            message: message.into(),
            status_hint: Some(status),
            resource: None,
        }
    }

    /// Attach the bucket or bucket/key this failure relates to
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Configuration error naming every missing field
    pub fn configuration_missing(missing: &[&str]) -> Self {
        Self::new(
            ErrorKind::ConfigurationMissing,
            format!(
                "Connection configuration missing. Set {} before using the gateway.",
                missing.join(", ")
            ),
        )
    }

    /// Boundary validation failure (absent bucket name, empty key, ...)
    pub fn validation(message: impl Into<String>) -> Self {
        Self::with_status(ErrorKind::Unknown, message, 400)
    }

    /// Status to use at an HTTP-style boundary: the hint, or 500 when unset
    pub fn http_status(&self) -> u16 {
        self.status_hint.unwrap_or(500)
    }

    /// Whether this failure is worth another attempt
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Classify an arbitrary failure into a [`GatewayError`]
///
/// Deterministic and total: never panics, always produces a classified
/// error. An input that is already a `GatewayError` is returned unchanged.
pub fn classify(err: &(dyn std::error::Error + 'static)) -> GatewayError {
    if let Some(already) = err.downcast_ref::<GatewayError>() {
        return already.clone();
    }
    classify_message(&chain_text(err))
}

/// Flatten an error and its `source()` chain into one message string
fn chain_text(err: &(dyn std::error::Error + 'static)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

/// Ordered pattern rules over the raw failure text; first match wins
pub(crate) fn classify_message(raw: &str) -> GatewayError {
    let msg = raw.to_lowercase();

    if msg.contains("network") || msg.contains("connection") || msg.contains("dispatch failure") {
        return GatewayError::with_status(
            ErrorKind::Network,
            "Network connection failed. Check the storage server connection.",
            0,
        );
    }

    if msg.contains("access denied") || msg.contains("accessdenied") || msg.contains("forbidden") {
        return GatewayError::with_status(
            ErrorKind::AccessDenied,
            "Access denied. Check your credentials and permissions.",
            403,
        );
    }

    if (msg.contains("bucket") && msg.contains("not found")) || msg.contains("nosuchbucket") {
        return GatewayError::with_status(
            ErrorKind::BucketNotFound,
            "The specified bucket does not exist.",
            404,
        );
    }

    if ((msg.contains("object") || msg.contains("key")) && msg.contains("not found"))
        || msg.contains("nosuchkey")
    {
        return GatewayError::with_status(
            ErrorKind::ObjectNotFound,
            "The specified object does not exist.",
            404,
        );
    }

    if (msg.contains("bucket") && msg.contains("already exists"))
        || msg.contains("bucketalreadyexists")
        || msg.contains("bucketalreadyownedbyyou")
    {
        return GatewayError::with_status(
            ErrorKind::BucketExists,
            "A bucket with this name already exists.",
            409,
        );
    }

    if msg.contains("invalid bucket name") || msg.contains("invalidbucketname") {
        return GatewayError::with_status(
            ErrorKind::InvalidBucketName,
            "Invalid bucket name. Use lowercase letters, numbers, dots, and hyphens only.",
            400,
        );
    }

    if msg.contains("timeout") || msg.contains("timed out") {
        return GatewayError::with_status(
            ErrorKind::Timeout,
            "Operation timed out. Try again.",
            408,
        );
    }

    GatewayError::new(ErrorKind::Unknown, raw)
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        classify(&err)
    }
}

/// Convert AWS SDK errors into classified gateway errors
///
/// Dispatch-level failures map structurally (the SDK knows a timeout from a
/// connect failure); service errors go through the message rules, which see
/// the service error code (`NoSuchBucket`, `AccessDenied`, ...) in the
/// formatted text.
impl<E> From<aws_sdk_s3::error::SdkError<E>> for GatewayError
where
    E: std::error::Error + 'static,
{
    fn from(error: aws_sdk_s3::error::SdkError<E>) -> Self {
        use aws_sdk_s3::error::SdkError;

        match &error {
            SdkError::TimeoutError(_) => GatewayError::with_status(
                ErrorKind::Timeout,
                "Operation timed out. Try again.",
                408,
            ),
            SdkError::DispatchFailure(cause) => {
                if cause.is_timeout() {
                    GatewayError::with_status(
                        ErrorKind::Timeout,
                        "Operation timed out. Try again.",
                        408,
                    )
                } else {
                    GatewayError::with_status(
                        ErrorKind::Network,
                        "Network connection failed. Check the storage server connection.",
                        0,
                    )
                }
            }
            SdkError::ResponseError(_) => GatewayError::with_status(
                ErrorKind::Network,
                "Network connection failed. Check the storage server connection.",
                0,
            ),
            SdkError::ServiceError(_) => classify_message(&format!("{error:?}")),
            _ => classify_message(&format!("{error:?}")),
        }
    }
}
