//! The tagged error value.
//!
//! Implementations report failures as [`RpcError`]. An error may carry a
//! domain [`Code`] and a transport status code; when either is missing the
//! request pipeline falls back to `Unknown` / `500`.

use std::fmt;
use std::sync::Arc;

use http::StatusCode;
use serde::Serialize;

use crate::status::Code;

/// Message used when an error carries no message of its own.
pub const DEFAULT_ERROR_MESSAGE: &str = "internal error";

type BoxedSource = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// An error that captures the status metadata of a failed call: an optional
/// domain code, an optional transport code, a message, an optional source
/// error, and the plain request/response snapshots collected before failure.
///
/// # Example
///
/// ```
/// use protogate_core::{Code, RpcError};
///
/// let err = RpcError::not_found("user not found");
/// assert_eq!(err.status(), Some(Code::NotFound));
/// assert_eq!(err.transport_code().map(|s| s.as_u16()), Some(404));
///
/// // A generic error carries no status until one is stamped on it.
/// let err = RpcError::from_message("boom");
/// assert_eq!(err.status(), None);
/// let err = err.with_status(Code::Aborted);
/// assert_eq!(err.transport_code().map(|s| s.as_u16()), Some(409));
/// ```
#[derive(Clone, Debug)]
pub struct RpcError {
    status: Option<Code>,
    transport_code: Option<StatusCode>,
    message: Option<String>,
    source: Option<BoxedSource>,
    request_snapshot: Option<serde_json::Value>,
    response_snapshot: Option<serde_json::Value>,
}

impl RpcError {
    /// Create an error tagged with `code` and its transport code from the table.
    pub fn new<S: Into<String>>(code: Code, message: S) -> Self {
        Self::from_message(message).with_status(code)
    }

    /// Create an error tagged with `code` and no message.
    pub fn from_code(code: Code) -> Self {
        Self {
            status: None,
            transport_code: None,
            message: None,
            source: None,
            request_snapshot: None,
            response_snapshot: None,
        }
        .with_status(code)
    }

    /// Create an untagged error from a message.
    pub fn from_message<S: Into<String>>(message: S) -> Self {
        Self {
            status: None,
            transport_code: None,
            message: Some(message.into()),
            source: None,
            request_snapshot: None,
            response_snapshot: None,
        }
    }

    /// Wrap an arbitrary error. The result is untagged; its message is the
    /// source's `Display` output.
    pub fn from_error<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let mut out = Self::from_message(err.to_string());
        out.source = Some(Arc::new(err));
        out
    }

    /// Stamp a domain status, together with its transport code from the table.
    ///
    /// A transport code set explicitly with [`with_transport_code`](Self::with_transport_code)
    /// afterwards takes precedence.
    pub fn with_status(mut self, code: Code) -> Self {
        self.status = Some(code);
        self.transport_code = code.http_status();
        self
    }

    /// Stamp a transport status code without touching the domain status.
    pub fn with_transport_code(mut self, code: StatusCode) -> Self {
        self.transport_code = Some(code);
        self
    }

    /// Attach the plain request object seen by the pipeline.
    pub fn with_request_snapshot(mut self, snapshot: serde_json::Value) -> Self {
        self.request_snapshot = Some(snapshot);
        self
    }

    /// Attach the plain response object returned by the implementation.
    pub fn with_response_snapshot(mut self, snapshot: serde_json::Value) -> Self {
        self.response_snapshot = Some(snapshot);
        self
    }

    /// Get the domain status, if one was stamped.
    pub fn status(&self) -> Option<Code> {
        self.status
    }

    /// Get the transport status code, if one was stamped.
    pub fn transport_code(&self) -> Option<StatusCode> {
        self.transport_code
    }

    /// Get the error message.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn request_snapshot(&self) -> Option<&serde_json::Value> {
        self.request_snapshot.as_ref()
    }

    pub fn response_snapshot(&self) -> Option<&serde_json::Value> {
        self.response_snapshot.as_ref()
    }

    /// Status reported for this error: the stamped one, or `Unknown`.
    pub fn resolved_status(&self) -> Code {
        self.status.unwrap_or(Code::Unknown)
    }

    /// Transport code reported for this error: the stamped one, or `500`.
    pub fn resolved_transport_code(&self) -> StatusCode {
        self.transport_code
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Message reported for this error, with a generic fallback.
    pub fn resolved_message(&self) -> &str {
        match self.message.as_deref() {
            Some(msg) if !msg.is_empty() => msg,
            _ => DEFAULT_ERROR_MESSAGE,
        }
    }

    // Convenience constructors for all error codes

    /// Create a cancelled error.
    pub fn cancelled<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Cancelled, message)
    }

    /// Create an unknown error.
    pub fn unknown<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Unknown, message)
    }

    /// Create an invalid argument error.
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    /// Create a deadline exceeded error.
    pub fn deadline_exceeded<S: Into<String>>(message: S) -> Self {
        Self::new(Code::DeadlineExceeded, message)
    }

    /// Create a not found error.
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::new(Code::NotFound, message)
    }

    /// Create an already exists error.
    pub fn already_exists<S: Into<String>>(message: S) -> Self {
        Self::new(Code::AlreadyExists, message)
    }

    /// Create a permission denied error.
    pub fn permission_denied<S: Into<String>>(message: S) -> Self {
        Self::new(Code::PermissionDenied, message)
    }

    /// Create a resource exhausted error.
    pub fn resource_exhausted<S: Into<String>>(message: S) -> Self {
        Self::new(Code::ResourceExhausted, message)
    }

    /// Create a failed precondition error.
    pub fn failed_precondition<S: Into<String>>(message: S) -> Self {
        Self::new(Code::FailedPrecondition, message)
    }

    /// Create an aborted error.
    pub fn aborted<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Aborted, message)
    }

    /// Create an out of range error.
    pub fn out_of_range<S: Into<String>>(message: S) -> Self {
        Self::new(Code::OutOfRange, message)
    }

    /// Create an unimplemented error.
    pub fn unimplemented<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Unimplemented, message)
    }

    /// Create an internal error.
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Internal, message)
    }

    /// Create an unavailable error.
    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Unavailable, message)
    }

    /// Create a data loss error.
    pub fn data_loss<S: Into<String>>(message: S) -> Self {
        Self::new(Code::DataLoss, message)
    }

    /// Create an unauthenticated error.
    pub fn unauthenticated<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Unauthenticated, message)
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(status) = self.status {
            write!(f, "{status}: ")?;
        }
        f.write_str(self.resolved_message())
    }
}

impl std::error::Error for RpcError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|err| err as &(dyn std::error::Error + 'static))
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        Self::from_error(err)
    }
}

/// JSON body written by the REST transport for non-OK results.
///
/// ```json
/// {"error": "InvalidArgument", "message": "random: integer expected"}
/// ```
#[derive(Clone, Debug, Serialize)]
pub struct ErrorResponseBody {
    pub error: Code,
    pub message: String,
}

impl ErrorResponseBody {
    pub fn new<S: Into<String>>(error: Code, message: S) -> Self {
        Self {
            error,
            message: message.into(),
        }
    }
}
