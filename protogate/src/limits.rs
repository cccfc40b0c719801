//! Request body size limits.

use std::error::Error as _;

use axum::body::Body;
use bytes::Bytes;
use http_body_util::LengthLimitError;
use protogate_core::RpcError;

/// Default maximum request body size (4 MiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

/// Maximum request body size accepted by both transports.
///
/// # Example
///
/// ```rust
/// use protogate::MessageLimits;
///
/// let limits = MessageLimits::default();
/// assert_eq!(limits.max_message_size(), Some(4 * 1024 * 1024));
///
/// let limits = MessageLimits::new(1024);
/// assert!(limits.check_size(2048).is_err());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageLimits {
    max_message_size: Option<usize>,
}

impl Default for MessageLimits {
    fn default() -> Self {
        Self {
            max_message_size: Some(DEFAULT_MAX_MESSAGE_SIZE),
        }
    }
}

impl MessageLimits {
    pub fn new(max_message_size: usize) -> Self {
        Self {
            max_message_size: Some(max_message_size),
        }
    }

    /// No limit. Only for trusted callers.
    pub fn unlimited() -> Self {
        Self {
            max_message_size: None,
        }
    }

    pub fn max_message_size(&self) -> Option<usize> {
        self.max_message_size
    }

    /// Fails with `ResourceExhausted` when `size` is over the limit.
    pub fn check_size(&self, size: usize) -> Result<(), RpcError> {
        match self.max_message_size {
            Some(max) if size > max => Err(RpcError::resource_exhausted(format!(
                "message size {size} bytes exceeds maximum allowed size of {max} bytes"
            ))),
            _ => Ok(()),
        }
    }

    /// Read a whole request body, failing with `ResourceExhausted` past the limit.
    ///
    /// Any other body failure is `InvalidArgument`.
    pub(crate) async fn read_body(&self, body: Body) -> Result<Bytes, RpcError> {
        let max = self.max_message_size.unwrap_or(usize::MAX);
        axum::body::to_bytes(body, max).await.map_err(|e| {
            let message = format!("failed to read request body: {e}");
            if over_limit(&e) {
                RpcError::resource_exhausted(message)
            } else {
                RpcError::invalid_argument(message)
            }
        })
    }
}

fn over_limit(err: &axum::Error) -> bool {
    let mut source = err.source();
    while let Some(err) = source {
        if err.is::<LengthLimitError>() {
            return true;
        }
        source = err.source();
    }
    false
}
