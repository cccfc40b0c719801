//! HTTP adapters around the request pipeline.
//!
//! Both adapters report the outcome the same way: the transport code as the
//! HTTP status, plus `status` and `status-message` headers.

use axum::http::{HeaderName, HeaderValue};
use axum::response::Response;

use crate::handler::HandleResult;

pub(crate) mod binary;
pub(crate) mod rest;

/// Header carrying the numeric status code.
pub const STATUS_HEADER: HeaderName = HeaderName::from_static("status");
/// Header carrying the status message.
pub const STATUS_MESSAGE_HEADER: HeaderName = HeaderName::from_static("status-message");

/// Write the status headers and attach the failure, if any, to the
/// response extensions so outer middleware can inspect it.
pub(crate) fn apply_status<T>(response: &mut Response, result: &HandleResult<T>) {
    let headers = response.headers_mut();
    headers.insert(STATUS_HEADER, HeaderValue::from(result.status.as_i32()));

    match HeaderValue::from_bytes(sanitize(&result.status_message).as_bytes()) {
        Ok(value) => {
            headers.insert(STATUS_MESSAGE_HEADER, value);
        }
        Err(err) => {
            tracing::debug!(error = %err, "status message is not a valid header value");
        }
    }

    if let Some(err) = result.to_error() {
        response.extensions_mut().insert(err);
    }
}

fn sanitize(message: &str) -> String {
    message
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}
