//! Binary transport: `POST {prefix}/{service}/{method}` carrying protobuf
//! wire bytes, raw or in a single length-prefixed envelope.

use axum::Router;
use axum::body::Body;
use axum::extract::Request;
use axum::http::{HeaderValue, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use bytes::Bytes;
use protogate_core::{Code, RpcError, unwrap_envelope, wrap_envelope};

use crate::gateway::Gateway;
use crate::handler::HandleResult;

/// How a content type frames the message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Framing {
    /// The body is the message.
    Raw,
    /// The body is one envelope around the message.
    Enveloped,
}

impl Framing {
    fn from_media_type(media_type: &str) -> Option<Self> {
        match media_type {
            "application/octet-stream"
            | "application/protobuf"
            | "application/x-protobuf"
            | "application/vnd.google.protobuf" => Some(Framing::Raw),
            "application/grpc-web+proto" => Some(Framing::Enveloped),
            _ => None,
        }
    }
}

pub(crate) fn router<S>(gateway: &Gateway) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let mut router = Router::new();
    for (index, entry) in gateway.methods().iter().enumerate() {
        let gateway = gateway.clone();
        router = router.route(
            &entry.path,
            post(move |request: Request| async move { serve(gateway, index, request).await })
                .fallback(method_not_allowed),
        );
    }
    router.fallback(not_a_service)
}

async fn serve(gateway: Gateway, index: usize, request: Request) -> Response {
    let entry = &gateway.methods()[index];

    let media_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(media_type)
        .unwrap_or_default();

    let Some(framing) = Framing::from_media_type(&media_type) else {
        let result = HandleResult::failure(
            Code::Unimplemented,
            format!("Unimplemented \"Content-Type\" parser for \"{media_type}\""),
        );
        return respond(result, None);
    };
    let reply = Some((framing, media_type.as_str()));

    let body = match gateway.config().limits.read_body(request.into_body()).await {
        Ok(body) => body,
        Err(err) => return respond(HandleResult::from_error(err), reply),
    };

    let payload = match framing {
        Framing::Raw => body,
        Framing::Enveloped => match unwrap_envelope(&body) {
            Ok(payload) => payload,
            Err(err) => {
                return respond(
                    HandleResult::failure(Code::InvalidArgument, err.to_string()),
                    reply,
                );
            }
        },
    };

    respond(entry.handler.handle_buffer(&payload).await, reply)
}

/// The media type of a `Content-Type` value, without parameters.
fn media_type(value: &str) -> String {
    value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Non-OK results have an empty body; the content type echoes the request.
fn respond(mut result: HandleResult<Bytes>, reply: Option<(Framing, &str)>) -> Response {
    let body = match (result.response.take(), reply) {
        (Some(bytes), Some((Framing::Enveloped, _))) if result.is_ok() => {
            Body::from(wrap_envelope(&bytes))
        }
        (Some(bytes), _) if result.is_ok() => Body::from(bytes),
        _ => Body::empty(),
    };

    let mut response = (result.transport_code, body).into_response();
    let content_type =
        reply.and_then(|(_, content_type)| HeaderValue::from_str(content_type).ok());
    if let Some(value) = content_type {
        response.headers_mut().insert(header::CONTENT_TYPE, value);
    }
    super::apply_status(&mut response, &result);
    response
}

pub(super) async fn method_not_allowed(method: Method) -> Response {
    invalid_request(
        StatusCode::METHOD_NOT_ALLOWED,
        format!("Invalid HTTP request: Method {method} is not allowed"),
    )
}

async fn not_a_service(method: Method, uri: Uri) -> Response {
    if method != Method::POST {
        return method_not_allowed(method).await;
    }
    invalid_request(
        StatusCode::NOT_FOUND,
        format!("Invalid HTTP request: Path {} is not a service", uri.path()),
    )
}

fn invalid_request(transport_code: StatusCode, message: String) -> Response {
    let result: HandleResult<()> = HandleResult::from_error(
        RpcError::not_found(message).with_transport_code(transport_code),
    );
    let mut response = (transport_code, Body::empty()).into_response();
    super::apply_status(&mut response, &result);
    response
}
