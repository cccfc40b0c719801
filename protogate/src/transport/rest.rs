//! JSON/REST transport: one route per bound method, plus the definition
//! endpoint.

use std::collections::BTreeMap;

use axum::Json;
use axum::Router;
use axum::extract::{FromRequestParts, Path, Request};
use axum::http::{HeaderMap, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodFilter, MethodRouter, get};
use protogate_core::{ErrorResponseBody, RpcError};
use serde_json::{Map, Value};

use crate::binding::{HttpMethod, resolve_request_object};
use crate::gateway::Gateway;
use crate::handler::HandleResult;

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

pub(crate) fn router<S>(gateway: &Gateway) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let mut paths: BTreeMap<String, MethodRouter<S>> = BTreeMap::new();

    for (index, route) in gateway.routes().iter().enumerate() {
        let gateway = gateway.clone();
        let handler = move |request: Request| async move { serve(gateway, index, request).await };

        let method_router = paths
            .remove(&route.route_path)
            .unwrap_or_else(|| MethodRouter::new().fallback(super::binary::method_not_allowed))
            .on(method_filter(route.binding.method), handler);
        paths.insert(route.route_path.clone(), method_router);
    }

    let mut router = Router::new();
    for (path, method_router) in paths {
        router = router.route(&path, method_router);
    }

    if let Some(path) = gateway.definition_path() {
        let gateway = gateway.clone();
        router = router.route(
            path,
            get(move || async move { Json(gateway.document().clone()) })
                .fallback(super::binary::method_not_allowed),
        );
    }

    router
}

fn method_filter(method: HttpMethod) -> MethodFilter {
    match method {
        HttpMethod::Get => MethodFilter::GET,
        HttpMethod::Post => MethodFilter::POST,
        HttpMethod::Put => MethodFilter::PUT,
        HttpMethod::Delete => MethodFilter::DELETE,
    }
}

async fn serve(gateway: Gateway, index: usize, request: Request) -> Response {
    let route = &gateway.routes()[index];
    let config = gateway.config();

    let result = match request_object(&gateway, index, request).await {
        Ok(object) => {
            route
                .handler
                .handle_object(&object, &config.to_plain_options)
                .await
        }
        Err(err) => HandleResult::from_error(err),
    };

    respond(result)
}

/// Merge path parameters, query string and body into the request object.
async fn request_object(
    gateway: &Gateway,
    index: usize,
    request: Request,
) -> Result<Value, RpcError> {
    let route = &gateway.routes()[index];
    let (mut parts, body) = request.into_parts();

    let params = if route.binding.path_params().is_empty() {
        Vec::new()
    } else {
        let Path(params) = Path::<Vec<(String, String)>>::from_request_parts(&mut parts, &())
            .await
            .map_err(|rejection| RpcError::invalid_argument(rejection.body_text()))?;
        params
    };

    let body = if route.binding.body.reads_body() {
        let bytes = gateway.config().limits.read_body(body).await?;
        parse_body(&parts.headers, &bytes)?
    } else {
        None
    };

    resolve_request_object(params, parts.uri.query(), body, &route.binding.body)
}

fn parse_body(headers: &HeaderMap, bytes: &[u8]) -> Result<Option<Value>, RpcError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    let is_form = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|value| value.trim().eq_ignore_ascii_case(FORM_URLENCODED));

    if is_form {
        let form = std::str::from_utf8(bytes)
            .map_err(|err| RpcError::invalid_argument(format!("invalid form body: {err}")))?;
        let form: Map<String, Value> = serde_qs::from_str(form)
            .map_err(|err| RpcError::invalid_argument(format!("invalid form body: {err}")))?;
        return Ok(Some(Value::Object(form)));
    }

    serde_json::from_slice(bytes)
        .map(Some)
        .map_err(|err| RpcError::invalid_argument(format!("invalid JSON body: {err}")))
}

fn respond(mut result: HandleResult<Value>) -> Response {
    let mut response = match result.response.take() {
        Some(body) if result.is_ok() => (result.transport_code, Json(body)).into_response(),
        _ => (
            result.transport_code,
            Json(ErrorResponseBody::new(
                result.status,
                result.status_message.clone(),
            )),
        )
            .into_response(),
    };
    super::apply_status(&mut response, &result);
    response
}
