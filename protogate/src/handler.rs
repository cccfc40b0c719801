//! The request pipeline.
//!
//! A [`RequestHandler`] is bound to one request schema, one response schema
//! and one [`Implementation`]. Every call goes through the same steps:
//! verify the request, invoke the implementation with the plain request,
//! rebuild and verify the response. The outcome is always a
//! [`HandleResult`]; errors and panics never escape.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bytes::Bytes;
use futures::FutureExt;
use futures::future::BoxFuture;
use http::StatusCode;
use protogate_core::{Code, RpcError};

use crate::schema::{MessageSchema, MessageType, ToPlainOptions};

/// An asynchronous method implementation working on plain objects.
///
/// Implemented for every `Fn(serde_json::Value) -> impl Future<Output =
/// Result<serde_json::Value, RpcError>>`.
pub trait Implementation: Send + Sync + 'static {
    fn call(
        &self,
        request: serde_json::Value,
    ) -> BoxFuture<'static, Result<serde_json::Value, RpcError>>;
}

impl<F, Fut> Implementation for F
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<serde_json::Value, RpcError>> + Send + 'static,
{
    fn call(
        &self,
        request: serde_json::Value,
    ) -> BoxFuture<'static, Result<serde_json::Value, RpcError>> {
        (self)(request).boxed()
    }
}

/// Method implementations keyed by method name.
///
/// # Example
///
/// ```
/// use protogate::Implementations;
/// use protogate_core::RpcError;
/// use serde_json::{Value, json};
///
/// let implementations = Implementations::new().add("Action", |request: Value| async move {
///     Ok::<_, RpcError>(json!({ "randomNumber": request["random"] }))
/// });
/// assert!(implementations.get("Action").is_some());
/// ```
#[derive(Clone, Default)]
pub struct Implementations {
    methods: HashMap<String, Arc<dyn Implementation>>,
}

impl Implementations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `implementation` under `name`, replacing any previous entry.
    pub fn add<S, I>(mut self, name: S, implementation: I) -> Self
    where
        S: Into<String>,
        I: Implementation,
    {
        self.insert(name, implementation);
        self
    }

    pub fn insert<S, I>(&mut self, name: S, implementation: I)
    where
        S: Into<String>,
        I: Implementation,
    {
        self.methods.insert(name.into(), Arc::new(implementation));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Implementation>> {
        self.methods.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl fmt::Debug for Implementations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("Implementations").field("methods", &names).finish()
    }
}

/// Outcome of one call through a [`RequestHandler`].
///
/// `status == Code::Ok` exactly when `response` is set and `error` is not.
#[derive(Clone, Debug)]
pub struct HandleResult<T> {
    pub status: Code,
    pub transport_code: StatusCode,
    pub status_message: String,
    pub response: Option<T>,
    pub error: Option<RpcError>,
}

impl<T> HandleResult<T> {
    pub fn ok(response: T) -> Self {
        Self {
            status: Code::Ok,
            transport_code: StatusCode::OK,
            status_message: Code::Ok.name().to_string(),
            response: Some(response),
            error: None,
        }
    }

    /// A non-OK result with the table transport code for `status`.
    pub fn failure<S: Into<String>>(status: Code, message: S) -> Self {
        Self {
            status,
            transport_code: status
                .http_status()
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            status_message: message.into(),
            response: None,
            error: None,
        }
    }

    /// A non-OK result reusing whatever status metadata `err` carries.
    pub fn from_error(err: RpcError) -> Self {
        let status = match err.resolved_status() {
            Code::Ok => Code::Unknown,
            status => status,
        };
        Self {
            status,
            transport_code: err.resolved_transport_code(),
            status_message: err.resolved_message().to_string(),
            response: None,
            error: Some(err),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == Code::Ok
    }

    /// Convert the response of an OK result. A conversion error turns the
    /// result into a failure.
    pub fn try_map<U, F>(self, f: F) -> HandleResult<U>
    where
        F: FnOnce(T) -> Result<U, RpcError>,
    {
        match self.response {
            Some(response) if self.status == Code::Ok => match f(response) {
                Ok(converted) => HandleResult::ok(converted),
                Err(err) => HandleResult::from_error(err),
            },
            _ => HandleResult {
                status: self.status,
                transport_code: self.transport_code,
                status_message: self.status_message,
                response: None,
                error: self.error,
            },
        }
    }

    /// The error describing a non-OK result, built from the status fields
    /// when the pipeline did not attach one.
    pub fn to_error(&self) -> Option<RpcError> {
        if self.is_ok() {
            return None;
        }
        Some(self.error.clone().unwrap_or_else(|| {
            RpcError::new(self.status, self.status_message.clone())
                .with_transport_code(self.transport_code)
        }))
    }
}

/// The request pipeline for one method.
///
/// Stateless across calls; share it behind an `Arc` and call it
/// concurrently.
pub struct RequestHandler<Req = MessageType, Res = MessageType> {
    service: String,
    method: String,
    request: Req,
    response: Res,
    implementation: Arc<dyn Implementation>,
}

impl<Req, Res> RequestHandler<Req, Res>
where
    Req: MessageSchema,
    Res: MessageSchema,
{
    pub fn new(request: Req, response: Res, implementation: Arc<dyn Implementation>) -> Self {
        Self {
            service: String::new(),
            method: String::new(),
            request,
            response,
            implementation,
        }
    }

    /// Name the handler for log output.
    pub fn with_method<S, M>(mut self, service: S, method: M) -> Self
    where
        S: Into<String>,
        M: Into<String>,
    {
        self.service = service.into();
        self.method = method.into();
        self
    }

    pub fn request_schema(&self) -> &Req {
        &self.request
    }

    pub fn response_schema(&self) -> &Res {
        &self.response
    }

    /// Run a structured request through the pipeline.
    pub async fn handle(&self, request: Req::Message) -> HandleResult<Res::Message> {
        let result = self.run(request).await;
        self.record(&result);
        result
    }

    /// Build the request from a plain object, run it, and render the
    /// response as a plain object with `options`.
    pub async fn handle_object(
        &self,
        object: &serde_json::Value,
        options: &ToPlainOptions,
    ) -> HandleResult<serde_json::Value> {
        let result = match self.request.from_plain(object) {
            Ok(request) => self.run(request).await.try_map(|response| {
                self.response
                    .to_plain(&response, options)
                    .map_err(|err| RpcError::internal(err.to_string()))
            }),
            Err(err) => HandleResult::failure(Code::InvalidArgument, err.to_string()),
        };
        self.record(&result);
        result
    }

    /// Decode a binary request, run it, and encode the response.
    ///
    /// Non-OK results carry no response bytes.
    pub async fn handle_buffer(&self, buf: &[u8]) -> HandleResult<Bytes> {
        let result = match self.request.decode(buf) {
            Ok(request) => self.run(request).await.try_map(|response| {
                self.response
                    .encode(&response)
                    .map(Bytes::from)
                    .map_err(|err| RpcError::internal(err.to_string()))
            }),
            Err(err) => HandleResult::failure(Code::InvalidArgument, err.to_string()),
        };
        self.record(&result);
        result
    }

    async fn run(&self, request: Req::Message) -> HandleResult<Res::Message> {
        if let Some(reason) = self.request.verify(&request) {
            return HandleResult::failure(Code::InvalidArgument, reason);
        }

        match AssertUnwindSafe(self.invoke(&request)).catch_unwind().await {
            Ok(Ok(response)) => HandleResult::ok(response),
            Ok(Err(err)) => HandleResult::from_error(err),
            Err(panic) => HandleResult::from_error(RpcError::from_message(panic_message(&*panic))),
        }
    }

    async fn invoke(&self, request: &Req::Message) -> Result<Res::Message, RpcError> {
        let plain_request = self
            .request
            .to_plain(request, &ToPlainOptions::json())
            .map_err(RpcError::from_error)?;
        let snapshot = plain_request.clone();

        let plain_response = self
            .implementation
            .call(plain_request)
            .await
            .map_err(|err| err.with_request_snapshot(snapshot.clone()))?;

        let response = match self.response.from_plain(&plain_response) {
            Ok(response) => response,
            Err(err) => {
                return Err(RpcError::internal(err.to_string())
                    .with_request_snapshot(snapshot)
                    .with_response_snapshot(plain_response));
            }
        };
        if let Some(reason) = self.response.verify(&response) {
            return Err(RpcError::internal(reason)
                .with_request_snapshot(snapshot)
                .with_response_snapshot(plain_response));
        }
        Ok(response)
    }

    fn record<T>(&self, result: &HandleResult<T>) {
        if result.is_ok() {
            return;
        }
        if result.transport_code.is_server_error() {
            tracing::warn!(
                service = %self.service,
                method = %self.method,
                status = %result.status,
                transport_code = result.transport_code.as_u16(),
                message = %result.status_message,
                "request failed"
            );
        } else {
            tracing::debug!(
                service = %self.service,
                method = %self.method,
                status = %result.status,
                transport_code = result.transport_code.as_u16(),
                message = %result.status_message,
                "request rejected"
            );
        }
    }
}

impl<Req, Res> fmt::Debug for RequestHandler<Req, Res>
where
    Req: MessageSchema,
    Res: MessageSchema,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestHandler")
            .field("service", &self.service)
            .field("method", &self.method)
            .field("request", &self.request.full_name())
            .field("response", &self.response.full_name())
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "implementation panicked".to_string()
    }
}
