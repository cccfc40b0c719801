//! The route binder.
//!
//! [`GatewayBuilder::build`] walks every requested service, pairs each
//! method with its implementation, resolves its HTTP binding and assembles
//! the immutable route table and OpenAPI document. Construction either
//! succeeds completely or returns a [`BuildError`].

use std::collections::HashSet;
use std::sync::Arc;

use axum::Router;

use crate::binding::{HttpMethod, TransportBinding, params_conflict, route_path};
use crate::config::{DEFAULT_DEFINITION_ENDPOINT, GatewayConfig};
use crate::handler::{Implementation, Implementations, RequestHandler};
use crate::limits::MessageLimits;
use crate::openapi::{DocumentBuilder, Info, OpenApiDocument, Server, Tag};
use crate::schema::{DescriptorPool, ToPlainOptions};
use crate::transport;

/// Errors raised while building a [`Gateway`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("at least one service is required")]
    NoServices,

    #[error("Service \"{0}\" not found")]
    ServiceNotFound(String),

    #[error("Service \"{0}\" is listed more than once")]
    DuplicateService(String),

    #[error("Type \"{0}\" not found")]
    TypeNotFound(String),

    #[error("Method {service}.{method} is not implemented")]
    MissingImplementation { service: String, method: String },

    #[error("duplicate route {method} {path}")]
    DuplicateRoute { method: HttpMethod, path: String },

    #[error("route {path} conflicts with {existing}")]
    ConflictingRoute { path: String, existing: String },

    #[error("route {path} has a path parameter without a name")]
    UnnamedParameter { path: String },
}

/// A method bound to an HTTP route.
#[derive(Clone, Debug)]
pub struct RouteEntry {
    /// Fully-qualified service name.
    pub service: String,
    pub method: String,
    pub binding: TransportBinding,
    /// The registered axum path, prefix included.
    pub route_path: String,
    pub handler: Arc<RequestHandler>,
}

/// An implemented method, reachable over the binary transport.
#[derive(Clone, Debug)]
pub struct MethodEntry {
    pub service: String,
    pub method: String,
    /// `{prefix}/{service}/{method}`.
    pub path: String,
    pub handler: Arc<RequestHandler>,
}

/// Builder for a [`Gateway`].
///
/// # Example
///
/// ```
/// use protogate::prelude::*;
/// use serde_json::{Value, json};
///
/// let pool = DescriptorPool::builder()
///     .message(MessageDescriptor::new("Ping"))
///     .service(
///         ServiceDescriptor::new("test.Health").method(
///             MethodDescriptor::new("Check", "Ping", "Ping")
///                 .option("google.api.http.get", "/health"),
///         ),
///     )
///     .build()
///     .unwrap();
///
/// let gateway = Gateway::builder(pool)
///     .service("test.Health")
///     .implementation("Check", |_req: Value| async move { Ok::<_, RpcError>(json!({})) })
///     .definition_endpoint_default()
///     .build()
///     .unwrap();
///
/// assert_eq!(gateway.routes().len(), 1);
/// let app: axum::Router = gateway.router();
/// # drop(app);
/// ```
#[derive(Debug)]
pub struct GatewayBuilder {
    pool: DescriptorPool,
    services: Vec<String>,
    implementations: Implementations,
    config: GatewayConfig,
}

impl GatewayBuilder {
    pub fn new(pool: DescriptorPool) -> Self {
        Self {
            pool,
            services: Vec::new(),
            implementations: Implementations::new(),
            config: GatewayConfig::default(),
        }
    }

    /// Expose the named service.
    pub fn service<S: Into<String>>(mut self, name: S) -> Self {
        self.services.push(name.into());
        self
    }

    /// Replace the implementation registry.
    pub fn implementations(mut self, implementations: Implementations) -> Self {
        self.implementations = implementations;
        self
    }

    /// Register one implementation.
    pub fn implementation<S, I>(mut self, name: S, implementation: I) -> Self
    where
        S: Into<String>,
        I: Implementation,
    {
        self.implementations.insert(name, implementation);
        self
    }

    /// Prefix every REST and binary route with `prefix`.
    pub fn prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.config.prefix = prefix.into();
        self
    }

    /// Serve the OpenAPI document with `GET` at `path` (relative to the prefix).
    pub fn definition_endpoint<S: Into<String>>(mut self, path: S) -> Self {
        self.config.definition_endpoint = Some(path.into());
        self
    }

    /// Serve the OpenAPI document at `openapi.json`.
    pub fn definition_endpoint_default(self) -> Self {
        self.definition_endpoint(DEFAULT_DEFINITION_ENDPOINT)
    }

    /// Rendering used for REST responses.
    pub fn to_plain_options(mut self, options: ToPlainOptions) -> Self {
        self.config.to_plain_options = options;
        self
    }

    pub fn openapi_info(mut self, info: Info) -> Self {
        self.config.openapi.info = Some(info);
        self
    }

    pub fn server(mut self, server: Server) -> Self {
        self.config.openapi.servers.push(server);
        self
    }

    pub fn tag(mut self, tag: Tag) -> Self {
        self.config.openapi.tags.push(tag);
        self
    }

    /// Describe request and response types under `components.schemas`.
    pub fn include_schemas(mut self, include: bool) -> Self {
        self.config.include_schemas = include;
        self
    }

    pub fn message_limits(mut self, limits: MessageLimits) -> Self {
        self.config.limits = limits;
        self
    }

    /// Bind every method of every requested service.
    pub fn build(self) -> Result<Gateway, BuildError> {
        let Self {
            pool,
            services,
            implementations,
            config,
        } = self;

        if services.is_empty() {
            return Err(BuildError::NoServices);
        }
        let mut listed = HashSet::new();
        for name in &services {
            if !listed.insert(name.as_str()) {
                return Err(BuildError::DuplicateService(name.clone()));
            }
        }

        let mut document =
            DocumentBuilder::new(&config.openapi, &services.join(", "), config.include_schemas);
        let mut routes: Vec<RouteEntry> = Vec::new();
        let mut methods = Vec::new();
        let mut used = HashSet::new();

        let definition_path = config
            .definition_endpoint
            .as_deref()
            .map(|endpoint| route_path(&config.prefix, endpoint));

        for service_name in &services {
            let service = pool
                .lookup_service(service_name)
                .map_err(|_| BuildError::ServiceNotFound(service_name.clone()))?;

            for method in &service.methods {
                let implementation = implementations.get(&method.name).ok_or_else(|| {
                    BuildError::MissingImplementation {
                        service: service.full_name.clone(),
                        method: method.name.clone(),
                    }
                })?;
                used.insert(method.name.as_str());

                let request = pool
                    .lookup_message(&method.request_type)
                    .map_err(|_| BuildError::TypeNotFound(method.request_type.clone()))?;
                let response = pool
                    .lookup_message(&method.response_type)
                    .map_err(|_| BuildError::TypeNotFound(method.response_type.clone()))?;

                let handler = Arc::new(
                    RequestHandler::new(request.clone(), response.clone(), implementation)
                        .with_method(&service.full_name, &method.name),
                );

                methods.push(MethodEntry {
                    service: service.full_name.clone(),
                    method: method.name.clone(),
                    path: route_path(
                        &config.prefix,
                        &format!("{}/{}", service.full_name, method.name),
                    ),
                    handler: handler.clone(),
                });

                let declared = TransportBinding::declared_methods(&method.options);
                if declared.len() > 1 {
                    tracing::warn!(
                        service = %service.full_name,
                        method = %method.name,
                        declared = ?declared.iter().map(|(m, _)| m.as_str()).collect::<Vec<_>>(),
                        "several HTTP bindings declared, using the first by priority"
                    );
                }

                let Some(binding) = TransportBinding::resolve(&method.options) else {
                    tracing::debug!(
                        service = %service.full_name,
                        method = %method.name,
                        "method has no HTTP binding, not exposed over REST"
                    );
                    continue;
                };

                let path = route_path(&config.prefix, &binding.path);
                if binding.path_params().iter().any(|name| name.is_empty()) {
                    return Err(BuildError::UnnamedParameter { path });
                }
                check_route(&routes, definition_path.as_deref(), binding.method, &path)?;

                document.add_operation(service, method, &binding, &request, &response);
                tracing::info!(
                    service = %service.full_name,
                    method = %method.name,
                    http_method = %binding.method,
                    path = %path,
                    "bound route"
                );

                routes.push(RouteEntry {
                    service: service.full_name.clone(),
                    method: method.name.clone(),
                    binding,
                    route_path: path,
                    handler,
                });
            }
        }

        let rest_paths = routes
            .iter()
            .map(|route| route.route_path.as_str())
            .chain(definition_path.as_deref());
        for path in rest_paths {
            if let Some(entry) = methods.iter().find(|entry| entry.path == path) {
                return Err(BuildError::ConflictingRoute {
                    path: path.to_string(),
                    existing: entry.path.clone(),
                });
            }
        }

        for name in implementations.names() {
            if !used.contains(name) {
                tracing::warn!(method = %name, "implementation does not match any service method");
            }
        }

        Ok(Gateway {
            inner: Arc::new(GatewayInner {
                routes,
                methods,
                document: document.finish(),
                definition_path,
                config,
            }),
        })
    }
}

fn check_route(
    routes: &[RouteEntry],
    definition_path: Option<&str>,
    method: HttpMethod,
    path: &str,
) -> Result<(), BuildError> {
    if method == HttpMethod::Get && definition_path == Some(path) {
        return Err(BuildError::DuplicateRoute {
            method,
            path: path.to_string(),
        });
    }
    for existing in routes {
        if existing.route_path == path && existing.binding.method == method {
            return Err(BuildError::DuplicateRoute {
                method,
                path: path.to_string(),
            });
        }
        if params_conflict(&existing.route_path, path) {
            return Err(BuildError::ConflictingRoute {
                path: path.to_string(),
                existing: existing.route_path.clone(),
            });
        }
    }
    Ok(())
}

struct GatewayInner {
    routes: Vec<RouteEntry>,
    methods: Vec<MethodEntry>,
    document: OpenApiDocument,
    definition_path: Option<String>,
    config: GatewayConfig,
}

/// The immutable route table, its OpenAPI document, and the axum routers
/// serving them.
///
/// Cloning is cheap.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

impl Gateway {
    pub fn builder(pool: DescriptorPool) -> GatewayBuilder {
        GatewayBuilder::new(pool)
    }

    /// Methods bound to an HTTP route, in declaration order.
    pub fn routes(&self) -> &[RouteEntry] {
        &self.inner.routes
    }

    /// Every implemented method, in declaration order.
    pub fn methods(&self) -> &[MethodEntry] {
        &self.inner.methods
    }

    pub fn method(&self, service: &str, method: &str) -> Option<&MethodEntry> {
        self.inner
            .methods
            .iter()
            .find(|entry| entry.service == service && entry.method == method)
    }

    pub fn document(&self) -> &OpenApiDocument {
        &self.inner.document
    }

    /// Path the document is served at, if enabled.
    pub fn definition_path(&self) -> Option<&str> {
        self.inner.definition_path.as_deref()
    }

    pub(crate) fn config(&self) -> &GatewayConfig {
        &self.inner.config
    }

    /// JSON/REST routes, plus the definition endpoint when enabled.
    pub fn rest_router<S>(&self) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        transport::rest::router(self)
    }

    /// Binary routes with the "not a service" fallback.
    pub fn binary_router<S>(&self) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        transport::binary::router(self)
    }

    /// Both transports in one router.
    pub fn router<S>(&self) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        self.rest_router().merge(self.binary_router())
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("routes", &self.inner.routes.len())
            .field("methods", &self.inner.methods.len())
            .field("definition_path", &self.inner.definition_path)
            .finish()
    }
}
