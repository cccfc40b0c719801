//! Gateway configuration - set once through [`GatewayBuilder`](crate::GatewayBuilder),
//! read-only afterwards.

use crate::limits::MessageLimits;
use crate::openapi::OpenApiConfig;
use crate::schema::ToPlainOptions;

/// Path used by [`definition_endpoint_default`].
///
/// [`definition_endpoint_default`]: crate::GatewayBuilder::definition_endpoint_default
pub const DEFAULT_DEFINITION_ENDPOINT: &str = "openapi.json";

#[derive(Clone, Debug, Default)]
pub(crate) struct GatewayConfig {
    /// Prepended to every REST and binary route.
    pub prefix: String,
    /// Where the OpenAPI document is served, if anywhere.
    pub definition_endpoint: Option<String>,
    /// Rendering of REST responses.
    pub to_plain_options: ToPlainOptions,
    pub openapi: OpenApiConfig,
    /// Describe message types under `components.schemas`.
    pub include_schemas: bool,
    pub limits: MessageLimits,
}
