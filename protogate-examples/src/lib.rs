use std::net::SocketAddr;

use protogate::prelude::*;

/// Returns the server address from PORT env var, defaulting to 3000.
pub fn server_addr() -> anyhow::Result<SocketAddr> {
    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".into());
    Ok(format!("0.0.0.0:{port}").parse()?)
}

/// Descriptors for the `action.ActionService` used by the examples.
pub fn action_pool() -> Result<DescriptorPool, protogate::SchemaError> {
    DescriptorPool::builder()
        .message(
            MessageDescriptor::new("action.ActionRequest")
                .field(FieldDescriptor::new("random", 1, FieldType::String)),
        )
        .message(
            MessageDescriptor::new("action.CreateActionRequest")
                .field(FieldDescriptor::new("random", 1, FieldType::UInt32))
                .field(
                    FieldDescriptor::new("tags", 2, FieldType::String)
                        .repeated()
                        .with_comment("Free-form labels echoed back."),
                ),
        )
        .message(
            MessageDescriptor::new("action.ActionResponse")
                .with_comment("The outcome of an action.")
                .field(FieldDescriptor::new("randomNumber", 1, FieldType::UInt32))
                .field(FieldDescriptor::new("randomString", 2, FieldType::String))
                .field(FieldDescriptor::new("tags", 3, FieldType::String).repeated()),
        )
        .service(
            ServiceDescriptor::new("action.ActionService")
                .with_comment("Echoes numbers back in two shapes.")
                .method(
                    MethodDescriptor::new("Action", "action.ActionRequest", "action.ActionResponse")
                        .option("google.api.http.get", "/v1/action/:random")
                        .with_comment("Parse the path segment as a number."),
                )
                .method(
                    MethodDescriptor::new(
                        "CreateAction",
                        "action.CreateActionRequest",
                        "action.ActionResponse",
                    )
                    .option("google.api.http.post", "/v1/action")
                    .option("google.api.http.body", "*")
                    .with_comment("Create an action from a JSON body."),
                ),
        )
        .build()
}
