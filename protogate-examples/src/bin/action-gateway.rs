//! A gateway serving `action.ActionService` over JSON/REST and binary HTTP.
//!
//! Run with: cargo run --bin action-gateway
//! Set RUST_LOG=protogate=debug to see rejected requests.

use protogate::prelude::*;
use protogate_examples::{action_pool, server_addr};
use serde_json::{Value, json};

async fn action(request: Value) -> Result<Value, RpcError> {
    let random = request["random"].as_str().unwrap_or_default();
    let number: u32 = random
        .parse()
        .map_err(|_| RpcError::invalid_argument(format!("\"{random}\" is not a number")))?;
    Ok(json!({ "randomNumber": number, "randomString": random }))
}

async fn create_action(request: Value) -> Result<Value, RpcError> {
    let number = request["random"].as_u64().unwrap_or_default();
    Ok(json!({
        "randomNumber": number,
        "randomString": number.to_string(),
        "tags": request["tags"],
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let gateway = Gateway::builder(action_pool()?)
        .service("action.ActionService")
        .implementation("Action", action)
        .implementation("CreateAction", create_action)
        .definition_endpoint_default()
        .openapi_info(Info::new("Action API", "1.0.0"))
        .tag(Tag::new("ActionService"))
        .include_schemas(true)
        .build()?;

    let addr = server_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    println!("Server listening on http://{addr}");
    for route in gateway.routes() {
        println!("  {} {}", route.binding.method, route.route_path);
    }
    println!();
    println!("Test with:");
    println!("  curl http://localhost:{}/v1/action/42", addr.port());
    println!("  curl -X POST http://localhost:{}/v1/action \\", addr.port());
    println!("    -H 'Content-Type: application/json' \\");
    println!("    -d '{{\"random\": 7, \"tags\": [\"a\"]}}'");
    println!("  curl http://localhost:{}/openapi.json", addr.port());

    let app: axum::Router = gateway.router();
    axum::serve(listener, app).await?;
    Ok(())
}
