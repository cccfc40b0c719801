use axum::Router;
use axum::body::{Body, Bytes};
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use prost::Message;
use protogate::prelude::*;
use protogate::{MessageLimits, protogate_core::wrap_envelope};
use serde_json::{Value, json};
use tower::ServiceExt;

#[derive(Clone, PartialEq, prost::Message)]
struct CreateActionRequest {
    #[prost(uint32, tag = "1")]
    random: u32,
}

#[derive(Clone, PartialEq, prost::Message)]
struct ActionResponse {
    #[prost(uint32, tag = "1")]
    random_number: u32,
    #[prost(string, tag = "2")]
    random_string: String,
}

fn pool() -> DescriptorPool {
    DescriptorPool::builder()
        .message(
            MessageDescriptor::new("test.ActionRequest")
                .field(FieldDescriptor::new("random", 1, FieldType::String)),
        )
        .message(
            MessageDescriptor::new("test.CreateActionRequest")
                .field(FieldDescriptor::new("random", 1, FieldType::UInt32)),
        )
        .message(
            MessageDescriptor::new("test.ActionResponse")
                .field(FieldDescriptor::new("randomNumber", 1, FieldType::UInt32))
                .field(FieldDescriptor::new("randomString", 2, FieldType::String)),
        )
        .message(
            MessageDescriptor::new("test.Payload")
                .field(FieldDescriptor::new("random", 1, FieldType::UInt32)),
        )
        .message(
            MessageDescriptor::new("test.WrapRequest")
                .field(FieldDescriptor::new(
                    "payload",
                    1,
                    FieldType::Message("test.Payload".into()),
                ))
                .field(FieldDescriptor::new("note", 2, FieldType::String)),
        )
        .service(
            ServiceDescriptor::new("test.TestService")
                .method(
                    MethodDescriptor::new("Action", "test.ActionRequest", "test.ActionResponse")
                        .option("google.api.http.get", "/v1/action/:random")
                        .with_comment("Run an action."),
                )
                .method(
                    MethodDescriptor::new(
                        "CreateAction",
                        "test.CreateActionRequest",
                        "test.ActionResponse",
                    )
                    .option("google.api.http.post", "/v1/action")
                    .option("google.api.http.body", "*"),
                )
                .method(
                    MethodDescriptor::new("Wrap", "test.WrapRequest", "test.WrapRequest")
                        .option("google.api.http.post", "/v1/wrap")
                        .option("google.api.http.body", "payload"),
                ),
        )
        .build()
        .expect("valid pool")
}

async fn action(request: Value) -> Result<Value, RpcError> {
    match request["random"].as_str().unwrap_or_default() {
        "missing" => Err(RpcError::not_found("no such action")),
        "bad" => Ok(json!({ "randomNumber": "oops" })),
        "panic" => panic!("action exploded"),
        random => {
            let number: u32 = random
                .parse()
                .map_err(|_| RpcError::invalid_argument("random must be numeric"))?;
            Ok(json!({ "randomNumber": number, "randomString": random }))
        }
    }
}

async fn create_action(request: Value) -> Result<Value, RpcError> {
    let number = request["random"].as_u64().unwrap_or_default();
    Ok(json!({ "randomNumber": number, "randomString": number.to_string() }))
}

async fn wrap(request: Value) -> Result<Value, RpcError> {
    Ok(request)
}

fn builder() -> GatewayBuilder {
    Gateway::builder(pool())
        .service("test.TestService")
        .implementation("Action", action)
        .implementation("CreateAction", create_action)
        .implementation("Wrap", wrap)
        .definition_endpoint_default()
}

fn app() -> Router {
    builder().build().expect("gateway").router()
}

async fn body_bytes(response: axum::response::Response) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn header_str<'a>(response: &'a axum::response::Response, name: &str) -> &'a str {
    response.headers()[name].to_str().unwrap()
}

#[tokio::test]
async fn get_with_path_param() -> anyhow::Result<()> {
    let request = Request::get("/v1/action/42").body(Body::empty())?;
    let response = app().oneshot(request).await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, "Status"), "0");
    assert_eq!(header_str(&response, "Status-Message"), "OK");
    assert_eq!(
        header_str(&response, header::CONTENT_TYPE.as_str()),
        "application/json"
    );
    assert_eq!(
        body_bytes(response).await,
        r#"{"randomNumber":42,"randomString":"42"}"#
    );
    Ok(())
}

#[tokio::test]
async fn post_merges_body() -> anyhow::Result<()> {
    let request = Request::post("/v1/action")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"random": 42}"#))?;
    let response = app().oneshot(request).await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, "status"), "0");
    assert_eq!(
        body_bytes(response).await,
        r#"{"randomNumber":42,"randomString":"42"}"#
    );
    Ok(())
}

#[tokio::test]
async fn body_lands_in_named_field() -> anyhow::Result<()> {
    let request = Request::post("/v1/wrap?note=hi")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"random": 5}"#))?;
    let response = app().oneshot(request).await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&body_bytes(response).await)?;
    assert_eq!(body, json!({ "payload": { "random": 5 }, "note": "hi" }));
    Ok(())
}

#[tokio::test]
async fn query_string_fills_request() -> anyhow::Result<()> {
    let request = Request::post("/v1/action?random=7").body(Body::empty())?;
    let response = app().oneshot(request).await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&body_bytes(response).await)?;
    assert_eq!(body, json!({ "randomNumber": 7, "randomString": "7" }));
    Ok(())
}

#[tokio::test]
async fn invalid_request_never_reaches_implementation() -> anyhow::Result<()> {
    let request = Request::post("/v1/action")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"random": "x"}"#))?;
    let response = app().oneshot(request).await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(header_str(&response, "status"), "3");
    assert_eq!(
        header_str(&response, "status-message"),
        "random: integer expected"
    );
    let body: Value = serde_json::from_slice(&body_bytes(response).await)?;
    assert_eq!(
        body,
        json!({ "error": "InvalidArgument", "message": "random: integer expected" })
    );
    Ok(())
}

#[tokio::test]
async fn malformed_body_is_rejected() -> anyhow::Result<()> {
    let request = Request::post("/v1/action")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{nope"))?;
    let response = app().oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(header_str(&response, "status"), "3");

    let request = Request::post("/v1/action")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("[1, 2]"))?;
    let response = app().oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(header_str(&response, "status"), "3");
    Ok(())
}

#[tokio::test]
async fn implementation_errors_keep_their_status() -> anyhow::Result<()> {
    let response = app()
        .oneshot(Request::get("/v1/action/missing").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(header_str(&response, "status"), "5");
    assert_eq!(header_str(&response, "status-message"), "no such action");

    let response = app()
        .oneshot(Request::get("/v1/action/abc").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(header_str(&response, "status-message"), "random must be numeric");
    Ok(())
}

#[tokio::test]
async fn invalid_response_is_internal() -> anyhow::Result<()> {
    let response = app()
        .oneshot(Request::get("/v1/action/bad").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(header_str(&response, "status"), "13");
    assert_eq!(
        header_str(&response, "status-message"),
        "randomNumber: integer expected"
    );
    Ok(())
}

#[tokio::test]
async fn panicking_implementation_is_contained() -> anyhow::Result<()> {
    let response = app()
        .oneshot(Request::get("/v1/action/panic").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(header_str(&response, "status"), "2");
    assert_eq!(header_str(&response, "status-message"), "action exploded");
    Ok(())
}

#[tokio::test]
async fn binary_transport() -> anyhow::Result<()> {
    let payload = CreateActionRequest { random: 42 }.encode_to_vec();
    let request = Request::post("/test.TestService/CreateAction")
        .header(header::CONTENT_TYPE, "application/x-protobuf")
        .body(Body::from(payload))?;
    let response = app().oneshot(request).await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, "status"), "0");
    assert_eq!(
        header_str(&response, header::CONTENT_TYPE.as_str()),
        "application/x-protobuf"
    );
    let decoded = ActionResponse::decode(body_bytes(response).await)?;
    assert_eq!(
        decoded,
        ActionResponse {
            random_number: 42,
            random_string: "42".into()
        }
    );
    Ok(())
}

#[tokio::test]
async fn binary_transport_enveloped() -> anyhow::Result<()> {
    let payload = wrap_envelope(&CreateActionRequest { random: 7 }.encode_to_vec());
    let request = Request::post("/test.TestService/CreateAction")
        .header(header::CONTENT_TYPE, "application/grpc-web+proto")
        .body(Body::from(payload))?;
    let response = app().oneshot(request).await?;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_bytes(response).await;
    assert_eq!(body[0], 0);
    assert_eq!(u32::from_be_bytes([body[1], body[2], body[3], body[4]]) as usize, body.len() - 5);
    let decoded = ActionResponse::decode(body.slice(5..))?;
    assert_eq!(decoded.random_number, 7);
    Ok(())
}

#[tokio::test]
async fn binary_transport_unsupported_content_type() -> anyhow::Result<()> {
    let request = Request::post("/test.TestService/CreateAction")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))?;
    let response = app().oneshot(request).await?;

    assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
    assert_eq!(header_str(&response, "status"), "12");
    assert_eq!(
        header_str(&response, "status-message"),
        r#"Unimplemented "Content-Type" parser for "application/json""#
    );
    assert!(body_bytes(response).await.is_empty());
    Ok(())
}

#[tokio::test]
async fn binary_transport_rejects_garbage() -> anyhow::Result<()> {
    let request = Request::post("/test.TestService/Action")
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .body(Body::from(vec![0x0a, 0x05, b'a']))?;
    let response = app().oneshot(request).await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(header_str(&response, "status"), "3");
    assert!(body_bytes(response).await.is_empty());
    Ok(())
}

#[tokio::test]
async fn fallback_reports_invalid_requests() -> anyhow::Result<()> {
    let response = app()
        .oneshot(Request::post("/test.TestService/Nope").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(header_str(&response, "status"), "5");
    assert_eq!(
        header_str(&response, "status-message"),
        "Invalid HTTP request: Path /test.TestService/Nope is not a service"
    );

    let response = app()
        .oneshot(Request::get("/test.TestService/CreateAction").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(header_str(&response, "status"), "5");
    assert_eq!(
        header_str(&response, "status-message"),
        "Invalid HTTP request: Method GET is not allowed"
    );
    Ok(())
}

#[tokio::test]
async fn body_limit_is_enforced() -> anyhow::Result<()> {
    let app = builder()
        .message_limits(MessageLimits::new(8))
        .build()?
        .router();
    let request = Request::post("/v1/action")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"random": 42, "padding": "xxxxxxxx"}"#))?;
    let response = app.oneshot(request).await?;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(header_str(&response, "status"), "8");
    Ok(())
}

#[tokio::test]
async fn definition_endpoint_serves_document() -> anyhow::Result<()> {
    let response = app()
        .oneshot(Request::get("/openapi.json").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let document: Value = serde_json::from_slice(&body_bytes(response).await)?;
    assert_eq!(document["openapi"], "3.0.0");
    assert_eq!(
        document["paths"]["/v1/action/:random"]["get"]["operationId"],
        "test.TestService.Action"
    );
    assert_eq!(
        document["paths"]["/v1/action/:random"]["get"]["description"],
        "Run an action."
    );
    assert_eq!(
        document["paths"]["/v1/action/:random"]["get"]["parameters"][0]["name"],
        "random"
    );
    assert!(document["paths"]["/v1/action"]["post"].is_object());
    Ok(())
}

#[tokio::test]
async fn prefix_applies_to_both_transports() -> anyhow::Result<()> {
    let app = builder().prefix("/api").build()?.router();

    let response = app
        .clone()
        .oneshot(Request::get("/api/v1/action/3").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let request = Request::post("/api/test.TestService/CreateAction")
        .header(header::CONTENT_TYPE, "application/protobuf")
        .body(Body::from(CreateActionRequest { random: 3 }.encode_to_vec()))?;
    let response = app.clone().oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(Request::get("/api/openapi.json").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}
