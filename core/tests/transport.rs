//! `ReqwestTransport` wire behavior, checked against a wiremock server.

mod common;

use std::sync::Arc;
use std::time::Duration;

use api_core::{
    ApiContext, ErrorKind, FileUpload, HttpClient, HttpRequest, MemoryTokenStore,
    RequestOptions, RetryPolicy, ServiceConfig, ServiceName, ServicesConfig, TokenPair,
    TokenStore,
};
use common::services_at;
use serde_json::json;
use wiremock::matchers::{header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn ok_envelope(data: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "code": 200,
        "message": "ok",
        "data": data,
        "success": true,
    }))
}

fn client(server: &MockServer, tokens: Arc<MemoryTokenStore>) -> HttpClient {
    ApiContext::builder()
        .services(services_at(&server.uri()))
        .retry(RetryPolicy::new(3, Duration::from_millis(10)))
        .tokens(tokens)
        .build()
        .unwrap()
        .client(ServiceName::File)
        .unwrap()
}

#[tokio::test]
async fn get_carries_token_request_id_and_cache_buster() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files"))
        .and(query_param("page", "3"))
        .and(header("authorization", "Bearer t1"))
        .and(header_exists("x-request-id"))
        .respond_with(ok_envelope(json!(["a"])))
        .expect(1)
        .mount(&server)
        .await;

    let tokens = Arc::new(MemoryTokenStore::new());
    tokens
        .set_pair(&TokenPair {
            access_token: "t1".to_string(),
            refresh_token: "r1".to_string(),
        })
        .unwrap();
    let http = client(&server, tokens);

    let names = http
        .get::<Vec<String>, _>("/files", &json!({ "page": 3 }))
        .await
        .unwrap()
        .data;
    assert_eq!(names, vec!["a"]);

    let received = server.received_requests().await.unwrap();
    let cache_buster = received[0]
        .url
        .query_pairs()
        .find(|(name, _)| name == "_t")
        .map(|(_, value)| value.into_owned());
    assert!(cache_buster.is_some_and(|t| t.parse::<i64>().is_ok()));
}

#[tokio::test]
async fn post_sends_json_without_cache_buster() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/folders"))
        .and(header("content-type", "application/json;charset=UTF-8"))
        .respond_with(ok_envelope(json!({ "name": "docs", "path": "/docs" })))
        .mount(&server)
        .await;

    let http = client(&server, Arc::new(MemoryTokenStore::new()));
    http.post::<serde_json::Value, _>("/folders", &json!({ "name": "docs" }))
        .await
        .unwrap();

    let received = server.received_requests().await.unwrap();
    let request = &received[0];
    assert!(request.url.query().is_none());
    assert!(request.headers.get("authorization").is_none());
    let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(body, json!({ "name": "docs" }));
}

#[tokio::test]
async fn json_bodies_are_typed_without_default_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/items"))
        .and(header("content-type", "application/json"))
        .respond_with(ok_envelope(json!({ "id": 1 })))
        .expect(1)
        .mount(&server)
        .await;

    let ctx = ApiContext::builder()
        .services(
            ServicesConfig::empty().with_service(ServiceName::Main, ServiceConfig::new(server.uri())),
        )
        .build()
        .unwrap();
    let created: serde_json::Value = ctx
        .crud()
        .unwrap()
        .create("/items", &json!({ "a": 1 }))
        .await
        .unwrap();

    assert_eq!(created, json!({ "id": 1 }));
}

#[tokio::test]
async fn upload_lets_reqwest_write_the_boundary() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(ok_envelope(json!({ "url": "/u/1", "filename": "a.txt", "size": 3 })))
        .mount(&server)
        .await;

    let http = client(&server, Arc::new(MemoryTokenStore::new()));
    http.upload::<serde_json::Value>("/upload", FileUpload::new("a.txt", b"abc".to_vec()))
        .await
        .unwrap();

    let received = server.received_requests().await.unwrap();
    let content_type = received[0]
        .headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    assert!(
        content_type.starts_with("multipart/form-data; boundary="),
        "{content_type}"
    );
    let body = String::from_utf8_lossy(&received[0].body);
    assert!(body.contains(r#"name="file"; filename="a.txt""#));
    assert!(body.contains("abc"));
}

#[tokio::test]
async fn service_unavailable_is_retried_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/f1"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/f1"))
        .respond_with(ok_envelope(json!("done")))
        .mount(&server)
        .await;

    let http = client(&server, Arc::new(MemoryTokenStore::new()));
    let data = http.get::<String, _>("/files/f1", &()).await.unwrap().data;

    assert_eq!(data, "done");
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn slow_responses_time_out_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ok_envelope(json!(null)).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let http = client(&server, Arc::new(MemoryTokenStore::new()));
    let request = HttpRequest::get("/slow").options(RequestOptions {
        timeout: Some(Duration::from_millis(50)),
        show_error: false,
        ..RequestOptions::default()
    });
    let err = http.request::<()>(request).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn business_code_in_a_200_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 4003,
            "message": "",
            "data": null,
        })))
        .mount(&server)
        .await;

    let http = client(&server, Arc::new(MemoryTokenStore::new()));
    let err = http
        .delete::<serde_json::Value, _>("/files/f1", &())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Business(4003));
    assert_eq!(err.message(), "request failed");
}
