//! Provider client tests against a mock provider served on an ephemeral port.

use std::time::Duration;

use axum::extract::Path;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use provider_gateway::{
    BulkMultiItem, ProviderClient, ProviderConfig, ProviderError, SendBulkRequest, SendSingleRequest,
};
use serde_json::{json, Value};

const KEY: &str = "test-key";

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {KEY}"))
        .unwrap_or(false)
}

async fn send_single(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad token"})));
    }
    (
        StatusCode::OK,
        Json(json!({
            "messageId": "m-1",
            "status": "sent",
            "echo": body,
        })),
    )
}

async fn send_bulk(Json(body): Json<Value>) -> Json<Value> {
    let count = body["recipients"].as_array().map(|r| r.len()).unwrap_or(0);
    let ids: Vec<String> = (0..count).map(|i| format!("b-{i}")).collect();
    Json(json!({"messageIds": ids, "status": "queued"}))
}

async fn send_bulk_multi(Json(items): Json<Vec<Value>>) -> Json<Value> {
    let results: Vec<Value> = items
        .iter()
        .enumerate()
        .map(|(i, item)| json!({"recipient": item["recipient"], "messageId": format!("mm-{i}")}))
        .collect();
    Json(json!({"results": results}))
}

async fn status(Path(id): Path<String>) -> Json<Value> {
    if id == "slow" {
        tokio::time::sleep(Duration::from_secs(2)).await;
    }
    Json(json!({"status": "delivered", "deliveredAt": "2025-03-01T10:00:00Z"}))
}

async fn balance() -> (StatusCode, String) {
    (StatusCode::SERVICE_UNAVAILABLE, "maintenance".to_string())
}

async fn spawn_provider() -> String {
    let app = Router::new()
        .route("/sms/sendsingle", post(send_single))
        .route("/sms/sendbulk", post(send_bulk))
        .route("/sms/sendbulkmulti", post(send_bulk_multi))
        .route("/sms/status/:id", get(status))
        .route("/account/balance", get(balance));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn client(base_url: &str) -> ProviderClient {
    let config = ProviderConfig::new(base_url)
        .with_api_key(KEY)
        .with_timeouts(Duration::from_secs(5), Duration::from_millis(300));
    ProviderClient::new(config).unwrap()
}

#[tokio::test]
async fn test_send_single_with_reply_channel() {
    let base = spawn_provider().await;
    let request = SendSingleRequest::new("+14155551234", "hello")
        .with_business(Some("IBS_7".to_string()))
        .with_channel(Some("2".to_string()), Some("5".to_string()));

    let result = client(&base).send_single(&request).await.unwrap();

    assert_eq!(result.message_id.as_deref(), Some("m-1"));
    assert_eq!(result.status.as_deref(), Some("sent"));
    assert_eq!(result.raw["echo"]["usedmodem"], "2");
    assert_eq!(result.raw["echo"]["business"], "IBS_7");
}

#[tokio::test]
async fn test_bulk_and_bulk_multi_ids() {
    let base = spawn_provider().await;
    let client = client(&base);

    let bulk = client
        .send_bulk(&SendBulkRequest::new(
            vec!["+14155551234".to_string(), "+14155555678".to_string()],
            "hi all",
        ))
        .await
        .unwrap();
    assert_eq!(bulk.message_ids, vec!["b-0", "b-1"]);

    let multi = client
        .send_bulk_multi(&[
            BulkMultiItem {
                recipient: "+14155551234".to_string(),
                content: "hi Ann".to_string(),
            },
            BulkMultiItem {
                recipient: "+14155555678".to_string(),
                content: "hi Bob".to_string(),
            },
        ])
        .await
        .unwrap();
    assert_eq!(multi.primary_id().as_deref(), Some("mm-0"));
    assert_eq!(multi.message_ids.len(), 2);
}

#[tokio::test]
async fn test_wrong_key_is_api_error() {
    let base = spawn_provider().await;
    let client = client(&base).with_api_key(Some("other"));

    let err = client
        .send_single(&SendSingleRequest::new("+14155551234", "hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Api { status: 401, .. }));
}

#[tokio::test]
async fn test_non_2xx_keeps_body() {
    let base = spawn_provider().await;
    let err = client(&base).balance().await.unwrap_err();
    match err {
        ProviderError::Api { status, body } => {
            assert_eq!(status, 503);
            assert_eq!(body, "maintenance");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(client(&base).balance().await.unwrap_err().is_degraded());
}

#[tokio::test]
async fn test_status_timeout_is_unreachable() {
    let base = spawn_provider().await;
    let client = client(&base);

    let status = client.status("m-1").await.unwrap();
    assert_eq!(status.status, "delivered");

    let err = client.status("slow").await.unwrap_err();
    assert!(matches!(err, ProviderError::Unreachable(_)));
}

#[tokio::test]
async fn test_connection_refused_is_unreachable() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(&format!("http://{addr}"))
        .send_single(&SendSingleRequest::new("+14155551234", "hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Unreachable(_)));
}

#[tokio::test]
async fn test_missing_key() {
    let client = ProviderClient::new(ProviderConfig::new("http://127.0.0.1:1")).unwrap();
    let err = client.balance().await.unwrap_err();
    assert!(matches!(err, ProviderError::MissingApiKey));
}
