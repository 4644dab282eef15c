//! Single requests through `RestTransport::send`

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use sharekit_core::domain::{OperationKind, Payload, PropertyBag, PropertySelector};
use sharekit_core::ports::IBatchTransport;
use sharekit_rest::rate_limit::{AdaptiveRateLimiter, RateLimitConfig};
use sharekit_rest::translate::ACCEPT_JSON;
use sharekit_rest::{RestTransport, SharePointClient};
use wiremock::matchers::{body_bytes, body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{self, api, request, SITE_PATH, TOKEN};

#[tokio::test]
async fn test_get_sends_auth_and_projection() {
    let (server, transport) = common::setup().await;
    Mock::given(method("GET"))
        .and(path(api("_api/web")))
        .and(query_param("$select", "Title"))
        .and(header("Authorization", format!("Bearer {TOKEN}").as_str()))
        .and(header("Accept", ACCEPT_JSON))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "odata.metadata": "https://contoso.sharepoint.com/_api/$metadata#SP.ApiData.Webs/@Element",
            "Title": "Dev"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut req = request(7, OperationKind::Get, "_api/web");
    req.selector = PropertySelector::parse(["Title"]).unwrap();
    let response = transport.send(&req).await.expect("send failed");

    assert_eq!(response.correlation_id, req.correlation_id);
    assert_eq!(response.status, 200);
    assert_eq!(response.body.get("Title").and_then(|v| v.as_str()), Some("Dev"));
    assert!(response.body.get("odata.metadata").is_none());
}

#[tokio::test]
async fn test_not_found_becomes_fault_with_service_message() {
    let (server, transport) = common::setup().await;
    Mock::given(method("GET"))
        .and(path(api("_api/web/lists/getbytitle('Missing')")))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(common::odata_error("List 'Missing' does not exist at site with URL 'x'.")),
        )
        .mount(&server)
        .await;

    let fault = transport
        .send(&request(1, OperationKind::Get, "_api/web/lists/getbytitle('Missing')"))
        .await
        .unwrap_err();

    assert!(fault.is_not_found());
    assert!(fault.message.contains("List 'Missing' does not exist"));
}

#[tokio::test]
async fn test_update_tunnels_merge_and_accepts_no_content() {
    let (server, transport) = common::setup().await;
    Mock::given(method("POST"))
        .and(path(api("_api/web/lists(guid'b5e8d1a0-0000-4000-8000-000000000001')")))
        .and(header("X-HTTP-Method", "MERGE"))
        .and(header("IF-MATCH", "*"))
        .and(body_json(json!({ "Title": "Renamed" })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let mut req = request(
        2,
        OperationKind::Update,
        "_api/web/lists(guid'b5e8d1a0-0000-4000-8000-000000000001')",
    );
    req.payload = Payload::Properties(PropertyBag::new().with("Title", "Renamed"));
    let response = transport.send(&req).await.expect("update failed");

    assert_eq!(response.status, 204);
    assert!(response.body.is_empty());
}

#[tokio::test]
async fn test_binary_upload_sends_raw_bytes() {
    let (server, transport) = common::setup().await;
    let add_path = "_api/web/sitecollectionappcatalog/Add(overwrite=true,url='app.sppkg')";
    Mock::given(method("POST"))
        .and(path(api(add_path)))
        .and(header("Content-Type", "application/octet-stream"))
        .and(body_bytes(b"PK\x03\x04".to_vec()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "UniqueId": "3f1b2a4c-5d6e-4f70-8a9b-0c1d2e3f4a5b",
            "Name": "app.sppkg"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut req = request(3, OperationKind::Add, add_path);
    req.payload = Payload::Binary(b"PK\x03\x04".to_vec());
    let response = transport.send(&req).await.expect("upload failed");

    assert_eq!(response.body.get("Name").and_then(|v| v.as_str()), Some("app.sppkg"));
}

#[tokio::test]
async fn test_throttled_request_is_retried() {
    let (server, transport) = common::setup().await;
    Mock::given(method("GET"))
        .and(path(api("_api/web")))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(api("_api/web")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Title": "Dev" })))
        .mount(&server)
        .await;

    let response = transport
        .send(&request(1, OperationKind::Get, "_api/web"))
        .await
        .expect("retry did not recover");

    assert_eq!(response.status, 200);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_retry_limit_reports_throttling() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(api("_api/web")))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let limiter = AdaptiveRateLimiter::new(RateLimitConfig {
        max_retries: 1,
        default_retry_after: Duration::ZERO,
        ..RateLimitConfig::default()
    });
    let client = SharePointClient::new(&format!("{}{SITE_PATH}", server.uri()), TOKEN)
        .unwrap()
        .with_rate_limiter(Arc::new(limiter));
    let transport = RestTransport::new(client);

    let fault = transport
        .send(&request(1, OperationKind::Get, "_api/web"))
        .await
        .unwrap_err();

    assert_eq!(fault.status, Some(429));
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_unreachable_server_is_network_fault() {
    let client = SharePointClient::new("http://127.0.0.1:1/sites/dev", TOKEN).unwrap();
    let transport = RestTransport::new(client);

    let fault = transport
        .send(&request(1, OperationKind::Get, "_api/web"))
        .await
        .unwrap_err();

    assert_eq!(fault.status, None);
}
