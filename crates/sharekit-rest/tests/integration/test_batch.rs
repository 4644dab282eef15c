//! `$batch` packing in `RestTransport::send_batch`

use serde_json::json;
use sharekit_core::domain::{OperationKind, Payload, PropertyBag};
use sharekit_core::ports::IBatchTransport;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockBuilder, ResponseTemplate};

use crate::common::{self, api, batch_response, request, BATCH_CONTENT_TYPE};

fn batch_route() -> MockBuilder {
    Mock::given(method("POST")).and(path(api("_api/$batch")))
}

fn batch_reply(parts: &[(u16, Option<serde_json::Value>)]) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(batch_response(parts), BATCH_CONTENT_TYPE)
}

fn batch_mock(parts: &[(u16, Option<serde_json::Value>)]) -> Mock {
    batch_route().respond_with(batch_reply(parts))
}

#[tokio::test]
async fn test_requests_share_one_post() {
    let (server, transport) = common::setup().await;
    batch_route()
        .and(body_string_contains("GET "))
        .and(body_string_contains("POST "))
        .respond_with(batch_reply(&[
            (200, Some(json!({ "Title": "Dev" }))),
            (201, Some(json!({ "Id": "b5e8d1a0-0000-4000-8000-000000000001", "Title": "Docs" }))),
        ]))
        .expect(1)
        .mount(&server)
        .await;

    let mut add = request(2, OperationKind::Add, "_api/web/lists");
    add.payload = Payload::Properties(PropertyBag::new().with("Title", "Docs"));
    let results = transport
        .send_batch(&[request(1, OperationKind::Get, "_api/web"), add])
        .await;

    assert_eq!(results.len(), 2);
    let first = results[0].as_ref().unwrap();
    let second = results[1].as_ref().unwrap();
    assert_eq!(first.correlation_id.value(), 1);
    assert_eq!(second.correlation_id.value(), 2);
    assert_eq!(second.status, 201);
    assert_eq!(second.body.get("Title").and_then(|v| v.as_str()), Some("Docs"));
}

#[tokio::test]
async fn test_first_fault_ends_the_results() {
    let (server, transport) = common::setup().await;
    batch_mock(&[
        (200, Some(json!({ "Title": "Dev" }))),
        (404, Some(common::odata_error("List does not exist."))),
        (200, Some(json!({ "Title": "Never read" }))),
    ])
    .mount(&server)
    .await;

    let results = transport
        .send_batch(&[
            request(1, OperationKind::Get, "_api/web"),
            request(2, OperationKind::Get, "_api/web/lists/getbytitle('Gone')"),
            request(3, OperationKind::Get, "_api/web"),
        ])
        .await;

    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    let fault = results[1].as_ref().unwrap_err();
    assert!(fault.is_not_found());
    assert_eq!(fault.message, "Not found: List does not exist.");
}

#[tokio::test]
async fn test_chunks_respect_max_batch_size() {
    let (server, transport) = common::setup().await;
    let transport = transport.with_max_batch_size(2);
    batch_mock(&[(200, Some(json!({}))), (200, Some(json!({})))])
        .expect(2)
        .mount(&server)
        .await;

    let requests: Vec<_> = (1..=4)
        .map(|seq| request(seq, OperationKind::Get, "_api/web"))
        .collect();
    let results = transport.send_batch(&requests).await;

    assert_eq!(results.len(), 4);
    assert!(results.iter().all(Result::is_ok));
    let ids: Vec<u64> = results
        .iter()
        .map(|r| r.as_ref().unwrap().correlation_id.value())
        .collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn test_binary_uploads_leave_the_batch() {
    let (server, transport) = common::setup().await;
    let add_path = "_api/web/sitecollectionappcatalog/Add(overwrite=false,url='a.sppkg')";
    batch_mock(&[(200, Some(json!({}))), (200, Some(json!({})))])
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(api(add_path)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Name": "a.sppkg" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(api("_api/web")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Title": "Dev" })))
        .expect(1)
        .mount(&server)
        .await;

    let mut upload = request(3, OperationKind::Add, add_path);
    upload.payload = Payload::Binary(vec![1, 2, 3]);
    let results = transport
        .send_batch(&[
            request(1, OperationKind::Get, "_api/web"),
            request(2, OperationKind::Get, "_api/web"),
            upload,
            request(4, OperationKind::Get, "_api/web"),
        ])
        .await;

    assert_eq!(results.len(), 4);
    assert!(results.iter().all(Result::is_ok));
}

#[tokio::test]
async fn test_disabled_batch_endpoint_sends_one_by_one() {
    let (server, transport) = common::setup().await;
    let transport = transport.with_batch_endpoint(false);
    batch_mock(&[]).expect(0).mount(&server).await;
    Mock::given(method("GET"))
        .and(path(api("_api/web")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Title": "Dev" })))
        .expect(2)
        .mount(&server)
        .await;

    let results = transport
        .send_batch(&[
            request(1, OperationKind::Get, "_api/web"),
            request(2, OperationKind::Get, "_api/web"),
        ])
        .await;

    assert_eq!(results.len(), 2);
}

#[tokio::test]
async fn test_failed_post_faults_the_chunk() {
    let (server, transport) = common::setup().await;
    Mock::given(method("POST"))
        .and(path(api("_api/$batch")))
        .respond_with(ResponseTemplate::new(500).set_body_json(common::odata_error("Unexpected")))
        .mount(&server)
        .await;

    let results = transport
        .send_batch(&[
            request(1, OperationKind::Get, "_api/web"),
            request(2, OperationKind::Get, "_api/web"),
        ])
        .await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].as_ref().unwrap_err().status, Some(500));
}

#[tokio::test]
async fn test_short_response_is_passed_through() {
    let (server, transport) = common::setup().await;
    batch_mock(&[(200, Some(json!({ "Title": "Dev" })))])
        .mount(&server)
        .await;

    let results = transport
        .send_batch(&[
            request(1, OperationKind::Get, "_api/web"),
            request(2, OperationKind::Get, "_api/web"),
        ])
        .await;

    // The engine turns the missing part into a count mismatch
    assert_eq!(results.len(), 1);
    assert!(results[0].is_ok());
}
