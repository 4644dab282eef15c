//! Shared helpers for the REST integration tests
//!
//! Every test gets its own mock server; the site lives under `/sites/dev`.

use std::sync::Arc;

use serde_json::Value;
use sharekit_core::domain::{OperationKind, Payload, PropertySelector, RequestId};
use sharekit_core::ports::TransportRequest;
use sharekit_core::Context;
use sharekit_rest::{RestTransport, SharePointClient};
use wiremock::MockServer;

pub const SITE_PATH: &str = "/sites/dev";
pub const TOKEN: &str = "test-access-token";

/// Starts a mock server and a transport pointing at its `/sites/dev` site
pub async fn setup() -> (MockServer, RestTransport) {
    let server = MockServer::start().await;
    let transport = transport_for(&server);
    (server, transport)
}

pub fn transport_for(server: &MockServer) -> RestTransport {
    let site = format!("{}{SITE_PATH}", server.uri());
    let client = SharePointClient::new(&site, TOKEN).expect("valid mock site url");
    RestTransport::new(client)
}

/// Engine context over a REST transport
#[allow(dead_code)]
pub fn context(transport: RestTransport) -> Context {
    Context::new(Arc::new(transport))
}

/// Absolute path of a site-relative API path, as wiremock sees it
pub fn api(path: &str) -> String {
    format!("{SITE_PATH}/{path}")
}

pub fn request(seq: u64, kind: OperationKind, path: &str) -> TransportRequest {
    TransportRequest {
        correlation_id: RequestId::new(seq),
        kind,
        path: path.to_string(),
        selector: PropertySelector::new(),
        payload: Payload::None,
    }
}

/// Builds a `$batch` response body with one top-level part per entry
///
/// The content type to answer with is `multipart/mixed; boundary=batchresponse_test`.
#[allow(dead_code)]
pub fn batch_response(parts: &[(u16, Option<Value>)]) -> String {
    let mut body = String::new();
    for (status, json) in parts {
        body.push_str("--batchresponse_test\r\n");
        body.push_str("Content-Type: application/http\r\n");
        body.push_str("Content-Transfer-Encoding: binary\r\n\r\n");
        body.push_str(&format!("HTTP/1.1 {status} {}\r\n", reason(*status)));
        match json {
            Some(json) => {
                body.push_str("CONTENT-TYPE: application/json;odata=nometadata;charset=utf-8\r\n\r\n");
                body.push_str(&json.to_string());
                body.push_str("\r\n");
            }
            None => body.push_str("\r\n\r\n"),
        }
    }
    body.push_str("--batchresponse_test--\r\n");
    body
}

pub const BATCH_CONTENT_TYPE: &str = "multipart/mixed; boundary=batchresponse_test";

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        404 => "Not Found",
        _ => "Error",
    }
}

/// OData error body as SharePoint sends it with `nometadata`
#[allow(dead_code)]
pub fn odata_error(message: &str) -> Value {
    serde_json::json!({
        "odata.error": {
            "code": "-2130575322, Microsoft.SharePoint.SPException",
            "message": { "lang": "en-US", "value": message }
        }
    })
}
