//! Mapping between transport requests and SharePoint REST calls
//!
//! | Operation | HTTP                                             |
//! |-----------|--------------------------------------------------|
//! | Get       | `GET path?$select=..&$expand=..`                 |
//! | Add       | `POST path` with a JSON or binary body           |
//! | Update    | `POST path`, `X-HTTP-Method: MERGE`, `IF-MATCH: *` |
//! | Delete    | `POST path`, `X-HTTP-Method: DELETE`, `IF-MATCH: *` |
//! | Custom    | `POST path` with an optional JSON body           |
//!
//! Responses are requested with `odata=nometadata`; any metadata that still
//! shows up (verbose `d` wrappers, `__metadata`, `odata.*` annotations) is
//! stripped before the body reaches the engine.

use reqwest::Method;
use serde_json::{Map, Value};
use sharekit_core::domain::{OperationKind, Payload, PropertyBag};
use sharekit_core::ports::TransportRequest;
use url::Url;

use crate::rate_limit;
use crate::RestError;

pub const ACCEPT_JSON: &str = "application/json;odata=nometadata";
pub const CONTENT_JSON: &str = "application/json;odata=nometadata";
pub const CONTENT_BINARY: &str = "application/octet-stream";

/// Wire form of one request
#[derive(Debug, Clone, PartialEq)]
pub struct HttpCall {
    pub method: Method,
    pub url: Url,
    /// `(name, value)` pairs beyond auth and `Accept`
    pub headers: Vec<(&'static str, &'static str)>,
    pub body: HttpBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HttpBody {
    Empty,
    Json(Value),
    Binary(Vec<u8>),
}

impl HttpCall {
    /// Rate limit category the call is charged to
    pub fn category(&self) -> &'static str {
        match (&self.method, &self.body) {
            (_, HttpBody::Binary(_)) => rate_limit::UPLOAD,
            (&Method::GET, _) => rate_limit::READ,
            _ => rate_limit::WRITE,
        }
    }

    pub fn content_type(&self) -> Option<&'static str> {
        match self.body {
            HttpBody::Empty => None,
            HttpBody::Json(_) => Some(CONTENT_JSON),
            HttpBody::Binary(_) => Some(CONTENT_BINARY),
        }
    }
}

/// Builds the HTTP call for `request` against `site`
pub fn to_http(site: &Url, request: &TransportRequest) -> Result<HttpCall, RestError> {
    let mut url = resolve_url(site, &request.path)?;
    let mut headers = Vec::new();

    let method = match &request.kind {
        OperationKind::Get => {
            let select = request.selector.select_paths();
            let expand = request.selector.expand_paths();
            if !select.is_empty() || !expand.is_empty() {
                let mut query = url.query_pairs_mut();
                if !select.is_empty() {
                    query.append_pair("$select", &select.join(","));
                }
                if !expand.is_empty() {
                    query.append_pair("$expand", &expand.join(","));
                }
            }
            Method::GET
        }
        OperationKind::Add | OperationKind::Custom(_) => Method::POST,
        OperationKind::Update => {
            headers.push(("X-HTTP-Method", "MERGE"));
            headers.push(("IF-MATCH", "*"));
            Method::POST
        }
        OperationKind::Delete => {
            headers.push(("X-HTTP-Method", "DELETE"));
            headers.push(("IF-MATCH", "*"));
            Method::POST
        }
    };

    let body = match &request.payload {
        Payload::None => HttpBody::Empty,
        Payload::Properties(bag) => HttpBody::Json(bag.to_json()),
        Payload::Binary(bytes) => HttpBody::Binary(bytes.clone()),
    };

    Ok(HttpCall {
        method,
        url,
        headers,
        body,
    })
}

/// Joins a site-relative path (which may carry its own query) onto the site
pub fn resolve_url(site: &Url, path: &str) -> Result<Url, RestError> {
    let base = site.as_str().trim_end_matches('/');
    let path = path.trim_start_matches('/');
    Url::parse(&format!("{base}/{path}"))
        .map_err(|e| RestError::InvalidResponse(format!("cannot build url for {path}: {e}")))
}

/// Parses a response body into a property bag
///
/// Empty bodies (`204`, actions without a result) yield an empty bag.
pub fn parse_body(body: &[u8]) -> Result<PropertyBag, RestError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(PropertyBag::new());
    }
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| RestError::InvalidResponse(format!("body is not JSON: {e}")))?;
    let value = match value {
        Value::Object(mut map) if map.len() == 1 && map.contains_key("d") => {
            map.remove("d").unwrap_or(Value::Null)
        }
        other => other,
    };
    Ok(PropertyBag::from_json(&strip_metadata(value)))
}

fn is_metadata_key(key: &str) -> bool {
    key == "__metadata"
        || key.starts_with("odata.")
        || key.starts_with("@odata.")
        || key.contains("@odata.")
}

/// Deferred navigation properties carry nothing but a link
fn is_deferred(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|o| o.len() == 1 && o.contains_key("__deferred"))
}

fn strip_metadata(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(k, v)| !is_metadata_key(k) && !is_deferred(v))
                .map(|(k, v)| (k, strip_metadata(v)))
                .collect::<Map<_, _>>(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(strip_metadata).collect()),
        other => other,
    }
}

/// Extracts the service's error message from an error body
///
/// Understands the `nometadata` (`odata.error`) and verbose (`error`)
/// shapes; anything else is returned as text.
pub fn error_message(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body).trim().to_string();
    let Ok(value) = serde_json::from_str::<Value>(&text) else {
        return text;
    };
    let error = value.get("odata.error").or_else(|| value.get("error"));
    let message = error.and_then(|e| e.get("message")).and_then(|m| match m {
        Value::String(s) => Some(s.clone()),
        Value::Object(o) => o.get("value").and_then(Value::as_str).map(str::to_string),
        _ => None,
    });
    message.unwrap_or(text)
}
