//! OData `$batch` encoding
//!
//! A batch is one `POST _api/$batch` with a `multipart/mixed` body. Reads
//! are top-level parts; every mutation sits in a changeset of its own so a
//! failing write does not roll back its neighbours. The response mirrors
//! the request: one `application/http` part per request, in order, with
//! changeset responses nested one level down.
//!
//! Lines are CRLF terminated throughout.

use uuid::Uuid;

use crate::translate::{HttpBody, HttpCall, ACCEPT_JSON};
use crate::RestError;

const CRLF: &str = "\r\n";

/// One decoded response part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl PartResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Encoded batch body and the content type announcing its boundary
#[derive(Debug, Clone)]
pub struct EncodedBatch {
    pub boundary: String,
    pub body: String,
}

impl EncodedBatch {
    pub fn content_type(&self) -> String {
        format!("multipart/mixed; boundary=\"{}\"", self.boundary)
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// Encodes `calls` into a `$batch` body
///
/// # Errors
/// Binary bodies cannot travel inside a batch and are rejected with
/// [`RestError::Batch`].
pub fn encode(calls: &[HttpCall]) -> Result<EncodedBatch, RestError> {
    let boundary = format!("batch_{}", Uuid::new_v4());
    let mut body = String::new();

    for call in calls {
        body.push_str(&format!("--{boundary}{CRLF}"));
        if call.method == reqwest::Method::GET {
            push_http_part(&mut body, call)?;
            continue;
        }
        let changeset = format!("changeset_{}", Uuid::new_v4());
        body.push_str(&format!(
            "Content-Type: multipart/mixed; boundary=\"{changeset}\"{CRLF}{CRLF}"
        ));
        body.push_str(&format!("--{changeset}{CRLF}"));
        push_http_part(&mut body, call)?;
        body.push_str(&format!("--{changeset}--{CRLF}"));
    }
    body.push_str(&format!("--{boundary}--{CRLF}"));

    Ok(EncodedBatch { boundary, body })
}

fn push_http_part(out: &mut String, call: &HttpCall) -> Result<(), RestError> {
    out.push_str(&format!("Content-Type: application/http{CRLF}"));
    out.push_str(&format!("Content-Transfer-Encoding: binary{CRLF}{CRLF}"));
    out.push_str(&format!("{} {} HTTP/1.1{CRLF}", call.method, call.url));
    out.push_str(&format!("Accept: {ACCEPT_JSON}{CRLF}"));
    for (name, value) in &call.headers {
        out.push_str(&format!("{name}: {value}{CRLF}"));
    }
    match &call.body {
        HttpBody::Empty => out.push_str(CRLF),
        HttpBody::Json(value) => {
            if let Some(content_type) = call.content_type() {
                out.push_str(&format!("Content-Type: {content_type}{CRLF}"));
            }
            out.push_str(CRLF);
            out.push_str(&value.to_string());
            out.push_str(CRLF);
        }
        HttpBody::Binary(_) => {
            return Err(RestError::Batch(format!(
                "binary body for {} cannot be batched",
                call.url
            )))
        }
    }
    Ok(())
}

// ============================================================================
// Decoding
// ============================================================================

/// Boundary parameter of a `multipart/mixed` content type
pub fn boundary_of(content_type: &str) -> Option<String> {
    content_type.split(';').find_map(|param| {
        let (name, value) = param.trim().split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("boundary")
            .then(|| value.trim().trim_matches('"').to_string())
    })
}

/// Decodes a `$batch` response body into its parts, changesets flattened
pub fn decode(content_type: &str, body: &[u8]) -> Result<Vec<PartResponse>, RestError> {
    let text = String::from_utf8_lossy(body);
    let boundary = boundary_of(content_type)
        .or_else(|| sniff_boundary(&text))
        .ok_or_else(|| RestError::Batch("response has no multipart boundary".to_string()))?;
    let mut parts = Vec::new();
    decode_into(&text, &boundary, &mut parts)?;
    Ok(parts)
}

/// First `--boundary` line of a body whose header did not name it
fn sniff_boundary(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|line| line.starts_with("--") && line.len() > 2)
        .map(|line| line[2..].to_string())
}

fn decode_into(text: &str, boundary: &str, parts: &mut Vec<PartResponse>) -> Result<(), RestError> {
    let delimiter = format!("--{boundary}");
    let mut sections = text.split(delimiter.as_str());
    // Preamble before the first delimiter
    sections.next();

    for section in sections {
        if section.starts_with("--") {
            break;
        }
        let section = section.trim_start_matches(['\r', '\n']);
        let (headers, content) = split_head(section);

        let nested = header_value(headers, "content-type")
            .filter(|ct| ct.to_ascii_lowercase().starts_with("multipart/mixed"))
            .and_then(boundary_of);
        match nested {
            Some(inner) => decode_into(content, &inner, parts)?,
            None => parts.push(parse_http_response(content)?),
        }
    }
    Ok(())
}

/// Splits at the first blank line
fn split_head(text: &str) -> (&str, &str) {
    if let Some(at) = text.find("\r\n\r\n") {
        (&text[..at], &text[at + 4..])
    } else if let Some(at) = text.find("\n\n") {
        (&text[..at], &text[at + 2..])
    } else {
        (text, "")
    }
}

fn header_value<'a>(headers: &'a str, name: &str) -> Option<&'a str> {
    headers.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim().eq_ignore_ascii_case(name).then(|| value.trim())
    })
}

fn parse_http_response(content: &str) -> Result<PartResponse, RestError> {
    let content = content.trim_start_matches(['\r', '\n']);
    let (head, body) = split_head(content);
    let status_line = head
        .lines()
        .next()
        .ok_or_else(|| RestError::Batch("empty response part".to_string()))?;
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| RestError::Batch(format!("bad status line '{status_line}'")))?;
    Ok(PartResponse {
        status,
        body: body.trim_end_matches(['\r', '\n']).as_bytes().to_vec(),
    })
}
