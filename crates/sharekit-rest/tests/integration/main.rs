//! Integration tests for sharekit-rest
//!
//! Uses wiremock to stand in for a SharePoint site and verifies the REST
//! transport end to end: single calls, throttling, `$batch` posts and the
//! engine running on top of them.

mod common;

mod test_batch;
mod test_context;
mod test_transport;
