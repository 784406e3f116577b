//! # Status module
//!
//! This module provides the handler backing the process' status endpoint

use hyper::{header, Body, Request, Response, StatusCode};

// -----------------------------------------------------------------------------
// Helper methods

/// always answers `200` with a fixed body while the process is up
pub async fn handler(_req: &Request<Body>) -> Response<Body> {
    let message = serde_json::json!({"success": true, "info": "Up and Running!"}).to_string();

    let mut res = Response::default();
    res.headers_mut()
        .insert(header::CONTENT_TYPE, header::HeaderValue::from_static("application/json"));
    *res.status_mut() = StatusCode::OK;
    *res.body_mut() = Body::from(message);

    res
}
