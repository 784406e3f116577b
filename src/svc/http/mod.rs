//! # HTTP module
//!
//! This module provides the server exposing the metrics and status
//! endpoints, routed on the paths configured on the command line.

use std::{collections::BTreeMap, sync::Arc, time::Instant};

use hyper::{header, Body, Method, Request, Response, StatusCode};
use tracing::info;

pub mod metrics;
pub mod server;
pub mod status;

use crate::svc::cfg::Configuration;

// -----------------------------------------------------------------------------
// Error enum

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Metrics(metrics::Error),
    #[error("failed to serialize payload, {0}")]
    Serialize(serde_json::Error),
}

// -----------------------------------------------------------------------------
// Router

/// dispatches requests on the configured metrics and status endpoints,
/// answering `404` to anything else
pub async fn router(config: Arc<Configuration>, req: Request<Body>) -> Result<Response<Body>, Error> {
    let begin = Instant::now();
    let method = req.method().to_owned();
    let path = req.uri().path().to_owned();

    let result = match (&method, path.as_str()) {
        (&Method::GET, p) if p == config.server.metrics_endpoint => {
            metrics::handler(&req).await.map_err(Error::Metrics)
        }
        (&Method::GET, p) if p == config.server.status_endpoint => Ok(status::handler(&req).await),
        _ => Ok(not_found(&req).await),
    };

    let duration = Instant::now().duration_since(begin).as_micros();

    match result {
        Ok(res) => {
            info!(
                method = method.as_str(),
                path = &path,
                status = res.status().as_u16(),
                duration = format!("{}us", duration),
                "received request"
            );

            Ok(res)
        }
        Err(err) => {
            let mut body = BTreeMap::new();
            body.insert("error".to_string(), err.to_string());

            let mut res = Response::default();
            res.headers_mut()
                .insert(header::CONTENT_TYPE, header::HeaderValue::from_static("application/json"));
            *res.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            *res.body_mut() = Body::from(serde_json::to_string(&body).map_err(Error::Serialize)?);

            info!(
                method = method.as_str(),
                path = &path,
                status = res.status().as_u16(),
                duration = format!("{}us", duration),
                "received request"
            );

            Ok(res)
        }
    }
}

// -----------------------------------------------------------------------------
// Not found

pub async fn not_found(_req: &Request<Body>) -> Response<Body> {
    let mut res = Response::default();

    *res.status_mut() = StatusCode::NOT_FOUND;
    res
}
