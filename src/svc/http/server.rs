//! # Server module
//!
//! This module provides the HTTP server exposing the metrics and status
//! endpoints

use std::{net::AddrParseError, sync::Arc};

use hyper::{
    service::{make_service_fn, service_fn},
    Server,
};
use tracing::{info, Instrument};

use crate::svc::{cfg::Configuration, http::router};

// -----------------------------------------------------------------------------
// Error enum

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to parse listen address '{0}', {1}")]
    Listen(String, AddrParseError),
    #[error("failed to bind server, {0}")]
    Bind(hyper::Error),
    #[error("failed to serve content, {0}")]
    Serve(hyper::Error),
}

#[tracing::instrument(skip(config))]
pub async fn serve(config: Arc<Configuration>) -> Result<(), Error> {
    let addr = config
        .server
        .address
        .parse()
        .map_err(|err| Error::Listen(config.server.address.to_owned(), err))?;

    info!("start to listen for http requests on {}", addr);
    Server::try_bind(&addr)
        .map_err(Error::Bind)?
        .serve(make_service_fn(move |_| {
            let config = config.to_owned();
            async move { Ok::<_, Error>(service_fn(move |req| router(config.to_owned(), req))) }
        }))
        .instrument(tracing::info_span!("Server::serve"))
        .await
        .map_err(Error::Serve)?;

    Ok(())
}
