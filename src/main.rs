//! # Manifest operator
//!
//! A kubernetes operator that renders a custom resource into manifests, via
//! templates or a chart, and reconciles them against the cluster.

use clap::Parser;
use tracing::error;

use crate::cmd::Args;

pub mod cmd;
pub mod logging;
pub mod svc;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(err) = args.command.execute().await {
        error!(error = err.to_string(), "could not run {} properly", env!("CARGO_PKG_NAME"));
        eprintln!("{}", err);
        std::process::exit(1);
    }
}
