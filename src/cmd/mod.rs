//! # Command module
//!
//! This module provides the command line interface: the top-level flags
//! shared by every subcommand, and the `start`, `check` and `version`
//! subcommands themselves.

pub mod check;
pub mod start;
pub mod version;

use clap::{Parser, Subcommand};

// -----------------------------------------------------------------------------
// Error enumeration

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to run 'start', {0}")]
    Start(start::Error),
    #[error("failed to run 'check', {0}")]
    Check(check::Error),
}

// -----------------------------------------------------------------------------
// Args structure

#[derive(Parser, Clone, Debug)]
#[command(name = env!("CARGO_PKG_NAME"), about = env!("CARGO_PKG_DESCRIPTION"), version = env!("CARGO_PKG_VERSION"))]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

// -----------------------------------------------------------------------------
// Command enumeration

#[derive(Subcommand, Clone, Debug)]
pub enum Command {
    /// Run the operator
    Start(start::StartArgs),
    /// Render templates against a single custom resource file and print the result
    Check(check::CheckArgs),
    /// Print version, git commit hash and build time
    Version,
}

impl Command {
    /// runs the selected subcommand to completion. `Version` never fails,
    /// `Check` and `Start` surface their own error enums wrapped in
    /// [`Error`]
    pub async fn execute(&self) -> Result<(), Error> {
        match self {
            Self::Start(args) => start::execute(args).await.map_err(Error::Start),
            Self::Check(args) => check::execute(args).map_err(Error::Check),
            Self::Version => {
                version::print();
                Ok(())
            }
        }
    }
}
