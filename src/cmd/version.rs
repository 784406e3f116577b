//! # Version module
//!
//! This module provides the `version` subcommand

/// prints the crate version, the short git commit hash and the unix
/// timestamp the binary was built at, each substituted by the build script
pub fn print() {
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!("Git Commit Hash: {}", env!("GIT_HASH"));
    println!("Build Time: {}", env!("BUILD_TIME"));
}
