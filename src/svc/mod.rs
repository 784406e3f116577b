//! # Services module
//!
//! This module provides the services that back the operator: the
//! configuration layer, the kubernetes dynamic client helpers, the custom
//! resource view, the status codec, the reconcilers, the watcher and the
//! HTTP/metrics surface.

pub mod cfg;
pub mod cr;
pub mod http;
pub mod k8s;
pub mod metrics;
pub mod reconciler;
pub mod status;
pub mod watcher;
