//! # Metrics module
//!
//! This module declares the prometheus series exposed by the operator and
//! the helpers the reconcilers use to update them.

use once_cell::sync::Lazy;

use prometheus::{opts, register_counter, register_gauge, Counter, Gauge};

// -----------------------------------------------------------------------------
// Series

pub static CREATE_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(opts!("releases_create_total", "total number of releases created"))
        .expect("metrics 'releases_create_total' to not be already registered")
});

pub static CREATE_ERROR_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(opts!(
        "releases_create_error_total",
        "total number of failed release creations"
    ))
    .expect("metrics 'releases_create_error_total' to not be already registered")
});

pub static DELETE_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(opts!("releases_delete_total", "total number of releases deleted"))
        .expect("metrics 'releases_delete_total' to not be already registered")
});

pub static DELETE_ERROR_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(opts!(
        "releases_delete_error_total",
        "total number of failed release deletions"
    ))
    .expect("metrics 'releases_delete_error_total' to not be already registered")
});

pub static UPDATE_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(opts!("releases_update_total", "total number of releases updated"))
        .expect("metrics 'releases_update_total' to not be already registered")
});

pub static UPDATE_ERROR_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(opts!(
        "releases_update_error_total",
        "total number of failed release updates"
    ))
    .expect("metrics 'releases_update_error_total' to not be already registered")
});

pub static EVENTS_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(opts!(
        "releases_events_total",
        "total number of custom resource deltas observed by the watcher"
    ))
    .expect("metrics 'releases_events_total' to not be already registered")
});

pub static TOTAL: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(opts!("releases_total", "current number of managed releases"))
        .expect("metrics 'releases_total' to not be already registered")
});

pub static LAST_CREATE_TIMESTAMP_UTC_SECONDS: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(opts!(
        "releases_last_create_timestamp_utc_seconds",
        "unix timestamp of the last successful release creation"
    ))
    .expect("metrics 'releases_last_create_timestamp_utc_seconds' to not be already registered")
});

pub static LAST_UPDATE_TIMESTAMP_UTC_SECONDS: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(opts!(
        "releases_last_update_timestamp_utc_seconds",
        "unix timestamp of the last successful release update"
    ))
    .expect("metrics 'releases_last_update_timestamp_utc_seconds' to not be already registered")
});

pub static LAST_DELETE_TIMESTAMP_UTC_SECONDS: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(opts!(
        "releases_last_delete_timestamp_utc_seconds",
        "unix timestamp of the last successful release deletion"
    ))
    .expect("metrics 'releases_last_delete_timestamp_utc_seconds' to not be already registered")
});

pub static REMOTE_REPO_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(opts!(
        "releases_remote_repo_total",
        "total number of remote chart repository fetches"
    ))
    .expect("metrics 'releases_remote_repo_total' to not be already registered")
});

pub static REMOTE_REPO_ERROR_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(opts!(
        "releases_remote_repo_error_total",
        "total number of failed remote chart repository fetches"
    ))
    .expect("metrics 'releases_remote_repo_error_total' to not be already registered")
});

// -----------------------------------------------------------------------------
// Helpers

/// records a unix timestamp (seconds) onto the given gauge
pub fn record_timestamp(gauge: &Gauge, now: chrono::DateTime<chrono::Utc>) {
    gauge.set(now.timestamp() as f64);
}
