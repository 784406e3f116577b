//! # Print reconciler
//!
//! A [`ResourceController`] that only logs the events it receives. Useful
//! to validate that the watch configuration and the filter are wired up
//! correctly before pointing the operator at a real renderer, enabled via
//! `--nop`.

use async_trait::async_trait;
use tracing::info;

use crate::svc::{cr::CustomResourceView, metrics, watcher::ResourceController};

#[derive(Default)]
pub struct Reconciler;

#[async_trait]
impl ResourceController for Reconciler {
    async fn resource_added(&self, resource: CustomResourceView) {
        metrics::EVENTS_TOTAL.inc();
        info!(name = %resource.name(), "CR added");

        metrics::CREATE_TOTAL.inc();
        metrics::TOTAL.inc();
        metrics::record_timestamp(&metrics::LAST_CREATE_TIMESTAMP_UTC_SECONDS, chrono::Utc::now());
    }

    async fn resource_updated(&self, _old: CustomResourceView, new: CustomResourceView) {
        metrics::EVENTS_TOTAL.inc();
        info!(name = %new.name(), "CR changed");

        metrics::UPDATE_TOTAL.inc();
        metrics::record_timestamp(&metrics::LAST_UPDATE_TIMESTAMP_UTC_SECONDS, chrono::Utc::now());
    }

    async fn resource_deleted(&self, resource: CustomResourceView) {
        metrics::EVENTS_TOTAL.inc();
        info!(name = %resource.name(), "CR deleted");

        metrics::DELETE_TOTAL.inc();
        metrics::TOTAL.dec();
        metrics::record_timestamp(&metrics::LAST_DELETE_TIMESTAMP_UTC_SECONDS, chrono::Utc::now());
    }
}
