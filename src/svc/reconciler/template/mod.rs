//! # Template reconciler
//!
//! Renders the custom resource into a temporary file via a template
//! directory, then shells out to `kubectl apply`/`kubectl delete` with it.

pub mod kubectl;
pub mod renderer;

use std::path::PathBuf;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::{debug, error, info};

use crate::svc::{cr::CustomResourceView, metrics, watcher::ResourceController};

use self::{kubectl::Kubectl, renderer::Renderer};

// -----------------------------------------------------------------------------
// Reconciler structure

pub struct Reconciler {
    templates: PathBuf,
    kubectl: Kubectl,
}

impl Reconciler {
    pub fn new(templates: PathBuf, kube_config: Option<PathBuf>) -> Self {
        Self {
            templates,
            kubectl: Kubectl { kube_config },
        }
    }

    fn render(&self, cr: &CustomResourceView) -> Result<(NamedTempFile, String), renderer::Error> {
        let renderer = Renderer::load(&self.templates)?;
        let rendered = renderer.render(cr)?;
        let file = NamedTempFile::new().map_err(|err| renderer::Error::ReadFile(self.templates.to_owned(), err))?;

        Ok((file, rendered))
    }

    /// renders, writes and applies the custom resource, returning whether
    /// the whole chain succeeded. Counts exactly one of the operation's
    /// `*_error_total` series on failure; the caller counts the
    /// success-side series since it alone knows whether this is a create
    /// or an update
    fn apply(&self, cr: &CustomResourceView, error_total: &prometheus::Counter) -> bool {
        let (file, rendered) = match self.render(cr) {
            Ok(pair) => pair,
            Err(err) => {
                error!(name = %cr.name(), error = err.to_string(), "failed to render templates for custom resource");
                error_total.inc();
                return false;
            }
        };

        if let Err(err) = std::fs::write(file.path(), &rendered) {
            error!(name = %cr.name(), error = err.to_string(), "failed to write rendered templates to a temporary file");
            error_total.inc();
            return false;
        }

        match self.kubectl.apply(file.path()) {
            Ok(out) => {
                debug!(name = %cr.name(), result = %out, "applied kubernetes objects");
                true
            }
            Err(err) => {
                error!(name = %cr.name(), error = err.to_string(), "failed to apply rendered templates");
                debug!(name = %cr.name(), template = %rendered, "template we tried to apply");
                error_total.inc();
                false
            }
        }
    }
}

#[async_trait]
impl ResourceController for Reconciler {
    async fn resource_added(&self, resource: CustomResourceView) {
        metrics::EVENTS_TOTAL.inc();
        info!(name = %resource.name(), "resource added");

        if self.apply(&resource, &metrics::CREATE_ERROR_TOTAL) {
            metrics::CREATE_TOTAL.inc();
            metrics::TOTAL.inc();
            metrics::record_timestamp(&metrics::LAST_CREATE_TIMESTAMP_UTC_SECONDS, chrono::Utc::now());
        }
    }

    async fn resource_updated(&self, _old: CustomResourceView, new: CustomResourceView) {
        metrics::EVENTS_TOTAL.inc();
        info!(name = %new.name(), "resource updated");

        if self.apply(&new, &metrics::UPDATE_ERROR_TOTAL) {
            metrics::UPDATE_TOTAL.inc();
            metrics::record_timestamp(&metrics::LAST_UPDATE_TIMESTAMP_UTC_SECONDS, chrono::Utc::now());
        }
    }

    async fn resource_deleted(&self, resource: CustomResourceView) {
        metrics::EVENTS_TOTAL.inc();
        info!(name = %resource.name(), "resource deleted");

        let (file, rendered) = match self.render(&resource) {
            Ok(pair) => pair,
            Err(err) => {
                error!(name = %resource.name(), error = err.to_string(), "failed to render templates for custom resource");
                metrics::DELETE_ERROR_TOTAL.inc();
                return;
            }
        };

        if let Err(err) = std::fs::write(file.path(), &rendered) {
            error!(name = %resource.name(), error = err.to_string(), "failed to write rendered templates to a temporary file");
            metrics::DELETE_ERROR_TOTAL.inc();
            return;
        }

        match self.kubectl.delete(file.path()) {
            Ok(out) => {
                debug!(name = %resource.name(), result = %out, "deleted kubernetes objects");
                metrics::DELETE_TOTAL.inc();
                metrics::TOTAL.dec();
                metrics::record_timestamp(&metrics::LAST_DELETE_TIMESTAMP_UTC_SECONDS, chrono::Utc::now());
            }
            Err(err) => {
                error!(name = %resource.name(), error = err.to_string(), "failed to delete rendered templates");
                debug!(name = %resource.name(), template = %rendered, "template we tried to delete");
                metrics::DELETE_ERROR_TOTAL.inc();
            }
        }
    }
}
