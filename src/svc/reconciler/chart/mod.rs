//! # Chart reconciler
//!
//! Renders a chart against the custom resource through the [`Engine`],
//! applies every rendered document to the cluster with server-side apply,
//! and tracks the resulting release in a [`ReleaseStore`]. The release name
//! decides install vs upgrade; its revision and status are mirrored back
//! onto the custom resource's `status.release`.

pub mod engine;
pub mod release;
pub mod remote;

use std::path::PathBuf;

use async_trait::async_trait;
use kube::{
    api::{Patch, PatchParams},
    core::{DynamicObject, GroupVersionKind},
    discovery, Api, ResourceExt,
};
use tracing::{debug, error, info};

use crate::svc::{
    cr::CustomResourceView,
    k8s::{resource, Context},
    metrics,
    status::{CustomResourceStatus, Phase, Reason, ReleaseStatus},
    watcher::ResourceController,
};

use self::{
    engine::Engine,
    release::{Release, ReleaseStore},
};

const FIELD_MANAGER: &str = "manifest-operator";
const CHART_ANNOTATION: &str = "chart";

// -----------------------------------------------------------------------------
// ChartSource structure

/// where the chart reconciler loads its chart directory from: a fixed
/// local directory configured at construction, overridden per custom
/// resource when it carries a `chart` annotation, in which case the
/// referenced chart is resolved through the remote chart downloader and
/// cached under `cache_root`
#[derive(Clone, Debug)]
pub struct ChartSource {
    pub local: Option<PathBuf>,
    pub cache_root: PathBuf,
}

impl ChartSource {
    pub fn local(dir: PathBuf, cache_root: PathBuf) -> Self {
        Self {
            local: Some(dir),
            cache_root,
        }
    }
}

// -----------------------------------------------------------------------------
// Error enumeration

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("custom resource carries no '{0}' annotation and no local chart directory is configured, the chart source cannot be resolved")]
    MissingChartAnnotation(&'static str),
    #[error("failed to resolve remote chart, {0}")]
    Remote(#[from] remote::Error),
    #[error("failed to render chart, {0}")]
    Render(engine::Error),
    #[error("rendered document '{0}' is not valid yaml, {1}")]
    InvalidYaml(String, serde_yaml::Error),
    #[error("rendered document '{0}' could not be converted to a kubernetes object, {1}")]
    Convert(String, serde_json::Error),
    #[error("rendered document '{0}' has no apiVersion/kind")]
    MissingTypeMeta(String),
    #[error("failed to discover kubernetes api for document '{0}', {1}")]
    Discover(String, kube::Error),
    #[error("failed to apply document '{0}', {1}")]
    Apply(String, kube::Error),
    #[error("failed to delete document '{0}', {1}")]
    Delete(String, kube::Error),
}

// -----------------------------------------------------------------------------
// Reconciler structure

pub struct Reconciler {
    context: Context,
    crd_api_resource: kube::api::ApiResource,
    source: ChartSource,
    prefix: String,
    namespace: String,
    http: reqwest::Client,
    store: ReleaseStore,
}

impl Reconciler {
    pub fn new(context: Context, crd_api_resource: kube::api::ApiResource, source: ChartSource, prefix: String, namespace: String) -> Self {
        Self {
            context,
            crd_api_resource,
            source,
            prefix,
            namespace,
            http: reqwest::Client::new(),
            store: ReleaseStore::new(),
        }
    }

    /// the release name derived from the configured prefix and the custom
    /// resource's name, stable for the lifetime of the resource
    fn release_name(&self, cr: &CustomResourceView) -> String {
        format!("{}-{}", self.prefix, cr.name())
    }

    /// resolves the chart directory to render: a `chart` annotation on the
    /// custom resource always takes precedence and is resolved through the
    /// remote chart downloader; absent that, the statically configured
    /// local directory is used
    async fn chart_dir(&self, cr: &CustomResourceView) -> Result<PathBuf, Error> {
        match cr.inner().annotations().get(CHART_ANNOTATION) {
            Some(chart_ref) => remote::resolve(&self.http, &self.source.cache_root, chart_ref)
                .await
                .map_err(Error::Remote),
            None => self.source.local.to_owned().ok_or(Error::MissingChartAnnotation(CHART_ANNOTATION)),
        }
    }

    /// discovers the dynamic api for a single rendered document and returns
    /// it alongside the parsed object and its name
    async fn document_api(&self, filename: &str, content: &str, fallback_namespace: &str) -> Result<(Api<DynamicObject>, DynamicObject), Error> {
        let yaml: serde_yaml::Value = serde_yaml::from_str(content).map_err(|err| Error::InvalidYaml(filename.to_string(), err))?;
        let value: serde_json::Value = serde_json::to_value(&yaml).map_err(|err| Error::Convert(filename.to_string(), err))?;

        let object: DynamicObject = serde_json::from_value(value).map_err(|err| Error::Convert(filename.to_string(), err))?;
        let types = object.types.as_ref().ok_or_else(|| Error::MissingTypeMeta(filename.to_string()))?;

        let (group, version) = match types.api_version.split_once('/') {
            Some((group, version)) => (group.to_string(), version.to_string()),
            None => (String::new(), types.api_version.to_owned()),
        };

        let gvk = GroupVersionKind::gvk(&group, &version, &types.kind);
        let (api_resource, capabilities) = discovery::oneshot::gvk(&self.context.kube, &gvk)
            .await
            .map_err(|err| Error::Discover(filename.to_string(), err))?;

        let namespace = object.namespace().unwrap_or_else(|| fallback_namespace.to_string());
        let api: Api<DynamicObject> = match capabilities.scope {
            discovery::Scope::Namespaced => Api::namespaced_with(self.context.kube.to_owned(), &namespace, &api_resource),
            discovery::Scope::Cluster => Api::all_with(self.context.kube.to_owned(), &api_resource),
        };

        Ok((api, object))
    }

    /// applies a single rendered yaml document to the cluster via
    /// server-side apply, discovering its api resource and scope on the fly
    /// since a chart can render arbitrary kinds
    async fn apply_document(&self, namespace: &str, filename: &str, content: &str) -> Result<(), Error> {
        let (api, object) = self.document_api(filename, content, namespace).await?;
        let name = object.name_any();

        let patch = Patch::Apply(&object);
        let params = PatchParams::apply(FIELD_MANAGER).force();

        api.patch(&name, &params, &patch)
            .await
            .map(|_| ())
            .map_err(|err| Error::Apply(filename.to_string(), err))
    }

    async fn delete_document(&self, namespace: &str, filename: &str, content: &str) -> Result<(), Error> {
        let (api, object) = self.document_api(filename, content, namespace).await?;
        let name = object.name_any();

        api.delete(&name, &Default::default())
            .await
            .map(|_| ())
            .map_err(|err| Error::Delete(filename.to_string(), err))
    }

    /// installs or upgrades the release for the given custom resource,
    /// writing the resulting status (and release snapshot) back onto it
    async fn install_or_upgrade(&self, cr: &CustomResourceView, reason: Reason) {
        metrics::EVENTS_TOTAL.inc();

        let release_name = self.release_name(cr);
        if let Some(snapshot) = CustomResourceStatus::read(cr).release {
            if snapshot.name == release_name {
                self.store.rehydrate(&snapshot, &self.namespace);
            }
        }

        let is_upgrade = self.store.exists(&release_name);

        match self.render_and_apply(cr, &release_name).await {
            Ok(release) => {
                info!(name = %cr.name(), release = %release_name, upgrade = is_upgrade, "reconciled chart release");

                self.store.upsert(release.to_owned());

                if is_upgrade {
                    metrics::UPDATE_TOTAL.inc();
                    metrics::record_timestamp(&metrics::LAST_UPDATE_TIMESTAMP_UTC_SECONDS, chrono::Utc::now());
                } else {
                    metrics::CREATE_TOTAL.inc();
                    metrics::TOTAL.inc();
                    metrics::record_timestamp(&metrics::LAST_CREATE_TIMESTAMP_UTC_SECONDS, chrono::Utc::now());
                }

                let status = CustomResourceStatus::read(cr)
                    .set_phase(chrono::Utc::now(), Phase::Applied, Reason::ApplySuccessful, "")
                    .with_release(Some(release.snapshot()));

                self.write_status(cr, status).await;
            }
            Err(err) => {
                error!(name = %cr.name(), release = %release_name, error = err.to_string(), "failed to reconcile chart release");

                if is_upgrade {
                    metrics::UPDATE_ERROR_TOTAL.inc();
                } else {
                    metrics::CREATE_ERROR_TOTAL.inc();
                }

                let _ = reason;
                let status = CustomResourceStatus::read(cr).set_phase(chrono::Utc::now(), Phase::Failed, Reason::ApplyFailed, err.to_string());
                self.write_status(cr, status).await;
            }
        }
    }

    async fn render_and_apply(&self, cr: &CustomResourceView, release_name: &str) -> Result<Release, Error> {
        let chart_dir = self.chart_dir(cr).await?;
        let engine = Engine::load(&chart_dir).map_err(Error::Render)?;

        // the watched object's own TypeMeta is authoritative; the configured
        // ApiResource's `kind` is only a plural-derived guess used for
        // discovery/display, never for the owner reference
        let (owner_api_version, owner_kind) = match cr.inner().types.as_ref() {
            Some(types) => (types.api_version.to_owned(), types.kind.to_owned()),
            None => (self.crd_api_resource.api_version.to_owned(), self.crd_api_resource.kind.to_owned()),
        };
        let owner = resource::owner_reference(cr.inner(), owner_api_version, owner_kind);

        let documents = engine.render(cr, &owner).map_err(Error::Render)?;

        let namespace = cr.namespace().unwrap_or_else(|| self.namespace.to_owned());
        for (filename, content) in &documents {
            self.apply_document(&namespace, filename, content).await?;
        }

        Ok(Release {
            name: release_name.to_string(),
            namespace,
            revision: self.store.next_revision(release_name),
            status: ReleaseStatus::Deployed,
            documents,
        })
    }

    /// uninstalls the release tracked for the given custom resource,
    /// deleting every document it last applied. Deletion failures are
    /// counted but not written back since the custom resource is gone
    async fn uninstall(&self, cr: &CustomResourceView) {
        metrics::EVENTS_TOTAL.inc();

        let release_name = self.release_name(cr);
        let Some(release) = self.store.remove(&release_name) else {
            debug!(name = %cr.name(), release = %release_name, "no tracked release to uninstall");
            metrics::DELETE_TOTAL.inc();
            metrics::record_timestamp(&metrics::LAST_DELETE_TIMESTAMP_UTC_SECONDS, chrono::Utc::now());
            return;
        };

        let mut failed = false;
        for (filename, content) in &release.documents {
            if let Err(err) = self.delete_document(&release.namespace, filename, content).await {
                error!(name = %cr.name(), release = %release_name, document = %filename, error = err.to_string(), "failed to delete chart document");
                failed = true;
            }
        }

        if failed {
            metrics::DELETE_ERROR_TOTAL.inc();
        } else {
            metrics::DELETE_TOTAL.inc();
            metrics::TOTAL.dec();
            metrics::record_timestamp(&metrics::LAST_DELETE_TIMESTAMP_UTC_SECONDS, chrono::Utc::now());
            info!(name = %cr.name(), release = %release_name, "uninstalled chart release");
        }
    }

    /// writes the given status back onto the custom resource via a json
    /// patch diffed between the resource as observed and the same resource
    /// with its `.status` replaced, so the generated patch paths are rooted
    /// under `/status` as the api server's status subresource expects
    async fn write_status(&self, cr: &CustomResourceView, status: CustomResourceStatus) {
        let origin = cr.inner().to_owned();
        let mut modified = origin.to_owned();
        modified.data["status"] = status.to_value();

        let patch = match resource::diff(&origin, &modified) {
            Ok(patch) => patch,
            Err(err) => {
                error!(name = %cr.name(), error = err.to_string(), "failed to diff custom resource status");
                return;
            }
        };

        if let Err(err) = resource::patch_status(
            self.context.kube.to_owned(),
            &self.crd_api_resource,
            cr.namespace().as_deref(),
            modified,
            patch,
        )
        .await
        {
            error!(name = %cr.name(), error = err.to_string(), "failed to write custom resource status");
        }
    }
}

#[async_trait]
impl ResourceController for Reconciler {
    async fn resource_added(&self, resource: CustomResourceView) {
        self.install_or_upgrade(&resource, Reason::CustomResourceAdded).await;
    }

    async fn resource_updated(&self, _old: CustomResourceView, new: CustomResourceView) {
        self.install_or_upgrade(&new, Reason::CustomResourceUpdated).await;
    }

    async fn resource_deleted(&self, resource: CustomResourceView) {
        self.uninstall(&resource).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn release_name_combines_prefix_and_cr_name() {
        let context = Context::new(unreachable_client(), Arc::new(test_configuration()));
        let reconciler = Reconciler::new(
            context,
            test_api_resource(),
            ChartSource::local(PathBuf::from("/charts/widget"), PathBuf::from("/tmp/manifest-operator")),
            "manifest-operator".to_string(),
            "default".to_string(),
        );

        let cr = cr_named("dory");
        assert_eq!(reconciler.release_name(&cr), "manifest-operator-dory");
    }

    fn cr_named(name: &str) -> CustomResourceView {
        use kube::core::{DynamicObject, ObjectMeta};

        CustomResourceView::from(DynamicObject {
            types: None,
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            data: serde_json::json!({}),
        })
    }

    fn test_api_resource() -> kube::api::ApiResource {
        kube::api::ApiResource {
            group: "example.com".to_string(),
            version: "v1".to_string(),
            api_version: "example.com/v1".to_string(),
            kind: "Widget".to_string(),
            plural: "widgets".to_string(),
        }
    }

    fn test_configuration() -> crate::svc::cfg::Configuration {
        crate::svc::cfg::Configuration {
            crd: crate::svc::cfg::Crd {
                name: "widgets".to_string(),
                group: "example.com".to_string(),
                version: "v1".to_string(),
                namespace: None,
                filter: None,
            },
            render: crate::svc::cfg::Render::default(),
            helm: crate::svc::cfg::Helm {
                namespace: "default".to_string(),
                prefix: "manifest-operator".to_string(),
                wait: false,
                wait_timeout: 120,
            },
            server: crate::svc::cfg::Server {
                address: "0.0.0.0:8080".to_string(),
                metrics_endpoint: "/metrics".to_string(),
                status_endpoint: "/status".to_string(),
            },
            resync_interval_seconds: 0,
        }
    }

    fn unreachable_client() -> kube::Client {
        let uri: http::Uri = "https://localhost:1".parse().expect("valid uri");
        kube::Client::try_from(kube::Config::new(uri)).expect("client construction to never touch the network")
    }
}
