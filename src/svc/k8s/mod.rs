//! # Kubernetes module
//!
//! This module provides the kubernetes client, the dynamic resource helpers
//! and the shared context passed around the watcher and the reconcilers.

use std::sync::Arc;

use kube::{api::ApiResource, core::DynamicObject, Api};

use crate::svc::cfg::{Configuration, Crd};

pub mod client;
pub mod resource;

// -----------------------------------------------------------------------------
// Context structure

/// shared state handed to the watcher and to every reconciler invocation
#[derive(Clone)]
pub struct Context {
    pub kube: kube::Client,
    pub config: Arc<Configuration>,
}

impl From<(kube::Client, Arc<Configuration>)> for Context {
    fn from((kube, config): (kube::Client, Arc<Configuration>)) -> Self {
        Self { kube, config }
    }
}

impl Context {
    pub fn new(kube: kube::Client, config: Arc<Configuration>) -> Self {
        Self::from((kube, config))
    }
}

// -----------------------------------------------------------------------------
// Helpers

/// builds the [`ApiResource`] describing the custom resource configured on
/// the command line. The plural name doubles as the `kind` for display
/// purpose only, the http path only ever uses group/version/plural.
pub fn api_resource(crd: &Crd) -> ApiResource {
    let api_version = if crd.group.is_empty() {
        crd.version.to_owned()
    } else {
        format!("{}/{}", crd.group, crd.version)
    };

    ApiResource {
        group: crd.group.to_owned(),
        version: crd.version.to_owned(),
        api_version,
        kind: kind_from_plural(&crd.name),
        plural: crd.name.to_owned(),
    }
}

/// returns a dynamic api client scoped to the configured namespace, or to
/// the whole cluster when no namespace is configured
pub fn api(client: kube::Client, api_resource: &ApiResource, crd: &Crd) -> Api<DynamicObject> {
    match &crd.namespace {
        Some(namespace) => Api::namespaced_with(client, namespace, api_resource),
        None => Api::all_with(client, api_resource),
    }
}

/// derives a capitalized singular-ish kind from a plural resource name, used
/// only as a display/discovery placeholder on the configured [`ApiResource`]
/// (list/watch only ever address the cluster by group/version/plural). Never
/// used for owner references: those are built from the watched object's own
/// `TypeMeta`, the only place the real `kind` is authoritative
fn kind_from_plural(plural: &str) -> String {
    let singular = plural.strip_suffix('s').unwrap_or(plural);
    let mut chars = singular.chars();

    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_from_plural_strips_trailing_s_and_capitalizes() {
        assert_eq!(kind_from_plural("databases"), "Database");
        assert_eq!(kind_from_plural("redis"), "Redi");
        assert_eq!(kind_from_plural(""), "");
    }

    #[test]
    fn api_resource_builds_group_qualified_api_version() {
        let crd = Crd {
            name: "databases".to_string(),
            group: "example.com".to_string(),
            version: "v1".to_string(),
            namespace: None,
            filter: None,
        };

        let resource = api_resource(&crd);
        assert_eq!(resource.api_version, "example.com/v1");
        assert_eq!(resource.kind, "Database");
        assert_eq!(resource.plural, "databases");
    }
}
