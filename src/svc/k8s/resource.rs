//! # Resource module
//!
//! This module provide helpers on kubernetes dynamic [`Resource`]

use std::fmt::Debug;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{
    api::{ApiResource, Patch, PatchParams},
    Api, Client, Resource, ResourceExt,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

// -----------------------------------------------------------------------------
// Helpers functions

/// returns if the resource is considered from kubernetes point of view as deleted
pub fn deleted<T>(obj: &T) -> bool
where
    T: Resource,
{
    obj.meta().deletion_timestamp.is_some()
}

/// returns the namespace (when namespaced) and name of the kubernetes resource
pub fn namespaced_name<T>(obj: &T) -> (Option<String>, String)
where
    T: ResourceExt,
{
    (obj.namespace(), obj.name_any())
}

/// returns the difference between the two given objects, serialized as a json patch
pub fn diff<T>(origin: &T, modified: &T) -> Result<json_patch::Patch, serde_json::Error>
where
    T: Serialize,
{
    Ok(json_patch::diff(
        &serde_json::to_value(origin)?,
        &serde_json::to_value(modified)?,
    ))
}

/// makes a patch request on the given dynamic resource using the given patch
pub async fn patch<T>(
    client: Client,
    api_resource: &ApiResource,
    namespace: Option<&str>,
    obj: &T,
    patch: json_patch::Patch,
) -> Result<T, kube::Error>
where
    T: Resource<DynamicType = ApiResource> + DeserializeOwned + Serialize + Clone + Debug,
{
    let name = obj.name_any();

    if patch.0.is_empty() {
        debug!(name = &name, "skip patch request on resource, no operation to apply");
        return Ok(obj.to_owned());
    }

    let api: Api<T> = match namespace {
        Some(namespace) => Api::namespaced_with(client, namespace, api_resource),
        None => Api::all_with(client, api_resource),
    };

    debug!(
        name = &name,
        namespace = namespace.unwrap_or("<none>"),
        patch = serde_json::to_string(&patch).unwrap_or_default(),
        "execute patch request on resource"
    );
    api.patch(&name, &PatchParams::default(), &Patch::Json::<T>(patch))
        .await
}

/// makes a patch request on the given dynamic resource's status using the given patch
pub async fn patch_status<T>(
    client: Client,
    api_resource: &ApiResource,
    namespace: Option<&str>,
    obj: T,
    patch: json_patch::Patch,
) -> Result<T, kube::Error>
where
    T: Resource<DynamicType = ApiResource> + DeserializeOwned + Serialize + Clone + Debug,
{
    let name = obj.name_any();

    if patch.0.is_empty() {
        debug!(name = &name, "skip patch request on resource's status, no operation to apply");
        return Ok(obj);
    }

    let api: Api<T> = match namespace {
        Some(namespace) => Api::namespaced_with(client, namespace, api_resource),
        None => Api::all_with(client, api_resource),
    };

    debug!(
        name = &name,
        namespace = namespace.unwrap_or("<none>"),
        patch = serde_json::to_string(&patch).unwrap_or_default(),
        "execute patch request on resource's status"
    );
    api.patch_status(&name, &PatchParams::default(), &Patch::Json::<T>(patch))
        .await
}

/// returns an owner reference object pointing to the given resource, marking
/// it as the controller of the child it is attached to. `api_version` and
/// `kind` are taken from the caller rather than guessed, since only the
/// resource's own `TypeMeta` carries the authoritative values: a plural
/// resource name cannot be uniquely reversed into its `kind` (`ingresses`,
/// `postgresqls`, ...)
pub fn owner_reference<T>(obj: &T, api_version: impl Into<String>, kind: impl Into<String>) -> OwnerReference
where
    T: ResourceExt,
{
    OwnerReference {
        api_version: api_version.into(),
        block_owner_deletion: Some(true),
        controller: Some(true),
        kind: kind.into(),
        name: obj.name_any(),
        uid: obj
            .uid()
            .expect("resources returned by the kubernetes api to carry a uid"),
    }
}
