//! # Watcher module
//!
//! This module watches the configured custom resource and dispatches
//! add/update/delete callbacks to a [`ResourceController`], after applying
//! the optional annotation-based opt-in filter and driving the periodic
//! resync.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use futures::TryStreamExt;
use kube::{
    api::ApiResource,
    core::DynamicObject,
    runtime::watcher::{self, watcher, Config as WatcherConfig, Event},
    Api, ResourceExt,
};
use tracing::{debug, error, info, trace};

use crate::svc::cr::CustomResourceView;

// -----------------------------------------------------------------------------
// WatchConfig structure

#[derive(Clone, Debug)]
pub struct WatchConfig {
    pub namespace: Option<String>,
    pub filter: Option<String>,
    pub resync: Duration,
}

// -----------------------------------------------------------------------------
// ResourceController trait

/// receives add/update/delete callbacks for every delta the watcher
/// classifies on the configured custom resource
#[async_trait]
pub trait ResourceController: Send + Sync {
    async fn resource_added(&self, resource: CustomResourceView);
    async fn resource_updated(&self, old: CustomResourceView, new: CustomResourceView);
    async fn resource_deleted(&self, resource: CustomResourceView);
}

// -----------------------------------------------------------------------------
// Error enumeration

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("the watcher has not been initialized")]
    NotInitialized,
}

// -----------------------------------------------------------------------------
// Watcher structure

pub struct Watcher<C> {
    api: Api<DynamicObject>,
    api_resource: ApiResource,
    config: WatchConfig,
    controller: Arc<C>,
}

impl<C> Watcher<C>
where
    C: ResourceController + 'static,
{
    pub fn new(api: Api<DynamicObject>, api_resource: ApiResource, config: WatchConfig, controller: Arc<C>) -> Self {
        Self {
            api,
            api_resource,
            config,
            controller,
        }
    }

    /// returns whether the opt-in filter lets the given resource through.
    /// Resources pass unconditionally when no filter is configured
    fn passes_filtering(&self, obj: &DynamicObject) -> bool {
        match &self.config.filter {
            None => true,
            Some(key) => obj.annotations().contains_key(key),
        }
    }

    fn key(obj: &DynamicObject) -> (Option<String>, String) {
        (obj.namespace(), obj.name_any())
    }

    /// runs the watch loop until the process is cancelled. All deltas are
    /// passed through [`ResourceController`]; the watcher never returns
    /// `Err` once started, transport errors are logged and retried by the
    /// underlying reflector
    pub async fn watch(&self) -> Result<(), Error> {
        let mut cache: HashMap<(Option<String>, String), DynamicObject> = HashMap::new();
        let mut stream = watcher(self.api.to_owned(), WatcherConfig::default()).boxed();

        let mut resync = match self.config.resync.is_zero() {
            true => None,
            false => Some(tokio::time::interval(self.config.resync)),
        };

        loop {
            tokio::select! {
                event = stream.try_next() => {
                    match event {
                        Ok(Some(event)) => self.handle(&mut cache, event).await,
                        Ok(None) => {
                            debug!("reached the end of the watch stream");
                            return Ok(());
                        }
                        Err(err) => {
                            error!(kind = &self.api_resource.kind, error = err.to_string(), "transport error while watching custom resource");
                        }
                    }
                }
                _ = async { resync.as_mut().unwrap().tick().await }, if resync.is_some() => {
                    self.fire_resync(&cache).await;
                }
            }
        }
    }

    async fn handle(&self, cache: &mut HashMap<(Option<String>, String), DynamicObject>, event: Event<DynamicObject>) {
        match event {
            Event::Applied(obj) => {
                let key = Self::key(&obj);

                match cache.insert(key, obj.to_owned()) {
                    Some(old) => self.dispatch_update(old, obj).await,
                    None => self.dispatch_add(obj).await,
                }
            }
            Event::Deleted(obj) => {
                let key = Self::key(&obj);
                cache.remove(&key);
                self.dispatch_delete(obj).await;
            }
            Event::Restarted(objs) => {
                trace!(kind = &self.api_resource.kind, count = objs.len(), "received a full relist of the custom resource");

                let mut seen = std::collections::HashSet::new();
                for obj in objs {
                    let key = Self::key(&obj);
                    seen.insert(key.to_owned());

                    match cache.insert(key, obj.to_owned()) {
                        Some(old) => self.dispatch_update(old, obj).await,
                        None => self.dispatch_add(obj).await,
                    }
                }

                let stale: Vec<_> = cache.keys().filter(|key| !seen.contains(*key)).cloned().collect();
                for key in stale {
                    if let Some(obj) = cache.remove(&key) {
                        self.dispatch_delete(obj).await;
                    }
                }
            }
        }
    }

    async fn fire_resync(&self, cache: &HashMap<(Option<String>, String), DynamicObject>) {
        info!(kind = &self.api_resource.kind, count = cache.len(), "resyncing custom resources");

        for obj in cache.values() {
            self.dispatch_update(obj.to_owned(), obj.to_owned()).await;
        }
    }

    /// implements the exact precedence of the original opt-in filter: an
    /// update only reaches the controller as `Updated` when both states
    /// pass; it degrades to `Added`/`Deleted` when only one side passes,
    /// and is dropped entirely when neither does
    async fn dispatch_update(&self, old: DynamicObject, new: DynamicObject) {
        let new_passes = self.passes_filtering(&new);
        let old_passes = self.passes_filtering(&old);

        if new_passes && old_passes {
            self.controller
                .resource_updated(CustomResourceView::from(old), CustomResourceView::from(new))
                .await;
        } else if new_passes {
            self.controller.resource_added(CustomResourceView::from(new)).await;
        } else if old_passes {
            self.controller.resource_deleted(CustomResourceView::from(old)).await;
        }
    }

    async fn dispatch_add(&self, obj: DynamicObject) {
        if self.passes_filtering(&obj) {
            self.controller.resource_added(CustomResourceView::from(obj)).await;
        }
    }

    async fn dispatch_delete(&self, obj: DynamicObject) {
        if self.passes_filtering(&obj) {
            self.controller.resource_deleted(CustomResourceView::from(obj)).await;
        }
    }
}

trait BoxStreamExt: futures::Stream + Sized {
    fn boxed<'a>(self) -> std::pin::Pin<Box<dyn futures::Stream<Item = Self::Item> + Send + 'a>>
    where
        Self: Send + 'a,
    {
        Box::pin(self)
    }
}

impl<T: futures::Stream + Sized> BoxStreamExt for T {}

#[cfg(test)]
mod tests {
    use kube::core::{ObjectMeta, TypeMeta};
    use std::collections::BTreeMap;

    use super::*;

    fn obj(name: &str, annotated: bool) -> DynamicObject {
        let mut annotations = BTreeMap::new();
        if annotated {
            annotations.insert("example.com/watch".to_string(), "true".to_string());
        }

        DynamicObject {
            types: Some(TypeMeta {
                api_version: "example.com/v1".to_string(),
                kind: "Widget".to_string(),
            }),
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                annotations: Some(annotations),
                ..Default::default()
            },
            data: serde_json::json!({}),
        }
    }

    fn watcher_with_filter(filter: Option<&str>) -> Watcher<NoopController> {
        let api_resource = ApiResource {
            group: "example.com".to_string(),
            version: "v1".to_string(),
            api_version: "example.com/v1".to_string(),
            kind: "Widget".to_string(),
            plural: "widgets".to_string(),
        };

        Watcher {
            api: Api::all_with(unreachable_client(), &api_resource),
            api_resource,
            config: WatchConfig {
                namespace: None,
                filter: filter.map(str::to_string),
                resync: Duration::ZERO,
            },
            controller: Arc::new(NoopController),
        }
    }

    fn unreachable_client() -> kube::Client {
        // never used by the tests below, only Api construction requires a client handle
        let uri: http::Uri = "https://localhost:1".parse().expect("valid uri");
        kube::Client::try_from(kube::Config::new(uri)).expect("client construction to never touch the network")
    }

    struct NoopController;

    #[async_trait]
    impl ResourceController for NoopController {
        async fn resource_added(&self, _resource: CustomResourceView) {}
        async fn resource_updated(&self, _old: CustomResourceView, _new: CustomResourceView) {}
        async fn resource_deleted(&self, _resource: CustomResourceView) {}
    }

    #[test]
    fn passes_filtering_always_true_without_filter() {
        let watcher = watcher_with_filter(None);
        assert!(watcher.passes_filtering(&obj("a", false)));
        assert!(watcher.passes_filtering(&obj("a", true)));
    }

    #[test]
    fn passes_filtering_requires_annotation_when_configured() {
        let watcher = watcher_with_filter(Some("example.com/watch"));
        assert!(!watcher.passes_filtering(&obj("a", false)));
        assert!(watcher.passes_filtering(&obj("a", true)));
    }
}
