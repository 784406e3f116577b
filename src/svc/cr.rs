//! # Custom resource module
//!
//! This module provides a thin, read-only view over the dynamic custom
//! resource delivered by the watcher. It is the object handed to the
//! renderers and to the status codec.

use kube::{core::DynamicObject, Resource, ResourceExt};
use serde_json::Value;

// -----------------------------------------------------------------------------
// CustomResourceView structure

/// a read-only view over a [`DynamicObject`], exposing the few accessors
/// the reconcilers and renderers need without leaking the raw json shape
#[derive(Clone, Debug)]
pub struct CustomResourceView(DynamicObject);

impl From<DynamicObject> for CustomResourceView {
    fn from(obj: DynamicObject) -> Self {
        Self(obj)
    }
}

impl CustomResourceView {
    /// returns the name of the custom resource
    pub fn name(&self) -> String {
        self.0.name_any()
    }

    /// returns the namespace of the custom resource, `None` when it is
    /// cluster-scoped
    pub fn namespace(&self) -> Option<String> {
        self.0.namespace()
    }

    /// returns the unique identifier assigned by kubernetes
    pub fn uid(&self) -> Option<String> {
        self.0.uid()
    }

    /// returns the value of the given annotation, if set
    pub fn annotation(&self, key: &str) -> Option<&String> {
        self.0.annotations().get(key)
    }

    /// returns the raw `.spec` of the custom resource, or `Value::Null` if
    /// the resource has none
    pub fn spec(&self) -> &Value {
        self.0.data.get("spec").unwrap_or(&Value::Null)
    }

    /// returns the raw `.status` of the custom resource, or `Value::Null`
    /// if the resource has none
    pub fn status(&self) -> &Value {
        self.0.data.get("status").unwrap_or(&Value::Null)
    }

    /// traverses the resource's fields by path and returns the string value
    /// found there, or an empty string if the field is absent or not a string
    pub fn get_field(&self, fields: &[&str]) -> String {
        let mut current: &Value = &self.0.data;

        for field in fields {
            match current.get(field) {
                Some(value) => current = value,
                None => return String::new(),
            }
        }

        current.as_str().unwrap_or_default().to_string()
    }

    /// returns the inner dynamic object
    pub fn inner(&self) -> &DynamicObject {
        &self.0
    }

    /// consumes the view and returns the inner dynamic object
    pub fn into_inner(self) -> DynamicObject {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use kube::core::{ObjectMeta, TypeMeta};
    use serde_json::json;

    use super::*;

    fn view() -> CustomResourceView {
        CustomResourceView::from(DynamicObject {
            types: Some(TypeMeta {
                api_version: "example.com/v1".to_string(),
                kind: "Widget".to_string(),
            }),
            metadata: ObjectMeta {
                name: Some("my-widget".to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            data: json!({
                "spec": { "size": "large", "nested": { "color": "red" } },
                "status": { "phase": "Applied" },
            }),
        })
    }

    #[test]
    fn name_and_namespace() {
        let view = view();
        assert_eq!(view.name(), "my-widget");
        assert_eq!(view.namespace(), Some("default".to_string()));
    }

    #[test]
    fn get_field_traverses_nested_paths() {
        let view = view();
        assert_eq!(view.get_field(&["spec", "size"]), "large");
        assert_eq!(view.get_field(&["spec", "nested", "color"]), "red");
    }

    #[test]
    fn get_field_returns_empty_string_when_absent() {
        let view = view();
        assert_eq!(view.get_field(&["spec", "missing"]), "");
        assert_eq!(view.get_field(&["missing", "deeper"]), "");
    }

    #[test]
    fn spec_and_status_accessors() {
        let view = view();
        assert_eq!(view.spec()["size"], "large");
        assert_eq!(view.status()["phase"], "Applied");
    }
}
