//! # Engine module
//!
//! Renders a chart directory (a `templates/` directory of handlebars-able
//! yaml files) against a custom resource, then injects an owner reference
//! into every rendered document so the cluster garbage-collects the
//! release when the owning custom resource is deleted.

use std::path::Path;

use handlebars::Handlebars;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use serde_json::Value;
use serde_yaml::Value as YamlValue;

use crate::svc::cr::CustomResourceView;

const TEMPLATES_DIR: &str = "templates";
const TEMPLATE_EXTENSION: &str = "yaml";

// -----------------------------------------------------------------------------
// Error enumeration

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("chart directory '{0}' does not exist")]
    NotFound(std::path::PathBuf),
    #[error("chart directory '{0}' has no 'templates' subdirectory")]
    NoTemplatesDir(std::path::PathBuf),
    #[error("failed to read chart templates, {0}")]
    ReadDir(std::io::Error),
    #[error("failed to read template file '{0}', {1}")]
    ReadFile(std::path::PathBuf, std::io::Error),
    #[error("failed to register template '{0}', {1}")]
    Register(String, handlebars::TemplateError),
    #[error("failed to render template '{0}', {1}")]
    Render(String, handlebars::RenderError),
    #[error("rendered document '{0}' is not valid yaml, {1}")]
    InvalidYaml(String, serde_yaml::Error),
    #[error("failed to serialize document '{0}' back to yaml, {1}")]
    Serialize(String, serde_yaml::Error),
}

// -----------------------------------------------------------------------------
// Engine structure

/// renders every `templates/*.yaml` file of a chart against a custom
/// resource, then decorates the rendered documents with an owner reference
pub struct Engine {
    registry: Handlebars<'static>,
    names: Vec<String>,
}

impl Engine {
    pub fn load(chart_dir: &Path) -> Result<Self, Error> {
        if !chart_dir.exists() {
            return Err(Error::NotFound(chart_dir.to_path_buf()));
        }

        let templates_dir = chart_dir.join(TEMPLATES_DIR);
        if !templates_dir.is_dir() {
            return Err(Error::NoTemplatesDir(chart_dir.to_path_buf()));
        }

        let mut names: Vec<String> = std::fs::read_dir(&templates_dir)
            .map_err(Error::ReadDir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().map(|ext| ext == TEMPLATE_EXTENSION).unwrap_or(false))
            .filter_map(|path| path.file_name().map(|name| name.to_string_lossy().into_owned()))
            .collect();

        names.sort();

        let mut registry = Handlebars::new();
        for name in &names {
            let content = std::fs::read_to_string(templates_dir.join(name)).map_err(|err| Error::ReadFile(templates_dir.join(name), err))?;
            registry
                .register_template_string(name, content)
                .map_err(|err| Error::Register(name.to_owned(), err))?;
        }

        Ok(Self { registry, names })
    }

    /// renders every template, returning the filename and the rendered,
    /// owner-ref-decorated yaml document, in a deterministic order
    pub fn render(&self, cr: &CustomResourceView, owner: &OwnerReference) -> Result<Vec<(String, String)>, Error> {
        let context = serde_json::to_value(cr.inner()).unwrap_or(Value::Null);

        self.names
            .iter()
            .map(|name| {
                let rendered = self
                    .registry
                    .render(name, &context)
                    .map_err(|err| Error::Render(name.to_owned(), err))?;

                let decorated = add_owner_reference(name, &rendered, owner)?;
                Ok((name.to_owned(), decorated))
            })
            .collect()
    }
}

/// parses a single rendered yaml document and sets its `metadata.ownerReferences`
fn add_owner_reference(name: &str, rendered: &str, owner: &OwnerReference) -> Result<String, Error> {
    let mut document: YamlValue = serde_yaml::from_str(rendered).map_err(|err| Error::InvalidYaml(name.to_string(), err))?;

    let owner_value = serde_yaml::to_value(owner).map_err(|err| Error::Serialize(name.to_string(), err))?;

    if let YamlValue::Mapping(root) = &mut document {
        let metadata = root
            .entry(YamlValue::String("metadata".to_string()))
            .or_insert_with(|| YamlValue::Mapping(Default::default()));

        if let YamlValue::Mapping(metadata) = metadata {
            metadata.insert(
                YamlValue::String("ownerReferences".to_string()),
                YamlValue::Sequence(vec![owner_value]),
            );
        }
    }

    serde_yaml::to_string(&document).map_err(|err| Error::Serialize(name.to_string(), err))
}

#[cfg(test)]
mod tests {
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
    use kube::core::{DynamicObject, ObjectMeta};
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;

    fn owner() -> OwnerReference {
        OwnerReference {
            api_version: "example.com/v1".to_string(),
            kind: "Widget".to_string(),
            name: "my-widget".to_string(),
            uid: "11111111-1111-1111-1111-111111111111".to_string(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }

    #[test]
    fn render_injects_owner_reference() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("templates")).unwrap();
        std::fs::write(
            dir.path().join("templates/configmap.yaml"),
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cm\ndata:\n  size: \"{{spec.size}}\"\n",
        )
        .unwrap();

        let engine = Engine::load(dir.path()).unwrap();
        let cr = CustomResourceView::from(DynamicObject {
            types: None,
            metadata: ObjectMeta {
                name: Some("my-widget".to_string()),
                ..Default::default()
            },
            data: json!({ "spec": { "size": "large" } }),
        });

        let rendered = engine.render(&cr, &owner()).unwrap();
        assert_eq!(rendered.len(), 1);
        assert!(rendered[0].1.contains("ownerReferences"));
        assert!(rendered[0].1.contains("my-widget"));
    }

    #[test]
    fn load_fails_without_templates_dir() {
        let dir = tempdir().unwrap();
        let err = Engine::load(dir.path()).unwrap_err();
        assert!(matches!(err, Error::NoTemplatesDir(_)));
    }
}
