//! # Renderer module
//!
//! This module loads a directory of named template files and renders one
//! of them, together with any partial it invokes, against a custom
//! resource.

use std::path::{Path, PathBuf};

use handlebars::Handlebars;
use serde_json::Value;

use crate::svc::cr::CustomResourceView;

const TEMPLATE_EXTENSION: &str = "tmpl";

// -----------------------------------------------------------------------------
// Error enumeration

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("templates directory '{0}' does not exist")]
    NotFound(PathBuf),
    #[error("'{0}' is not a directory")]
    NotADirectory(PathBuf),
    #[error("failed to read templates directory '{0}', {1}")]
    ReadDir(PathBuf, std::io::Error),
    #[error("templates directory '{0}' contains no '*.tmpl' file")]
    Empty(PathBuf),
    #[error("failed to read template file '{0}', {1}")]
    ReadFile(PathBuf, std::io::Error),
    #[error("failed to register template '{0}', {1}")]
    Register(String, handlebars::TemplateError),
    #[error("failed to render template '{0}', {1}")]
    Render(String, handlebars::RenderError),
}

// -----------------------------------------------------------------------------
// Renderer structure

/// renders the first (lexicographically) `*.tmpl` file found in a
/// directory against a custom resource, making every other `*.tmpl` file in
/// that directory available to it as a named partial. Because partial
/// names carry their `.tmpl` extension, templates must reference each
/// other with the bracketed partial syntax, e.g. `{{> [file1.tmpl]}}`
pub struct Renderer {
    registry: Handlebars<'static>,
    entrypoint: String,
}

impl Renderer {
    /// loads every `*.tmpl` file under `path` as a named template. Fails
    /// if `path` does not exist, is not a directory, or contains no
    /// `*.tmpl` file
    pub fn load(path: &Path) -> Result<Self, Error> {
        if !path.exists() {
            return Err(Error::NotFound(path.to_path_buf()));
        }

        if !path.is_dir() {
            return Err(Error::NotADirectory(path.to_path_buf()));
        }

        let mut names: Vec<String> = std::fs::read_dir(path)
            .map_err(|err| Error::ReadDir(path.to_path_buf(), err))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().map(|ext| ext == TEMPLATE_EXTENSION).unwrap_or(false))
            .filter_map(|path| path.file_name().map(|name| name.to_string_lossy().into_owned()))
            .collect();

        names.sort();

        let entrypoint = names.first().ok_or_else(|| Error::Empty(path.to_path_buf()))?.to_owned();

        let mut registry = Handlebars::new();
        registry.register_helper("get_field", Box::new(get_field));

        for name in &names {
            let content = std::fs::read_to_string(path.join(name)).map_err(|err| Error::ReadFile(path.join(name), err))?;
            registry
                .register_template_string(name, content)
                .map_err(|err| Error::Register(name.to_owned(), err))?;
        }

        Ok(Self { registry, entrypoint })
    }

    /// renders the entrypoint template against the given custom resource
    pub fn render(&self, cr: &CustomResourceView) -> Result<String, Error> {
        let context = serde_json::to_value(cr.inner()).unwrap_or(Value::Null);

        self.registry
            .render(&self.entrypoint, &context)
            .map_err(|err| Error::Render(self.entrypoint.to_owned(), err))
    }
}

// -----------------------------------------------------------------------------
// Helpers

/// handlebars helper exposing the original `GetField` accessor: call as
/// `{{get_field "spec" "size"}}`, each argument a literal field name
/// traversed from the root of the custom resource. Renders nothing if the
/// field is absent or not a string
fn get_field(
    h: &handlebars::Helper,
    _: &Handlebars,
    ctx: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let mut current = ctx.data();

    for param in h.params() {
        let field = param.value().as_str().unwrap_or_default();
        current = match current.get(field) {
            Some(value) => value,
            None => return Ok(()),
        };
    }

    if let Some(value) = current.as_str() {
        out.write(value)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use kube::core::{DynamicObject, ObjectMeta};
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn load_fails_when_directory_missing() {
        let err = Renderer::load(Path::new("/does/not/exist")).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn load_fails_when_directory_empty() {
        let dir = tempdir().unwrap();
        let err = Renderer::load(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Empty(_)));
    }

    #[test]
    fn render_invokes_partial_and_get_field() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("0_base.tmpl"), "--- {{> [file1.tmpl]}}").unwrap();
        std::fs::write(
            dir.path().join("file1.tmpl"),
            "name: {{get_field \"metadata\" \"name\"}}-configmap",
        )
        .unwrap();

        let renderer = Renderer::load(dir.path()).unwrap();
        let cr = CustomResourceView::from(DynamicObject {
            types: None,
            metadata: ObjectMeta {
                name: Some("dory".to_string()),
                ..Default::default()
            },
            data: json!({ "spec": { "name": "Dory" } }),
        });

        let rendered = renderer.render(&cr).unwrap();
        assert_eq!(rendered, "--- name: dory-configmap");
    }
}
