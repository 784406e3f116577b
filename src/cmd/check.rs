//! # Check module
//!
//! This module provides the `check` subcommand: it renders the template
//! directory against a single custom resource file and prints the result
//! to stdout, without touching the cluster. Useful to validate a template
//! bundle before pointing the operator at it.

use std::path::PathBuf;

use clap::Args as ClapArgs;
use kube::core::DynamicObject;

use crate::svc::{cr::CustomResourceView, reconciler::template::renderer::{self, Renderer}};

// -----------------------------------------------------------------------------
// CheckArgs structure

#[derive(ClapArgs, Clone, Debug)]
pub struct CheckArgs {
    /// Path to a single custom resource file, as yaml or json
    #[arg(long = "cr")]
    pub cr: PathBuf,
    /// Directory of `*.tmpl` files to render the custom resource against
    #[arg(long = "templates")]
    pub templates: PathBuf,
}

// -----------------------------------------------------------------------------
// Error enumeration

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("your templates directory does not exist")]
    TemplatesNotFound,
    #[error("your templates path is not a directory")]
    TemplatesNotADirectory,
    #[error("your CR file does not exist")]
    CrNotFound,
    #[error("your CR path is not a file")]
    CrNotAFile,
    #[error("failed to read your CR file, {0}")]
    ReadCr(std::io::Error),
    #[error("your CR file is not valid yaml, {0}")]
    ParseCr(serde_yaml::Error),
    #[error("failed to load templates, {0}")]
    LoadTemplates(renderer::Error),
    #[error("failed to render templates against your CR, {0}")]
    Render(renderer::Error),
}

// -----------------------------------------------------------------------------
// execute function

/// renders `args.templates` against `args.cr` and writes the result to
/// stdout. Fails fast, with a message naming the first offending input,
/// when the templates directory or the CR file is missing or of the wrong
/// kind
pub fn execute(args: &CheckArgs) -> Result<(), Error> {
    if !args.templates.exists() {
        return Err(Error::TemplatesNotFound);
    }
    if !args.templates.is_dir() {
        return Err(Error::TemplatesNotADirectory);
    }

    if !args.cr.exists() {
        return Err(Error::CrNotFound);
    }
    if !args.cr.is_file() {
        return Err(Error::CrNotAFile);
    }

    let content = std::fs::read_to_string(&args.cr).map_err(Error::ReadCr)?;
    let object: DynamicObject = serde_yaml::from_str(&content).map_err(Error::ParseCr)?;
    let cr = CustomResourceView::from(object);

    let renderer = Renderer::load(&args.templates).map_err(Error::LoadTemplates)?;
    let rendered = renderer.render(&cr).map_err(Error::Render)?;

    println!("{}", rendered);
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn execute_fails_when_cr_file_missing() {
        let templates = tempdir().unwrap();
        std::fs::write(templates.path().join("0_base.tmpl"), "name: test").unwrap();

        let args = CheckArgs {
            cr: PathBuf::from("/no/such/file.yaml"),
            templates: templates.path().to_path_buf(),
        };

        assert!(matches!(execute(&args), Err(Error::CrNotFound)));
    }

    #[test]
    fn execute_fails_when_templates_dir_missing() {
        let cr = tempdir().unwrap();
        let cr_file = cr.path().join("widget.yaml");
        std::fs::write(&cr_file, "metadata:\n  name: dory\n").unwrap();

        let args = CheckArgs {
            cr: cr_file,
            templates: PathBuf::from("/no/such/dir"),
        };

        assert!(matches!(execute(&args), Err(Error::TemplatesNotFound)));
    }

    #[test]
    fn execute_renders_cr_against_templates() {
        let templates = tempdir().unwrap();
        std::fs::write(
            templates.path().join("0_base.tmpl"),
            "name: {{get_field \"metadata\" \"name\"}}-configmap",
        )
        .unwrap();

        let cr = tempdir().unwrap();
        let cr_file = cr.path().join("widget.yaml");
        std::fs::write(&cr_file, "metadata:\n  name: dory\n").unwrap();

        let args = CheckArgs {
            cr: cr_file,
            templates: templates.path().to_path_buf(),
        };

        assert!(execute(&args).is_ok());
    }
}
