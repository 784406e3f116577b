//! # Kubectl module
//!
//! This module wraps the `kubectl` binary used by the template reconciler
//! to apply and delete rendered manifests.

use std::{path::Path, process::Command};

// -----------------------------------------------------------------------------
// Error enumeration

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to execute kubectl, {0}")]
    Spawn(std::io::Error),
    #[error("kubectl exited with a failure, {0}")]
    Failed(String),
}

// -----------------------------------------------------------------------------
// Kubectl structure

/// a thin wrapper around shelling out to `kubectl apply`/`kubectl delete`
#[derive(Clone, Debug, Default)]
pub struct Kubectl {
    pub kube_config: Option<std::path::PathBuf>,
}

impl Kubectl {
    pub fn apply(&self, file: &Path) -> Result<String, Error> {
        self.run(&["apply", "-f"], file)
    }

    pub fn delete(&self, file: &Path) -> Result<String, Error> {
        self.run(&["delete", "-f"], file)
    }

    fn run(&self, args: &[&str], file: &Path) -> Result<String, Error> {
        let mut command = Command::new("kubectl");
        command.args(args).arg(file);

        if let Some(path) = &self.kube_config {
            command.env("KUBECONFIG", path);
        }

        let output = command.output().map_err(Error::Spawn)?;
        let combined = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );

        if !output.status.success() {
            return Err(Error::Failed(combined));
        }

        Ok(combined)
    }
}
