//! # Configuration module
//!
//! This module provide utilities and helpers to interact with the configuration
//! of the `start` command. Flags take priority, the config file and the
//! environment provide fallbacks for unset flags.

use std::path::PathBuf;

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cmd::start::StartArgs;

// -----------------------------------------------------------------------------
// Constants

pub const DEFAULT_CRD_VERSION: &str = "v1";
pub const DEFAULT_HELM_NAMESPACE: &str = "default";
pub const DEFAULT_HELM_PREFIX: &str = "manifest-operator";
pub const DEFAULT_HELM_WAIT_TIMEOUT: u64 = 120;
pub const DEFAULT_SERVER_ADDRESS: &str = "0.0.0.0:8080";
pub const DEFAULT_METRICS_ENDPOINT: &str = "/metrics";
pub const DEFAULT_STATUS_ENDPOINT: &str = "/status";
pub const DEFAULT_CONFIG_PATH: &str = "/etc/manifest-operator.yaml";

// -----------------------------------------------------------------------------
// Crd structure

#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
pub struct Crd {
    pub name: String,
    pub group: String,
    #[serde(default = "default_crd_version")]
    pub version: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub filter: Option<String>,
}

fn default_crd_version() -> String {
    DEFAULT_CRD_VERSION.to_string()
}

// -----------------------------------------------------------------------------
// Render structure

/// selects exactly one of the three reconciler implementations
#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug, Default)]
pub struct Render {
    #[serde(default)]
    pub templates: Option<String>,
    #[serde(default)]
    pub helm_chart: Option<String>,
    #[serde(default)]
    pub nop: bool,
}

// -----------------------------------------------------------------------------
// Helm structure

#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
pub struct Helm {
    #[serde(default = "default_helm_namespace")]
    pub namespace: String,
    #[serde(default = "default_helm_prefix")]
    pub prefix: String,
    #[serde(default)]
    pub wait: bool,
    #[serde(default = "default_helm_wait_timeout")]
    pub wait_timeout: u64,
}

fn default_helm_namespace() -> String {
    DEFAULT_HELM_NAMESPACE.to_string()
}

fn default_helm_prefix() -> String {
    DEFAULT_HELM_PREFIX.to_string()
}

fn default_helm_wait_timeout() -> u64 {
    DEFAULT_HELM_WAIT_TIMEOUT
}

// -----------------------------------------------------------------------------
// Server structure

#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
pub struct Server {
    #[serde(default = "default_server_address")]
    pub address: String,
    #[serde(default = "default_metrics_endpoint")]
    pub metrics_endpoint: String,
    #[serde(default = "default_status_endpoint")]
    pub status_endpoint: String,
}

fn default_server_address() -> String {
    DEFAULT_SERVER_ADDRESS.to_string()
}

fn default_metrics_endpoint() -> String {
    DEFAULT_METRICS_ENDPOINT.to_string()
}

fn default_status_endpoint() -> String {
    DEFAULT_STATUS_ENDPOINT.to_string()
}

// -----------------------------------------------------------------------------
// Error enumeration

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to load configuration, {0}")]
    Build(ConfigError),
    #[error("failed to deserialize configuration, {0}")]
    Deserialize(ConfigError),
    #[error("failed to set override for key '{0}', {1}")]
    Override(String, ConfigError),
    #[error("configuration is missing required key '{0}'")]
    MissingRequired(&'static str),
    #[error("'--templates', '--helm-chart' and '--nop' are mutually exclusive, pick exactly one")]
    AmbiguousRenderer,
}

// -----------------------------------------------------------------------------
// Configuration structure

#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
pub struct Configuration {
    pub crd: Crd,
    #[serde(default)]
    pub render: Render,
    pub helm: Helm,
    pub server: Server,
    /// how often existing CRs are resynced (re-delivered as synthetic
    /// updates); zero disables periodic resync
    #[serde(default)]
    pub resync_interval_seconds: u64,
}

impl Configuration {
    /// builds the final configuration by layering, from lowest to highest
    /// priority: built-in defaults, an optional configuration file, the
    /// environment, and the flags given on the command line
    pub fn try_from_args(args: &StartArgs) -> Result<Self, Error> {
        let mut builder = Config::builder()
            .set_default("crd.version", DEFAULT_CRD_VERSION)
            .map_err(|err| Error::Override("crd.version".into(), err))?
            .set_default("helm.namespace", DEFAULT_HELM_NAMESPACE)
            .map_err(|err| Error::Override("helm.namespace".into(), err))?
            .set_default("helm.prefix", DEFAULT_HELM_PREFIX)
            .map_err(|err| Error::Override("helm.prefix".into(), err))?
            .set_default("helm.wait", false)
            .map_err(|err| Error::Override("helm.wait".into(), err))?
            .set_default("helm.wait_timeout", DEFAULT_HELM_WAIT_TIMEOUT as i64)
            .map_err(|err| Error::Override("helm.wait_timeout".into(), err))?
            .set_default("server.address", DEFAULT_SERVER_ADDRESS)
            .map_err(|err| Error::Override("server.address".into(), err))?
            .set_default("server.metrics_endpoint", DEFAULT_METRICS_ENDPOINT)
            .map_err(|err| Error::Override("server.metrics_endpoint".into(), err))?
            .set_default("server.status_endpoint", DEFAULT_STATUS_ENDPOINT)
            .map_err(|err| Error::Override("server.status_endpoint".into(), err))?
            .set_default("resync_interval_seconds", 0)
            .map_err(|err| Error::Override("resync_interval_seconds".into(), err))?;

        if let Some(path) = &args.config {
            builder = builder.add_source(File::new(
                path.to_string_lossy().as_ref(),
                FileFormat::Yaml,
            ));
        } else {
            builder = builder
                .add_source(File::new(DEFAULT_CONFIG_PATH, FileFormat::Yaml).required(false));
        }

        builder = builder.add_source(Environment::with_prefix("MANIFEST_OPERATOR").separator("_"));

        macro_rules! overlay {
            ($builder:ident, $key:literal, $value:expr) => {
                if let Some(value) = $value {
                    $builder = $builder
                        .set_override($key, value)
                        .map_err(|err| Error::Override($key.into(), err))?;
                }
            };
        }

        overlay!(builder, "crd.name", args.crd_name.clone());
        overlay!(builder, "crd.group", args.crd_group.clone());
        overlay!(builder, "crd.version", args.crd_version.clone());
        overlay!(builder, "crd.namespace", args.crd_namespace.clone());
        overlay!(builder, "crd.filter", args.crd_filter.clone());
        overlay!(
            builder,
            "render.templates",
            args.templates.as_ref().map(|p| p.to_string_lossy().to_string())
        );
        overlay!(
            builder,
            "render.helm_chart",
            args.helm_chart.as_ref().map(|p| p.to_string_lossy().to_string())
        );
        if args.nop {
            builder = builder
                .set_override("render.nop", true)
                .map_err(|err| Error::Override("render.nop".into(), err))?;
        }
        overlay!(builder, "helm.namespace", args.helm_ns.clone());
        overlay!(builder, "helm.prefix", args.helm_prefix.clone());
        if args.helm_wait {
            builder = builder
                .set_override("helm.wait", true)
                .map_err(|err| Error::Override("helm.wait".into(), err))?;
        }
        overlay!(builder, "helm.wait_timeout", args.helm_wait_timeout.map(|v| v as i64));
        overlay!(builder, "server.address", args.server_address.clone());
        overlay!(builder, "server.metrics_endpoint", args.metrics_endpoint.clone());
        overlay!(builder, "server.status_endpoint", args.status_endpoint.clone());
        overlay!(
            builder,
            "resync_interval_seconds",
            args.resync_interval_seconds.map(|v| v as i64)
        );

        let config: Self = builder
            .build()
            .map_err(Error::Build)?
            .try_deserialize()
            .map_err(Error::Deserialize)?;

        config.validate()?;
        Ok(config)
    }

    /// validates that the invariants promised by the process supervisor hold:
    /// plural-name, group and version are non-empty, and exactly one
    /// renderer is selected
    pub fn validate(&self) -> Result<(), Error> {
        if self.crd.name.is_empty() {
            return Err(Error::MissingRequired("crd-name"));
        }

        if self.crd.group.is_empty() {
            return Err(Error::MissingRequired("crd-group"));
        }

        if self.crd.version.is_empty() {
            return Err(Error::MissingRequired("crd-version"));
        }

        let selected = [
            self.render.templates.is_some(),
            self.render.helm_chart.is_some(),
            self.render.nop,
        ]
        .into_iter()
        .filter(|selected| *selected)
        .count();

        if selected != 1 {
            return Err(Error::AmbiguousRenderer);
        }

        Ok(())
    }

    /// logs warnings about configuration that is present but suspicious
    pub fn help(&self) {
        if self.crd.namespace.is_none() {
            warn!("No 'crd-namespace' configured, the custom resource is expected to be cluster-scoped");
        }

        if self.crd.filter.is_none() {
            warn!("No 'crd-filter' configured, every custom resource delta will be reconciled");
        }

        if self.resync_interval_seconds == 0 {
            warn!("No periodic resync configured, filter transitions on untouched custom resources will not be observed");
        }
    }
}
