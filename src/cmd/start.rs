//! # Start module
//!
//! This module provides the `start` subcommand: it builds the final
//! configuration from flags/file/environment, constructs the kubernetes
//! client, the watcher and the selected reconciler, and runs the watch
//! loop alongside the metrics/status http server until the process is
//! asked to shut down.

use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::Args as ClapArgs;
use tracing::{error, info};

use crate::{
    logging,
    svc::{
        cfg::{self, Configuration},
        http,
        k8s::{self, client, Context},
        reconciler::{chart, print, template},
        watcher::{WatchConfig, Watcher},
    },
};

// -----------------------------------------------------------------------------
// StartArgs structure

#[derive(ClapArgs, Clone, Debug)]
pub struct StartArgs {
    /// Name of the custom resource's plural resource
    #[arg(long = "crd-name")]
    pub crd_name: Option<String>,
    /// Api group of the custom resource
    #[arg(long = "crd-group")]
    pub crd_group: Option<String>,
    /// Api version of the custom resource
    #[arg(long = "crd-version")]
    pub crd_version: Option<String>,
    /// Namespace to restrict the watch to, cluster-scoped when unset
    #[arg(long = "crd-namespace")]
    pub crd_namespace: Option<String>,
    /// Annotation key gating the opt-in filter
    #[arg(long = "crd-filter")]
    pub crd_filter: Option<String>,
    /// Directory of `*.tmpl` files, selects the template reconciler
    #[arg(long = "templates")]
    pub templates: Option<PathBuf>,
    /// Local chart directory, selects the chart reconciler
    #[arg(long = "helm-chart")]
    pub helm_chart: Option<PathBuf>,
    /// Selects the print reconciler, which only logs
    #[arg(long = "nop")]
    pub nop: bool,
    /// Namespace releases are installed into
    #[arg(long = "helm-ns")]
    pub helm_ns: Option<String>,
    /// Prefix prepended to the custom resource name to derive the release name
    #[arg(long = "helm-prefix")]
    pub helm_prefix: Option<String>,
    /// Wait for resources to become ready during install/upgrade
    #[arg(long = "helm-wait")]
    pub helm_wait: bool,
    /// Seconds to wait for resources to become ready
    #[arg(long = "helm-wait-timeout")]
    pub helm_wait_timeout: Option<u64>,
    /// Path to the kubeconfig file, only used when not running in-cluster
    #[arg(short = 'k', long = "kube-config")]
    pub kube_config: Option<PathBuf>,
    /// Listen address of the metrics/status http server
    #[arg(long = "server-address")]
    pub server_address: Option<String>,
    /// Path the metrics series are exposed on
    #[arg(long = "metrics-endpoint")]
    pub metrics_endpoint: Option<String>,
    /// Path the status endpoint is exposed on
    #[arg(long = "status-endpoint")]
    pub status_endpoint: Option<String>,
    /// How often, in seconds, existing custom resources are resynced. Zero disables resync
    #[arg(long = "resync-interval-seconds")]
    pub resync_interval_seconds: Option<u64>,
    /// Path to a configuration file, defaults to `/etc/manifest-operator.yaml`
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
    /// Enable debug logging
    #[arg(long = "debug")]
    pub debug: bool,
}

// -----------------------------------------------------------------------------
// Error enumeration

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to load configuration, {0}")]
    Configuration(cfg::Error),
    #[error("failed to initialize logging, {0}")]
    Logging(logging::Error),
    #[error("failed to create kubernetes client, {0}")]
    Client(client::Error),
    #[error("failed to run the watch loop, {0}")]
    Watch(crate::svc::watcher::Error),
    #[error("failed to serve http endpoints, {0}")]
    Serve(http::server::Error),
}

// -----------------------------------------------------------------------------
// execute function

/// builds the configuration from the given flags, initializes logging and
/// runs the daemon until it is asked to shut down
pub async fn execute(args: &StartArgs) -> Result<(), Error> {
    let config = Arc::new(Configuration::try_from_args(args).map_err(Error::Configuration)?);

    logging::initialize(args.debug).map_err(Error::Logging)?;
    config.help();

    daemon(args.kube_config.to_owned(), config).await
}

/// assembles the kubernetes client, the watcher and the selected
/// reconciler, then runs the watch loop and the http server side by side
/// until either exits or the process receives a termination signal
pub async fn daemon(kube_config: Option<PathBuf>, config: Arc<Configuration>) -> Result<(), Error> {
    let kube = client::try_new(kube_config.to_owned()).await.map_err(Error::Client)?;

    let api_resource = k8s::api_resource(&config.crd);
    let api = k8s::api(kube.to_owned(), &api_resource, &config.crd);

    let watch_config = WatchConfig {
        namespace: config.crd.namespace.to_owned(),
        filter: config.crd.filter.to_owned(),
        resync: Duration::from_secs(config.resync_interval_seconds),
    };

    let context = Context::new(kube.to_owned(), config.to_owned());

    let server = tokio::spawn(http::server::serve(config.to_owned()));

    let watch = run_watcher(api, api_resource, watch_config, context, kube_config, &config);

    tokio::select! {
        result = watch => {
            result?;
        }
        result = server => {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(err)) => return Err(Error::Serve(err)),
                Err(err) => error!(error = err.to_string(), "http server task panicked"),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received termination signal, shutting down");
        }
    }

    Ok(())
}

/// dispatches to the watch loop backed by whichever reconciler the
/// configuration selects
async fn run_watcher(
    api: kube::Api<kube::core::DynamicObject>,
    api_resource: kube::api::ApiResource,
    watch_config: WatchConfig,
    context: Context,
    kube_config: Option<PathBuf>,
    config: &Arc<Configuration>,
) -> Result<(), Error> {
    if let Some(templates) = &config.render.templates {
        let reconciler = Arc::new(template::Reconciler::new(PathBuf::from(templates.to_owned()), kube_config));
        let watcher = Watcher::new(api, api_resource, watch_config, reconciler);

        info!("starting watch loop backed by the template reconciler");
        return watcher.watch().await.map_err(Error::Watch);
    }

    if let Some(chart_dir) = &config.render.helm_chart {
        let cache_root = std::env::temp_dir().join(env!("CARGO_PKG_NAME"));
        let source = chart::ChartSource::local(PathBuf::from(chart_dir.to_owned()), cache_root);
        let reconciler = Arc::new(chart::Reconciler::new(
            context,
            api_resource.to_owned(),
            source,
            config.helm.prefix.to_owned(),
            config.helm.namespace.to_owned(),
        ));
        let watcher = Watcher::new(api, api_resource, watch_config, reconciler);

        info!("starting watch loop backed by the chart reconciler");
        return watcher.watch().await.map_err(Error::Watch);
    }

    let reconciler = Arc::new(print::Reconciler);
    let watcher = Watcher::new(api, api_resource, watch_config, reconciler);

    info!("starting watch loop backed by the print reconciler");
    watcher.watch().await.map_err(Error::Watch)
}
