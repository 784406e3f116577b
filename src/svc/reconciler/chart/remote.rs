//! # Remote chart module
//!
//! Resolves a `<repo>/<chart>:<version>` reference, carried on the
//! `chart` annotation of a custom resource, into a local directory holding
//! the extracted chart.

use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::URL_SAFE, Engine};
use serde::Deserialize;

use crate::svc::metrics;

// -----------------------------------------------------------------------------
// Error enumeration

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("chart reference '{0}' does not name a chart")]
    MissingChartName(String),
    #[error("failed to fetch repository index from '{0}', {1}")]
    FetchIndex(String, reqwest::Error),
    #[error("failed to parse repository index from '{0}', {1}")]
    ParseIndex(String, serde_yaml::Error),
    #[error("chart '{0}' version '{1}' not found in repository index")]
    ChartNotFound(String, String),
    #[error("failed to download chart archive from '{0}', {1}")]
    Download(String, reqwest::Error),
    #[error("failed to create cache directory '{0}', {1}")]
    CreateCacheDir(PathBuf, std::io::Error),
    #[error("failed to write chart archive to '{0}', {1}")]
    WriteArchive(PathBuf, std::io::Error),
    #[error("failed to extract chart archive, {0}")]
    Extract(std::io::Error),
}

// -----------------------------------------------------------------------------
// Index structures

#[derive(Deserialize, Debug)]
struct RepositoryIndex {
    entries: std::collections::BTreeMap<String, Vec<ChartVersion>>,
}

#[derive(Deserialize, Debug, Clone)]
struct ChartVersion {
    version: String,
    urls: Vec<String>,
}

// -----------------------------------------------------------------------------
// Helpers

/// splits a `<repo>/<chart>:<version>` reference into its repository url,
/// chart name and optional version. The version, when omitted, resolves to
/// the newest entry listed in the repository index
pub fn split_chart_ref(chart_ref: &str) -> Result<(String, String, Option<String>), Error> {
    let (path, version) = match chart_ref.rsplit_once(':') {
        Some((path, version)) => (path, Some(version.trim().to_string())),
        None => (chart_ref, None),
    };

    let (repo, name) = path
        .rsplit_once('/')
        .ok_or_else(|| Error::MissingChartName(chart_ref.to_string()))?;

    Ok((repo.trim().to_string(), name.trim().to_string(), version))
}

/// deterministic, filesystem-safe cache directory for a resolved chart
/// archive, namespaced under the os temp root
pub fn cache_dir(cache_root: &Path, chart_ref: &str, archive_filename: &str) -> PathBuf {
    let hash = URL_SAFE.encode(archive_filename);
    cache_root.join(sanitize(chart_ref)).join(hash)
}

fn sanitize(value: &str) -> String {
    value.chars().map(|c| if c.is_alphanumeric() || c == '-' || c == '.' { c } else { '_' }).collect()
}

// -----------------------------------------------------------------------------
// Resolver

/// downloads and extracts the chart named by `chart_ref`, returning the
/// directory the chart was extracted into. Reuses the cache directory
/// across calls, skipping the download when it is already populated
pub async fn resolve(client: &reqwest::Client, cache_root: &Path, chart_ref: &str) -> Result<PathBuf, Error> {
    let (repo, name, version) = split_chart_ref(chart_ref)?;

    let result = resolve_inner(client, cache_root, chart_ref, &repo, &name, version).await;

    match &result {
        Ok(_) => metrics::REMOTE_REPO_TOTAL.inc(),
        Err(_) => metrics::REMOTE_REPO_ERROR_TOTAL.inc(),
    }

    result
}

async fn resolve_inner(
    client: &reqwest::Client,
    cache_root: &Path,
    chart_ref: &str,
    repo: &str,
    name: &str,
    version: Option<String>,
) -> Result<PathBuf, Error> {
    let index_url = format!("{}/index.yaml", repo.trim_end_matches('/'));
    let body = client
        .get(&index_url)
        .send()
        .await
        .map_err(|err| Error::FetchIndex(index_url.to_owned(), err))?
        .text()
        .await
        .map_err(|err| Error::FetchIndex(index_url.to_owned(), err))?;

    let index: RepositoryIndex = serde_yaml::from_str(&body).map_err(|err| Error::ParseIndex(index_url, err))?;

    let candidates = index.entries.get(name).cloned().unwrap_or_default();
    let selected = match &version {
        Some(version) => candidates.iter().find(|candidate| &candidate.version == version),
        None => candidates.first(),
    }
    .ok_or_else(|| Error::ChartNotFound(name.to_string(), version.clone().unwrap_or_else(|| "latest".to_string())))?;

    let url = selected
        .urls
        .first()
        .ok_or_else(|| Error::ChartNotFound(name.to_string(), selected.version.to_owned()))?;

    let archive_filename = url.rsplit('/').next().unwrap_or(url).to_string();
    let dir = cache_dir(cache_root, chart_ref, &archive_filename);

    if dir.exists() {
        return Ok(dir);
    }

    std::fs::create_dir_all(&dir).map_err(|err| Error::CreateCacheDir(dir.to_owned(), err))?;

    let archive = client
        .get(url)
        .send()
        .await
        .map_err(|err| Error::Download(url.to_owned(), err))?
        .bytes()
        .await
        .map_err(|err| Error::Download(url.to_owned(), err))?;

    let archive_path = dir.join(&archive_filename);
    std::fs::write(&archive_path, &archive).map_err(|err| Error::WriteArchive(archive_path.to_owned(), err))?;

    let tar = flate2::read::GzDecoder::new(std::fs::File::open(&archive_path).map_err(Error::Extract)?);
    tar::Archive::new(tar).unpack(&dir).map_err(Error::Extract)?;

    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_chart_ref_extracts_repo_name_and_version() {
        let (repo, name, version) = split_chart_ref("https://charts.example.com/stable/mychart:1.2.3").unwrap();
        assert_eq!(repo, "https://charts.example.com/stable");
        assert_eq!(name, "mychart");
        assert_eq!(version, Some("1.2.3".to_string()));
    }

    #[test]
    fn split_chart_ref_allows_missing_version() {
        let (repo, name, version) = split_chart_ref("https://charts.example.com/stable/mychart").unwrap();
        assert_eq!(repo, "https://charts.example.com/stable");
        assert_eq!(name, "mychart");
        assert_eq!(version, None);
    }

    #[test]
    fn split_chart_ref_rejects_missing_chart_name() {
        assert!(split_chart_ref("mychart:1.2.3").is_err());
    }

    #[test]
    fn cache_dir_is_deterministic() {
        let root = Path::new("/tmp/manifest-operator");
        let a = cache_dir(root, "repo/mychart:1.2.3", "mychart-1.2.3.tgz");
        let b = cache_dir(root, "repo/mychart:1.2.3", "mychart-1.2.3.tgz");
        assert_eq!(a, b);
    }
}
