use std::io::Write;
use std::path::{Path, PathBuf};

use reqwest::blocking::Client;
use serde::Deserialize;
use walkdir::WalkDir;

use crate::error::RetrievalError;

/// Enumerate the files below `directory`, recursively, as (absolute path,
/// path relative to `root`) pairs sorted by the relative path. `root` is
/// usually `directory` itself; nested-archive scans pass the original root
/// so display paths stay anchored there.
pub fn files_from_directory(
    directory: &Path,
    root: &Path,
) -> anyhow::Result<Vec<(PathBuf, String)>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(directory).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_file() && !entry.file_type().is_symlink() {
            continue;
        }
        let path = entry.path();
        let short_path = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned();
        files.push((path.to_path_buf(), short_path));
    }
    files.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(files)
}

/// Download `url` to `dest` without ever exposing a partial file: the body
/// goes to a temporary sibling first and is renamed into place at the end.
pub fn download_file(client: &Client, url: &str, dest: &Path) -> Result<(), RetrievalError> {
    log::info!("Downloading {} to {} ...", url, dest.display());

    let response = client
        .get(url)
        .send()
        .map_err(|source| RetrievalError::Http {
            url: url.to_string(),
            source,
        })?;
    if !response.status().is_success() {
        return Err(RetrievalError::Status {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }
    let body = response.bytes().map_err(|source| RetrievalError::Http {
        url: url.to_string(),
        source,
    })?;

    let io_error = |source: std::io::Error| RetrievalError::Io {
        path: dest.to_path_buf(),
        source,
    };
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    let mut staged = tempfile::NamedTempFile::new_in(parent).map_err(io_error)?;
    staged.write_all(&body).map_err(io_error)?;
    staged.persist(dest).map_err(|e| io_error(e.error))?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct ResolvedArtifact {
    pub url: String,
    pub file_name: String,
}

#[derive(Debug, Deserialize)]
struct PypiRelease {
    urls: Vec<PypiArtifact>,
}

#[derive(Debug, Deserialize)]
struct PypiArtifact {
    packagetype: String,
    url: String,
    filename: String,
}

pub const DEFAULT_INDEX_URL: &str = "https://pypi.org";

/// Resolve a `NAME==VERSION` spec against the package index JSON API,
/// preferring a wheel unless an sdist is asked for. Falls back to whatever
/// artifact the release carries when the preferred kind is missing.
pub fn resolve_pypi(
    client: &Client,
    index_url: Option<&str>,
    spec: &str,
    prefer_sdist: bool,
) -> Result<ResolvedArtifact, RetrievalError> {
    let (name, version) = spec
        .split_once("==")
        .map(|(n, v)| (n.trim(), v.trim()))
        .filter(|(n, v)| !n.is_empty() && !v.is_empty())
        .ok_or_else(|| RetrievalError::Spec(spec.to_string()))?;

    let base = index_url.unwrap_or(DEFAULT_INDEX_URL).trim_end_matches('/');
    let url = format!("{base}/pypi/{name}/{version}/json");

    let response = client
        .get(&url)
        .send()
        .map_err(|source| RetrievalError::Http {
            url: url.clone(),
            source,
        })?;
    if !response.status().is_success() {
        return Err(RetrievalError::Status {
            url,
            status: response.status().as_u16(),
        });
    }
    let release: PypiRelease =
        response
            .json()
            .map_err(|source| RetrievalError::Http {
                url: url.clone(),
                source,
            })?;

    let preferred = if prefer_sdist { "sdist" } else { "bdist_wheel" };
    let artifact = release
        .urls
        .iter()
        .find(|a| a.packagetype == preferred)
        .or_else(|| release.urls.first())
        .ok_or_else(|| RetrievalError::NoArtifact {
            spec: spec.to_string(),
        })?;

    Ok(ResolvedArtifact {
        url: artifact.url.clone(),
        file_name: artifact.filename.clone(),
    })
}

/// The suffix chain of the trailing URL segment, e.g. `.tar.gz` for
/// `https://host/pkg/foo-1.0.tar.gz`. Dotted versions contribute bogus
/// leading suffixes, which is harmless as long as the real ones survive.
pub fn url_suffix(url: &str) -> String {
    let name = url.rsplit('/').next().unwrap_or(url);
    match name.find('.') {
        Some(dot) => name[dot..].to_string(),
        None => String::new(),
    }
}
