pub mod config;
pub mod error;
pub mod extract;
pub mod lockfile;
pub mod report;
pub mod retrieve;
pub mod scan;
pub mod types;

use std::path::{Path, PathBuf};

use anyhow::Context;
use reqwest::blocking::Client;
use tempfile::TempDir;

use crate::error::ExtractError;
use crate::scan::LicenseScanner;
use crate::types::{FileInfo, FileResults, Licenses, Requested, Selection};

/// What to analyze. Exactly one source per run.
#[derive(Debug, Clone)]
pub enum Source {
    Directory(PathBuf),
    File(PathBuf),
    Archive(PathBuf),
    Url(String),
    Package(String),
    Lockfile(PathBuf),
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub selection: Selection,
    pub index_url: Option<String>,
    pub prefer_sdist: bool,
    pub target_directory: Option<PathBuf>,
    pub download_only: bool,
}

/// Run the analysis for the given source and collect the per-file results
/// in enumeration order.
pub fn run(
    scanner: &dyn LicenseScanner,
    source: &Source,
    options: &RunOptions,
) -> anyhow::Result<Vec<FileResults>> {
    match source {
        Source::Directory(dir) => run_on_directory(scanner, dir, &options.selection, None),
        Source::File(path) => Ok(vec![run_on_file(
            scanner,
            path,
            &path.display().to_string(),
            &options.selection,
        )]),
        Source::Archive(path) => run_on_archive(scanner, path, &options.selection),
        Source::Url(url) => run_on_downloaded_archive(scanner, url, &options.selection),
        Source::Package(spec) => run_on_downloaded_package(scanner, spec, options),
        Source::Lockfile(path) => run_on_lockfile(scanner, path, options),
    }
}

fn requested<T>(wanted: bool, value: T) -> Requested<T> {
    if wanted {
        Requested::Found(value)
    } else {
        Requested::NotRequested
    }
}

fn collect_file_info(path: &Path, selection: &Selection) -> Requested<FileInfo> {
    if !selection.file_info {
        return Requested::NotRequested;
    }
    match FileInfo::collect(path) {
        Ok(info) => Requested::Found(info),
        Err(e) => {
            log::warn!("collecting file info for {} failed: {}", path.display(), e);
            Requested::NotRequested
        }
    }
}

/// Package-level shortcut for archives whose headers declare a license.
fn archive_file_results(path: &Path, short_path: &str) -> Option<FileResults> {
    let expression = extract::declared_rpm_license(path)?;
    let mut results = FileResults::skipped(path, short_path);
    results.licenses = Requested::Found(Licenses::declared(&expression));
    Some(results)
}

/// Analyze a single file. Archives that can be extracted further are not
/// content-scanned themselves; they show up with their header-declared
/// license or as an empty entry. Oracle failures degrade to empty results
/// so one bad file never aborts a batch.
pub fn run_on_file(
    scanner: &dyn LicenseScanner,
    path: &Path,
    short_path: &str,
    selection: &Selection,
) -> FileResults {
    if extract::can_extract(path) {
        return archive_file_results(path, short_path)
            .unwrap_or_else(|| FileResults::skipped(path, short_path));
    }

    let file_info = collect_file_info(path, selection);

    match scanner.scan(path, selection) {
        Ok(outcome) => FileResults {
            path: path.to_path_buf(),
            short_path: short_path.to_string(),
            copyrights: requested(selection.copyrights, outcome.copyrights),
            emails: requested(selection.emails, outcome.emails),
            urls: requested(selection.urls, outcome.urls),
            file_info,
            licenses: requested(selection.licenses, outcome.licenses),
        },
        Err(e) => {
            log::warn!(
                "scanning {} failed, reporting empty results: {}",
                path.display(),
                e
            );
            FileResults {
                path: path.to_path_buf(),
                short_path: short_path.to_string(),
                copyrights: requested(selection.copyrights, Vec::new()),
                emails: requested(selection.emails, Vec::new()),
                urls: requested(selection.urls, Vec::new()),
                file_info,
                licenses: requested(selection.licenses, Licenses::default()),
            }
        }
    }
}

/// Staging directory name for a nested archive, derived from its file
/// name: `pkg-1.0.tar.gz` stages into `pkg-1_0_tar_gz`. Deterministic so
/// the display paths of nested contents are stable across runs.
fn staging_dir_name(archive_name: &str) -> String {
    match archive_name.split_once('.') {
        Some((stem, chain)) => format!("{}_{}", stem, chain.replace('.', "_")),
        None => format!("{archive_name}_unpacked"),
    }
}

/// Scoped staging directory for nested archive contents, named after the
/// archive itself. Falls back to a random sibling when the fixed name is
/// already taken. Removed again on drop.
struct StagingDir {
    path: PathBuf,
    _fallback: Option<TempDir>,
}

impl StagingDir {
    fn create(parent: &Path, archive_name: &str) -> std::io::Result<Self> {
        let path = parent.join(staging_dir_name(archive_name));
        match std::fs::create_dir(&path) {
            Ok(()) => Ok(Self {
                path,
                _fallback: None,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                log::warn!(
                    "staging directory {} already exists, using a temporary one",
                    path.display()
                );
                let fallback = TempDir::new_in(parent)?;
                Ok(Self {
                    path: fallback.path().to_path_buf(),
                    _fallback: Some(fallback),
                })
            }
            Err(e) => Err(e),
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

/// Analyze every file below `directory`, then unpack any nested archives
/// and analyze their contents too. Display paths stay relative to `root`
/// (the directory itself unless a recursive call passes the original one),
/// with nested contents showing up under the archive's own staging name.
/// A nested archive that fails to unpack is logged and skipped; it never
/// aborts the batch.
pub fn run_on_directory(
    scanner: &dyn LicenseScanner,
    directory: &Path,
    selection: &Selection,
    root: Option<&Path>,
) -> anyhow::Result<Vec<FileResults>> {
    let root = root.unwrap_or(directory);
    let files = retrieve::files_from_directory(directory, root)
        .with_context(|| format!("enumerate {}", directory.display()))?;

    let mut results: Vec<FileResults> = files
        .iter()
        .map(|(path, short_path)| run_on_file(scanner, path, short_path, selection))
        .collect();

    for (path, _) in &files {
        if !extract::can_extract(path) {
            continue;
        }
        let parent = path.parent().unwrap_or(directory);
        let archive_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("archive");
        let staging = StagingDir::create(parent, archive_name)
            .with_context(|| format!("create staging directory in {}", parent.display()))?;
        match extract::extract(path, staging.path()) {
            Ok(()) => {
                results.extend(run_on_directory(scanner, staging.path(), selection, Some(root))?)
            }
            Err(e) => log::error!("extracting {} failed: {}", path.display(), e),
        }
    }

    Ok(results)
}

/// Analyze a package archive: header-level results first, then the
/// unpacked contents. Unsupported and corrupt archives are fatal here.
pub fn run_on_archive(
    scanner: &dyn LicenseScanner,
    archive_path: &Path,
    selection: &Selection,
) -> anyhow::Result<Vec<FileResults>> {
    let file_name = archive_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| archive_path.display().to_string());

    let mut results = Vec::new();
    if let Some(header_results) = archive_file_results(archive_path, &file_name) {
        results.push(header_results);
    }

    if !extract::can_extract(archive_path) {
        return Err(ExtractError::UnsupportedFormat(archive_path.to_path_buf()).into());
    }

    let working = TempDir::new().context("create working directory")?;
    extract::extract(archive_path, working.path())
        .with_context(|| format!("unpack {}", archive_path.display()))?;
    results.extend(run_on_directory(scanner, working.path(), selection, None)?);
    Ok(results)
}

/// Download an archive and analyze it. The downloaded file keeps the URL's
/// suffix chain so format detection works on it.
pub fn run_on_downloaded_archive(
    scanner: &dyn LicenseScanner,
    url: &str,
    selection: &Selection,
) -> anyhow::Result<Vec<FileResults>> {
    let client = Client::new();
    let suffix = retrieve::url_suffix(url);
    let downloaded = tempfile::Builder::new()
        .suffix(suffix.as_str())
        .tempfile()
        .context("create download file")?;
    retrieve::download_file(&client, url, downloaded.path())?;
    run_on_archive(scanner, downloaded.path(), selection)
}

/// Resolve a `NAME==VERSION` spec against the package index, download the
/// chosen artifact and analyze it.
pub fn run_on_downloaded_package(
    scanner: &dyn LicenseScanner,
    spec: &str,
    options: &RunOptions,
) -> anyhow::Result<Vec<FileResults>> {
    let client = Client::new();
    let artifact =
        retrieve::resolve_pypi(&client, options.index_url.as_deref(), spec, options.prefer_sdist)?;
    let download_dir = TempDir::new().context("create download directory")?;
    let archive_path = download_dir.path().join(&artifact.file_name);
    retrieve::download_file(&client, &artifact.url, &archive_path)?;
    run_on_archive(scanner, &archive_path, &options.selection)
}

/// Download every registry dependency of a lockfile, then analyze the
/// stored archives unless the run is download-only.
pub fn run_on_lockfile(
    scanner: &dyn LicenseScanner,
    lockfile_path: &Path,
    options: &RunOptions,
) -> anyhow::Result<Vec<FileResults>> {
    let packages = lockfile::load(lockfile_path)?;
    let client = Client::new();

    let staging;
    let download_dir = match &options.target_directory {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create target directory {}", dir.display()))?;
            dir.as_path()
        }
        None => {
            staging = TempDir::new().context("create download directory")?;
            staging.path()
        }
    };

    let mut archives = Vec::new();
    for package in &packages {
        let dest = download_dir.join(package.file_name());
        retrieve::download_file(&client, &package.download_url(), &dest)?;
        archives.push(dest);
    }

    if options.download_only {
        return Ok(Vec::new());
    }

    let mut results = Vec::new();
    for archive in &archives {
        results.extend(run_on_archive(scanner, archive, &options.selection)?);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScanError;
    use crate::scan::ScanOutcome;

    struct FixedScanner(ScanOutcome);

    impl LicenseScanner for FixedScanner {
        fn scan(&self, _path: &Path, _selection: &Selection) -> Result<ScanOutcome, ScanError> {
            Ok(self.0.clone())
        }
    }

    struct FailingScanner;

    impl LicenseScanner for FailingScanner {
        fn scan(&self, path: &Path, _selection: &Selection) -> Result<ScanOutcome, ScanError> {
            Err(ScanError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "boom"),
            })
        }
    }

    #[test]
    fn staging_names_follow_the_archive_name() {
        assert_eq!(staging_dir_name("vendored.whl"), "vendored_whl");
        assert_eq!(staging_dir_name("pkg-1.0.tar.gz"), "pkg-1_0_tar_gz");
        assert_eq!(staging_dir_name("archive"), "archive_unpacked");
    }

    #[test]
    fn scan_failure_degrades_to_empty_results() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.txt");
        std::fs::write(&path, b"hello").unwrap();

        let results = run_on_file(&FailingScanner, &path, "plain.txt", &Selection::default());
        assert_eq!(
            results.licenses,
            Requested::Found(Licenses::default())
        );
        assert_eq!(results.copyrights, Requested::NotRequested);
    }

    #[test]
    fn selection_gates_which_fields_are_requested() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.txt");
        std::fs::write(&path, b"hello").unwrap();

        let outcome = ScanOutcome {
            copyrights: vec!["Copyright (c) Example".to_string()],
            ..ScanOutcome::default()
        };
        let selection = Selection {
            copyrights: true,
            file_info: true,
            ..Selection::default()
        };

        let results = run_on_file(&FixedScanner(outcome), &path, "plain.txt", &selection);
        assert_eq!(
            results.copyrights,
            Requested::Found(vec!["Copyright (c) Example".to_string()])
        );
        assert!(results.file_info.is_requested());
        assert_eq!(results.emails, Requested::NotRequested);
    }

    #[test]
    fn archives_inside_directories_are_listed_but_not_scanned() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundle.zip");
        // Intentionally not a valid zip: the entry must still appear, and
        // the failed nested extraction must not abort the walk.
        std::fs::write(&path, b"not really a zip").unwrap();

        let results =
            run_on_directory(&FailingScanner, dir.path(), &Selection::default(), None).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].short_path, "bundle.zip");
        assert_eq!(results[0].licenses, Requested::Found(Licenses::default()));
    }

    #[test]
    fn unsupported_archive_is_fatal_for_archive_runs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.exe");
        std::fs::write(&path, b"MZ").unwrap();

        let err = run_on_archive(&FailingScanner, &path, &Selection::default()).unwrap_err();
        assert!(err
            .downcast_ref::<ExtractError>()
            .is_some_and(|e| matches!(e, ExtractError::UnsupportedFormat(_))));
    }
}
