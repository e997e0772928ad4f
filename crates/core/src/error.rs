use std::path::PathBuf;

use thiserror::Error;

/// Failure while resolving or downloading a package artifact. Always fatal
/// for the run and always carries the URL or spec that failed.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("request for {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("no downloadable artifact found for {spec}")]
    NoArtifact { spec: String },

    #[error("invalid package spec `{0}`, expected NAME==VERSION")]
    Spec(String),

    #[error("writing download to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure while unpacking one archive. Fatal for that input, but callers
/// scanning a batch keep going. The extraction target is removed before
/// either variant is returned.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported archive format: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("corrupt archive {path}: {reason}")]
    CorruptArchive { path: PathBuf, reason: String },

    #[error("extracting to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure of the external scanning oracle on a single file. Degrades to an
/// empty result for that file; never aborts the batch.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("failed to launch scanner `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("scanner exited with status {status}: {stderr}")]
    Failed { status: i32, stderr: String },

    #[error("unreadable scanner output: {0}")]
    Output(#[from] serde_json::Error),

    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
