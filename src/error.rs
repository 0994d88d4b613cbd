use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::populate::VersionFailure;

#[derive(Debug, Error, Diagnostic)]
pub enum ImageStoreError {
    #[error("invalid version catalog: {0}")]
    Config(String),

    #[error("failed to read version catalog at {0}")]
    ConfigRead(PathBuf),

    #[error("missing version entry for {0}")]
    UnknownVersion(String),

    #[error("version {version} missing key '{field}'")]
    MissingField {
        version: String,
        field: &'static str,
    },

    #[error("version {version} has invalid url '{url}': {reason}")]
    InvalidUrl {
        version: String,
        url: String,
        reason: String,
    },

    #[error("unsupported image type '{0}'")]
    UnsupportedImageType(String),

    #[error("failed to download {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("failed to create minimal iso template for version {version}: {source}")]
    MinimalTemplate {
        version: String,
        #[source]
        source: DeriveError,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Populate(#[from] PopulateError),
}

#[derive(Debug, Error, Diagnostic)]
pub enum FetchError {
    #[error("failed to build http client: {0}")]
    Client(String),

    #[error("request failed: {0}")]
    Transport(String),

    #[error("bad status {status}")]
    BadStatus { status: u16 },

    #[error("size mismatch: wrote {written} bytes, but expected to write {expected}")]
    SizeMismatch { written: u64, expected: u64 },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("download cancelled")]
    Cancelled,
}

#[derive(Debug, Error, Diagnostic)]
pub enum DeriveError {
    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("{0}")]
    Failed(String),

    #[error("tool exited successfully but did not write {0}")]
    NoOutput(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

/// Every per-version failure from one `populate` run.
#[derive(Debug, Error, Diagnostic)]
#[error(
    "{} of {} versions failed to populate: {}",
    .failures.len(),
    total(.failures, .succeeded),
    summarize(.failures)
)]
pub struct PopulateError {
    pub failures: Vec<VersionFailure>,
    pub succeeded: Vec<String>,
}

impl PopulateError {
    pub fn failure_for(&self, version: &str) -> Option<&VersionFailure> {
        self.failures
            .iter()
            .find(|failure| failure.version == version)
    }
}

fn total(failures: &[VersionFailure], succeeded: &[String]) -> usize {
    failures.len() + succeeded.len()
}

fn summarize(failures: &[VersionFailure]) -> String {
    failures
        .iter()
        .map(|failure| format!("[{}] {}", failure.version, failure.error))
        .collect::<Vec<_>>()
        .join("; ")
}
