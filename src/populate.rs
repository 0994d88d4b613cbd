use std::fmt;
use std::sync::mpsc;
use std::thread;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::deriver::ImageDeriver;
use crate::domain::{FullImageAction, MinimalImageAction};
use crate::error::{FetchError, ImageStoreError, PopulateError};
use crate::fetcher::Fetcher;
use crate::resolver::PathResolver;

/// Step of the per-version pipeline at which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ResolveFull,
    FetchFull,
    ResolveMinimal,
    DeriveMinimal,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::ResolveFull => "resolve-full",
            Stage::FetchFull => "fetch-full",
            Stage::ResolveMinimal => "resolve-minimal",
            Stage::DeriveMinimal => "derive-minimal",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug)]
pub struct VersionFailure {
    pub version: String,
    pub stage: Stage,
    pub error: ImageStoreError,
}

#[derive(Debug, Clone, Serialize)]
pub struct VersionReport {
    pub version: String,
    pub full_path: Utf8PathBuf,
    pub minimal_path: Utf8PathBuf,
    pub full: FullImageAction,
    pub minimal: MinimalImageAction,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PopulateReport {
    pub versions: Vec<VersionReport>,
}

impl PopulateReport {
    pub fn fetched(&self) -> usize {
        self.versions
            .iter()
            .filter(|report| report.full == FullImageAction::Fetched)
            .count()
    }

    pub fn derived(&self) -> usize {
        self.versions
            .iter()
            .filter(|report| report.minimal == MinimalImageAction::Derived)
            .count()
    }
}

/// Ensures that every catalog version has its full and minimal image on disk.
pub struct Populator<F: Fetcher, D: ImageDeriver> {
    resolver: PathResolver,
    fetcher: F,
    deriver: D,
}

impl<F: Fetcher, D: ImageDeriver> Populator<F, D> {
    pub fn new(resolver: PathResolver, fetcher: F, deriver: D) -> Self {
        Self {
            resolver,
            fetcher,
            deriver,
        }
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Runs one thread per version and waits for all of them. A failing
    /// version does not stop its siblings; every failure is returned together.
    pub fn populate(&self, cancel: &CancelToken) -> Result<PopulateReport, PopulateError> {
        let versions = self.resolver.catalog().versions().collect::<Vec<_>>();
        info!(
            versions = versions.len(),
            data_dir = %self.resolver.data_dir(),
            "populating image store"
        );

        let (tx, rx) = mpsc::channel();
        thread::scope(|scope| {
            for version in &versions {
                let tx = tx.clone();
                scope.spawn(move || {
                    let outcome = self.ensure_version(version, cancel);
                    // The receiver outlives the scope.
                    let _ = tx.send(outcome);
                });
            }
        });
        drop(tx);

        let mut reports = Vec::new();
        let mut failures = Vec::new();
        for outcome in rx {
            match outcome {
                Ok(report) => reports.push(report),
                Err(failure) => {
                    warn!(
                        version = %failure.version,
                        stage = %failure.stage,
                        error = %failure.error,
                        "version failed to populate"
                    );
                    failures.push(failure);
                }
            }
        }
        reports.sort_by(|a, b| a.version.cmp(&b.version));
        failures.sort_by(|a, b| a.version.cmp(&b.version));

        if failures.is_empty() {
            let report = PopulateReport { versions: reports };
            info!(
                fetched = report.fetched(),
                derived = report.derived(),
                "image store populated"
            );
            return Ok(report);
        }
        Err(PopulateError {
            failures,
            succeeded: reports.into_iter().map(|report| report.version).collect(),
        })
    }

    fn ensure_version(
        &self,
        version: &str,
        cancel: &CancelToken,
    ) -> Result<VersionReport, VersionFailure> {
        let fail = |stage: Stage, error: ImageStoreError| VersionFailure {
            version: version.to_string(),
            stage,
            error,
        };

        let full_path = self
            .resolver
            .full_path(version)
            .map_err(|err| fail(Stage::ResolveFull, err))?;
        let full = if is_present(&full_path) {
            debug!(version, path = %full_path, "full iso already present");
            FullImageAction::Present
        } else {
            if cancel.is_cancelled() {
                return Err(fail(Stage::FetchFull, ImageStoreError::Cancelled));
            }
            let url = self
                .resolver
                .iso_url(version)
                .map_err(|err| fail(Stage::ResolveFull, err))?;
            info!(version, url, path = %full_path, "downloading iso");
            let bytes = self
                .fetcher
                .fetch(url, &full_path, cancel)
                .map_err(|err| fail(Stage::FetchFull, download_error(url, err)))?;
            info!(version, bytes, "finished downloading iso");
            FullImageAction::Fetched
        };

        let minimal_path = self
            .resolver
            .minimal_path(version)
            .map_err(|err| fail(Stage::ResolveMinimal, err))?;
        let minimal = if is_present(&minimal_path) {
            debug!(version, path = %minimal_path, "minimal iso already present");
            MinimalImageAction::Present
        } else {
            if cancel.is_cancelled() {
                return Err(fail(Stage::DeriveMinimal, ImageStoreError::Cancelled));
            }
            let rootfs_url = self
                .resolver
                .rootfs_url(version)
                .map_err(|err| fail(Stage::ResolveMinimal, err))?;
            info!(version, path = %minimal_path, "creating minimal iso");
            self.deriver
                .derive_minimal(&full_path, rootfs_url, &minimal_path)
                .map_err(|source| {
                    fail(
                        Stage::DeriveMinimal,
                        ImageStoreError::MinimalTemplate {
                            version: version.to_string(),
                            source,
                        },
                    )
                })?;
            info!(version, "finished creating minimal iso");
            MinimalImageAction::Derived
        };

        Ok(VersionReport {
            version: version.to_string(),
            full_path,
            minimal_path,
            full,
            minimal,
        })
    }
}

// Presence only; contents are never inspected.
fn is_present(path: &Utf8Path) -> bool {
    path.as_std_path().exists()
}

fn download_error(url: &str, err: FetchError) -> ImageStoreError {
    match err {
        FetchError::Cancelled => ImageStoreError::Cancelled,
        source => ImageStoreError::Download {
            url: url.to_string(),
            source,
        },
    }
}
