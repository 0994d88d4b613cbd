use std::io::{self, Write};

use serde::Serialize;

use crate::catalog::VersionEntry;
use crate::error::PopulateError;
use crate::populate::{PopulateReport, Stage};

#[derive(Debug, Clone, Serialize)]
pub struct BaseFileResult {
    pub version: String,
    pub image_type: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HaveVersionResult {
    pub version: String,
    pub present: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct VersionListEntry {
    pub version: String,
    pub iso_url: Option<String>,
    pub rootfs_url: Option<String>,
}

impl VersionListEntry {
    pub fn new(version: &str, entry: &VersionEntry) -> Self {
        Self {
            version: version.to_string(),
            iso_url: entry.iso_url().map(str::to_string),
            rootfs_url: entry.rootfs_url().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureEntry {
    pub version: String,
    pub stage: Stage,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PopulateFailureResult {
    pub succeeded: Vec<String>,
    pub failures: Vec<FailureEntry>,
}

impl From<&PopulateError> for PopulateFailureResult {
    fn from(err: &PopulateError) -> Self {
        Self {
            succeeded: err.succeeded.clone(),
            failures: err
                .failures
                .iter()
                .map(|failure| FailureEntry {
                    version: failure.version.clone(),
                    stage: failure.stage,
                    error: failure.error.to_string(),
                })
                .collect(),
        }
    }
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_populate(report: &PopulateReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_populate_failure(err: &PopulateError) -> io::Result<()> {
        Self::print_json(&PopulateFailureResult::from(err))
    }

    pub fn print_base_file(result: &BaseFileResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_have_version(result: &HaveVersionResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_versions(entries: &[VersionListEntry]) -> io::Result<()> {
        Self::print_json(&entries)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
