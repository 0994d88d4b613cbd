use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use url::Url;

use crate::catalog::{ISO_URL_KEY, ROOTFS_URL_KEY, VersionCatalog, VersionEntry};
use crate::domain::ImageType;
use crate::error::ImageStoreError;

pub const MINIMAL_PREFIX: &str = "minimal-";

/// Maps catalog versions to files under the data directory. Every method is a
/// pure function of the data directory and the catalog entry.
#[derive(Debug, Clone)]
pub struct PathResolver {
    data_dir: Utf8PathBuf,
    catalog: Arc<VersionCatalog>,
}

impl PathResolver {
    pub fn new(data_dir: impl Into<Utf8PathBuf>, catalog: Arc<VersionCatalog>) -> Self {
        Self {
            data_dir: data_dir.into(),
            catalog,
        }
    }

    pub fn data_dir(&self) -> &Utf8Path {
        &self.data_dir
    }

    pub fn catalog(&self) -> &VersionCatalog {
        &self.catalog
    }

    pub fn iso_url(&self, version: &str) -> Result<&str, ImageStoreError> {
        self.entry(version)?
            .iso_url()
            .ok_or_else(|| missing_field(version, ISO_URL_KEY))
    }

    pub fn rootfs_url(&self, version: &str) -> Result<&str, ImageStoreError> {
        self.entry(version)?
            .rootfs_url()
            .ok_or_else(|| missing_field(version, ROOTFS_URL_KEY))
    }

    pub fn full_path(&self, version: &str) -> Result<Utf8PathBuf, ImageStoreError> {
        Ok(self.data_dir.join(self.basename(version)?))
    }

    pub fn minimal_path(&self, version: &str) -> Result<Utf8PathBuf, ImageStoreError> {
        let base = self.basename(version)?;
        Ok(self.data_dir.join(format!("{MINIMAL_PREFIX}{base}")))
    }

    pub fn path_for(
        &self,
        version: &str,
        image_type: ImageType,
    ) -> Result<Utf8PathBuf, ImageStoreError> {
        match image_type {
            ImageType::Full => self.full_path(version),
            ImageType::Minimal => self.minimal_path(version),
        }
    }

    fn entry(&self, version: &str) -> Result<&VersionEntry, ImageStoreError> {
        self.catalog
            .get(version)
            .ok_or_else(|| ImageStoreError::UnknownVersion(version.to_string()))
    }

    fn basename(&self, version: &str) -> Result<String, ImageStoreError> {
        let url = self.iso_url(version)?;
        url_basename(url).map_err(|reason| ImageStoreError::InvalidUrl {
            version: version.to_string(),
            url: url.to_string(),
            reason,
        })
    }
}

fn missing_field(version: &str, field: &'static str) -> ImageStoreError {
    ImageStoreError::MissingField {
        version: version.to_string(),
        field,
    }
}

/// Last non-empty path segment of `url`, without query or fragment.
pub(crate) fn url_basename(url: &str) -> Result<String, String> {
    let parsed = Url::parse(url).map_err(|err| err.to_string())?;
    let segment = parsed
        .path_segments()
        .and_then(|segments| segments.filter(|segment| !segment.is_empty()).last())
        .ok_or_else(|| "url has no file name".to_string())?;
    if segment == "." || segment == ".." {
        return Err(format!("'{segment}' is not a file name"));
    }
    Ok(segment.to_string())
}
