use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};

use crate::cancel::CancelToken;
use crate::catalog::VersionCatalog;
use crate::config::StoreConfig;
use crate::deriver::ImageDeriver;
use crate::domain::ImageType;
use crate::error::{ImageStoreError, PopulateError};
use crate::fetcher::Fetcher;
use crate::populate::{PopulateReport, Populator};
use crate::resolver::PathResolver;

pub trait ImageStore: Send + Sync {
    fn populate(&self, cancel: &CancelToken) -> Result<PopulateReport, PopulateError>;
    fn base_file(&self, version: &str, image_type: &str) -> Result<Utf8PathBuf, ImageStoreError>;
    fn have_version(&self, version: &str) -> bool;
}

pub struct BaseImageStore<F: Fetcher, D: ImageDeriver> {
    populator: Populator<F, D>,
}

impl<F: Fetcher, D: ImageDeriver> BaseImageStore<F, D> {
    /// Builds the catalog from `config`. A malformed override fails here,
    /// before any download is attempted.
    pub fn new(config: &StoreConfig, fetcher: F, deriver: D) -> Result<Self, ImageStoreError> {
        let catalog = config.catalog()?;
        Ok(Self::with_catalog(
            config.data_dir.clone(),
            catalog,
            fetcher,
            deriver,
        ))
    }

    pub fn with_catalog(
        data_dir: Utf8PathBuf,
        catalog: VersionCatalog,
        fetcher: F,
        deriver: D,
    ) -> Self {
        let resolver = PathResolver::new(data_dir, Arc::new(catalog));
        Self {
            populator: Populator::new(resolver, fetcher, deriver),
        }
    }

    pub fn data_dir(&self) -> &Utf8Path {
        self.resolver().data_dir()
    }

    pub fn resolver(&self) -> &PathResolver {
        self.populator.resolver()
    }

    pub fn versions(&self) -> Vec<String> {
        self.resolver()
            .catalog()
            .versions()
            .map(str::to_string)
            .collect()
    }

    pub fn base_file_for(
        &self,
        version: &str,
        image_type: ImageType,
    ) -> Result<Utf8PathBuf, ImageStoreError> {
        self.resolver().path_for(version, image_type)
    }
}

impl<F: Fetcher, D: ImageDeriver> ImageStore for BaseImageStore<F, D> {
    fn populate(&self, cancel: &CancelToken) -> Result<PopulateReport, PopulateError> {
        self.populator.populate(cancel)
    }

    fn base_file(&self, version: &str, image_type: &str) -> Result<Utf8PathBuf, ImageStoreError> {
        let image_type: ImageType = image_type.parse()?;
        self.base_file_for(version, image_type)
    }

    fn have_version(&self, version: &str) -> bool {
        self.resolver().catalog().contains(version)
    }
}
