use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ImageStoreError;

pub const IMAGE_TYPE_FULL: &str = "full";
pub const IMAGE_TYPE_MINIMAL: &str = "minimal";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageType {
    Full,
    Minimal,
}

impl ImageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageType::Full => IMAGE_TYPE_FULL,
            ImageType::Minimal => IMAGE_TYPE_MINIMAL,
        }
    }
}

impl fmt::Display for ImageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ImageType {
    type Err = ImageStoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            IMAGE_TYPE_FULL => Ok(ImageType::Full),
            IMAGE_TYPE_MINIMAL => Ok(ImageType::Minimal),
            other => Err(ImageStoreError::UnsupportedImageType(other.to_string())),
        }
    }
}

/// Whether `populate` found the full image on disk or had to download it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FullImageAction {
    Present,
    Fetched,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MinimalImageAction {
    Present,
    Derived,
}
