use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::ImageStoreError;
use crate::resolver::{MINIMAL_PREFIX, url_basename};

pub const ISO_URL_KEY: &str = "iso_url";
pub const ROOTFS_URL_KEY: &str = "rootfs_url";

const DEFAULT_VERSIONS: &[(&str, &str, &str)] = &[
    (
        "4.6",
        "https://mirror.openshift.com/pub/openshift-v4/dependencies/rhcos/4.6/4.6.8/rhcos-4.6.8-x86_64-live.x86_64.iso",
        "https://mirror.openshift.com/pub/openshift-v4/dependencies/rhcos/4.6/4.6.8/rhcos-live-rootfs.x86_64.img",
    ),
    (
        "4.7",
        "https://mirror.openshift.com/pub/openshift-v4/dependencies/rhcos/4.7/4.7.13/rhcos-4.7.13-x86_64-live.x86_64.iso",
        "https://mirror.openshift.com/pub/openshift-v4/dependencies/rhcos/4.7/4.7.13/rhcos-live-rootfs.x86_64.img",
    ),
    (
        "4.8",
        "https://mirror.openshift.com/pub/openshift-v4/dependencies/rhcos/pre-release/4.8.0-rc.3/rhcos-4.8.0-rc.3-x86_64-live.x86_64.iso",
        "https://mirror.openshift.com/pub/openshift-v4/dependencies/rhcos/pre-release/4.8.0-rc.3/rhcos-live-rootfs.x86_64.img",
    ),
];

/// Source locations for one OS version. Missing fields are tolerated here and
/// reported when the version is used.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionEntry {
    #[serde(default)]
    pub iso_url: Option<String>,
    #[serde(default)]
    pub rootfs_url: Option<String>,
}

impl VersionEntry {
    pub fn new(iso_url: impl Into<String>, rootfs_url: impl Into<String>) -> Self {
        Self {
            iso_url: Some(iso_url.into()),
            rootfs_url: Some(rootfs_url.into()),
        }
    }

    pub fn iso_url(&self) -> Option<&str> {
        non_empty(self.iso_url.as_deref())
    }

    pub fn rootfs_url(&self) -> Option<&str> {
        non_empty(self.rootfs_url.as_deref())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.trim().is_empty())
}

/// Version to source mapping, fixed for the lifetime of the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionCatalog {
    entries: BTreeMap<String, VersionEntry>,
}

impl VersionCatalog {
    pub fn builtin() -> Self {
        let entries = DEFAULT_VERSIONS
            .iter()
            .map(|(version, iso_url, rootfs_url)| {
                (version.to_string(), VersionEntry::new(*iso_url, *rootfs_url))
            })
            .collect();
        Self { entries }
    }

    /// Parses a JSON override of the form
    /// `{"<version>": {"iso_url": "...", "rootfs_url": "..."}}`.
    pub fn from_json(content: &str) -> Result<Self, ImageStoreError> {
        let entries: BTreeMap<String, VersionEntry> = serde_json::from_str(content)
            .map_err(|err| ImageStoreError::Config(err.to_string()))?;
        Self::from_entries(entries)
    }

    pub fn from_entries(entries: BTreeMap<String, VersionEntry>) -> Result<Self, ImageStoreError> {
        validate_layout(&entries)?;
        Ok(Self { entries })
    }

    pub fn get(&self, version: &str) -> Option<&VersionEntry> {
        self.entries.get(version)
    }

    pub fn contains(&self, version: &str) -> bool {
        self.entries.contains_key(version)
    }

    pub fn versions(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn entries(&self) -> &BTreeMap<String, VersionEntry> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Rejects catalogs where two versions would write the same file under the
/// data directory. Entries whose `iso_url` is missing or unparseable are
/// skipped; those fail when the version is used.
pub fn validate_layout(entries: &BTreeMap<String, VersionEntry>) -> Result<(), ImageStoreError> {
    let mut owners: HashMap<String, &str> = HashMap::new();
    for (version, entry) in entries {
        let Some(base) = entry.iso_url().and_then(|url| url_basename(url).ok()) else {
            continue;
        };
        for name in [base.clone(), format!("{MINIMAL_PREFIX}{base}")] {
            if let Some(owner) = owners.insert(name.clone(), version.as_str()) {
                return Err(ImageStoreError::Config(format!(
                    "versions {owner} and {version} both resolve to {name}"
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn builtin_has_default_versions() {
        let catalog = VersionCatalog::builtin();
        assert_eq!(catalog.versions().collect::<Vec<_>>(), vec!["4.6", "4.7", "4.8"]);
        let entry = catalog.get("4.7").unwrap();
        assert!(entry.iso_url().unwrap().ends_with("rhcos-4.7.13-x86_64-live.x86_64.iso"));
        assert!(entry.rootfs_url().unwrap().ends_with("rhcos-live-rootfs.x86_64.img"));
    }

    #[test]
    fn empty_fields_count_as_missing() {
        let entry = VersionEntry {
            iso_url: Some(String::new()),
            rootfs_url: None,
        };
        assert_eq!(entry.iso_url(), None);
        assert_eq!(entry.rootfs_url(), None);
    }

    #[test]
    fn extra_keys_are_ignored() {
        let catalog = VersionCatalog::from_json(
            r#"{"4.9": {"iso_url": "https://example.com/a.iso", "rootfs_url": "https://example.com/r.img", "arch": "x86_64"}}"#,
        )
        .unwrap();
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn non_string_values_are_malformed() {
        let err = VersionCatalog::from_json(r#"{"4.9": {"iso_url": 42}}"#).unwrap_err();
        assert_matches!(err, ImageStoreError::Config(_));
    }

    #[test]
    fn minimal_name_collision_is_rejected() {
        let mut entries = BTreeMap::new();
        entries.insert(
            "a".to_string(),
            VersionEntry::new("https://example.com/x.iso", "https://example.com/r.img"),
        );
        entries.insert(
            "b".to_string(),
            VersionEntry::new("https://example.com/minimal-x.iso", "https://example.com/r.img"),
        );
        let err = VersionCatalog::from_entries(entries).unwrap_err();
        assert_matches!(err, ImageStoreError::Config(message) if message.contains("minimal-x.iso"));
    }
}
