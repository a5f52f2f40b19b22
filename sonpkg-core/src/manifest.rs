//! Package descriptor (META-INF/MANIFEST.MF)
//!
//! The manifest lists the general package information followed by one
//! content entry per shipped file, in insertion order: service descriptor,
//! function descriptors in discovery order, then their artifacts.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::ProjectInfo;
use crate::error::{PackageError, Result};

/// Manifest location inside the staging tree
pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";

/// Default package descriptor version
pub const DEFAULT_DESCRIPTOR_VERSION: &str = "0.1";

const CONTENT_TYPE_PREFIX: &str = "application/sonata";

/// Content type of the service descriptor entry
pub fn service_content_type() -> String {
    format!("{CONTENT_TYPE_PREFIX}.service_descriptors")
}

/// Content type of function descriptor entries
pub fn function_content_type() -> String {
    format!("{CONTENT_TYPE_PREFIX}.function_descriptor")
}

/// Content type of image files of the given format
pub fn image_content_type(format: &str) -> String {
    format!("{CONTENT_TYPE_PREFIX}.{format}_files")
}

/// One shipped file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageContentEntry {
    #[serde(rename = "content-type")]
    pub content_type: String,

    /// Package-relative path, always starting with `/`
    pub name: String,

    /// Content digest of the staged copy (`sha256:<hex>`); the field keeps
    /// its historical name for manifest compatibility
    pub md5: String,
}

/// The package descriptor written as the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDescriptor {
    pub descriptor_version: String,
    pub package_group: String,
    pub package_name: String,
    pub package_version: String,
    pub package_maintainer: String,
    pub package_description: String,
    pub package_content: Vec<PackageContentEntry>,
}

impl PackageDescriptor {
    pub fn new(
        info: &ProjectInfo,
        descriptor_version: &str,
        package_content: Vec<PackageContentEntry>,
    ) -> Self {
        Self {
            descriptor_version: descriptor_version.to_string(),
            package_group: info.group.clone(),
            package_name: info.name.clone(),
            package_version: info.version.clone(),
            package_maintainer: info.maintainer.clone(),
            package_description: info.description.clone(),
            package_content,
        }
    }

    pub fn to_yaml(&self) -> std::result::Result<String, serde_yaml_ng::Error> {
        serde_yaml_ng::to_string(self)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| PackageError::io(path, e))?;
        serde_yaml_ng::from_str(&content).map_err(|source| PackageError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write the manifest into `staging_root`, returning its path
    pub fn write_to(&self, staging_root: &Path) -> Result<PathBuf> {
        let path = staging_root.join(MANIFEST_PATH);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PackageError::io(parent, e))?;
        }

        let content = self.to_yaml().map_err(|source| PackageError::Parse {
            path: path.clone(),
            source,
        })?;
        std::fs::write(&path, content).map_err(|e| PackageError::io(&path, e))?;

        Ok(path)
    }

    /// Number of entries with the given content type
    pub fn count_of(&self, content_type: &str) -> usize {
        self.package_content
            .iter()
            .filter(|entry| entry.content_type == content_type)
            .count()
    }
}
