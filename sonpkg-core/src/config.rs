//! Workspace and project configuration
//!
//! The workspace (`workspace.yml`) carries machine-level settings: the
//! catalogue servers in priority order, the descriptor extension, and where
//! the component cache and schemas live. The project (`project.yml`) carries
//! the general section of the package descriptor.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::descriptor::scalar_to_string;
use crate::error::PackageError;

/// Default workspace directory name under the user's home
pub const DEFAULT_WORKSPACE_DIR: &str = ".son-workspace";

/// Default descriptor extension
pub const DEFAULT_DESCRIPTOR_EXTENSION: &str = "yml";

/// A catalogue server, queried in the order configured
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogueServer {
    /// Server id (e.g., "cat01")
    pub id: String,

    /// Base URL of the catalogue API
    pub url: String,
}

/// Workspace-relative directories
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceDirs {
    /// Cache of resolved function descriptors, one directory per component id
    #[serde(default = "default_catalogue_vnf_dir")]
    pub catalogue_vnf_dir: PathBuf,

    /// Optional schema overrides
    #[serde(default = "default_schemas_dir")]
    pub schemas_dir: PathBuf,
}

impl Default for WorkspaceDirs {
    fn default() -> Self {
        Self {
            catalogue_vnf_dir: default_catalogue_vnf_dir(),
            schemas_dir: default_schemas_dir(),
        }
    }
}

/// Workspace descriptor file (workspace.yml)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_descriptor_extension")]
    pub descriptor_extension: String,

    #[serde(default)]
    pub catalogue_servers: Vec<CatalogueServer>,

    #[serde(default)]
    pub dirs: WorkspaceDirs,

    /// HEAD-check remote image URLs while packaging
    #[serde(default = "default_true")]
    pub verify_image_urls: bool,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            name: None,
            log_level: default_log_level(),
            descriptor_extension: default_descriptor_extension(),
            catalogue_servers: Vec::new(),
            dirs: WorkspaceDirs::default(),
            verify_image_urls: true,
        }
    }
}

fn default_catalogue_vnf_dir() -> PathBuf {
    PathBuf::from("catalogues").join("vnfs")
}

fn default_schemas_dir() -> PathBuf {
    PathBuf::from("schemas")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_descriptor_extension() -> String {
    DEFAULT_DESCRIPTOR_EXTENSION.to_string()
}

fn default_true() -> bool {
    true
}

/// A loaded workspace
#[derive(Debug, Clone)]
pub struct Workspace {
    pub root: PathBuf,
    pub config: WorkspaceConfig,
}

impl Workspace {
    pub const DESCRIPTOR_NAME: &'static str = "workspace.yml";

    /// Load the workspace descriptor at `root`
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(Self::DESCRIPTOR_NAME);
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read workspace descriptor: {}", path.display()))?;
        let config: WorkspaceConfig = serde_yaml_ng::from_str(&content)
            .with_context(|| format!("Failed to parse workspace descriptor: {}", path.display()))?;

        debug!(
            "Loaded workspace {} with {} catalogue server(s)",
            root.display(),
            config.catalogue_servers.len()
        );

        Ok(Self {
            root: root.to_path_buf(),
            config,
        })
    }

    /// Workspace with default settings, not backed by a descriptor file
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            config: WorkspaceConfig::default(),
        }
    }

    /// Default workspace location (`~/.son-workspace`)
    pub fn default_root() -> Result<PathBuf> {
        directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().to_path_buf())
            .or_else(dirs::home_dir)
            .map(|home| home.join(DEFAULT_WORKSPACE_DIR))
            .context("Could not determine home directory")
    }

    pub fn descriptor_extension(&self) -> &str {
        &self.config.descriptor_extension
    }

    /// Directory holding cached function descriptors
    pub fn cache_dir(&self) -> PathBuf {
        self.root.join(&self.config.dirs.catalogue_vnf_dir)
    }

    pub fn schemas_dir(&self) -> PathBuf {
        self.root.join(&self.config.dirs.schemas_dir)
    }
}

/// General-section fields required in project.yml
pub const GENERAL_FIELDS: [&str; 5] = ["group", "name", "version", "maintainer", "description"];

/// General section of the package, taken from the project descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectInfo {
    pub group: String,
    pub name: String,
    pub version: String,
    pub maintainer: String,
    pub description: String,
}

/// A loaded project
#[derive(Debug, Clone)]
pub struct Project {
    pub root: PathBuf,
    pub info: ProjectInfo,
}

impl Project {
    pub const DESCRIPTOR_NAME: &'static str = "project.yml";

    /// Load the project descriptor at `root`
    ///
    /// Every general-section field must be present; all missing ones are
    /// reported together.
    pub fn load(root: &Path) -> crate::error::Result<Self> {
        let path = root.join(Self::DESCRIPTOR_NAME);
        let content = std::fs::read_to_string(&path).map_err(|e| PackageError::io(&path, e))?;
        let document: Value =
            serde_yaml_ng::from_str(&content).map_err(|source| PackageError::Parse {
                path: path.clone(),
                source,
            })?;

        let field = |name: &str| document.get(name).and_then(scalar_to_string);

        let missing: Vec<String> = GENERAL_FIELDS
            .iter()
            .filter(|name| field(**name).is_none())
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(PackageError::InvalidProject { path, missing });
        }

        let value = |name: &str| field(name).unwrap_or_default();
        Ok(Self {
            root: root.to_path_buf(),
            info: ProjectInfo {
                group: value("group"),
                name: value("name"),
                version: value("version"),
                maintainer: value("maintainer"),
                description: value("description"),
            },
        })
    }

    /// Directory holding the service descriptor
    pub fn service_dir(&self) -> PathBuf {
        self.root.join("sources").join("nsd")
    }

    /// Directory holding one sub-directory per function component
    pub fn functions_dir(&self) -> PathBuf {
        self.root.join("sources").join("vnf")
    }

    /// Package name when none is given: the project directory's name
    pub fn default_package_name(&self) -> String {
        self.root
            .canonicalize()
            .unwrap_or_else(|_| self.root.clone())
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.info.name.clone())
    }
}
