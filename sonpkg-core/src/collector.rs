//! Image artifact collection
//!
//! Resolves the `vm_image` of every deployment unit in a function descriptor
//! and stages what it points at under `<format>_files/<component>/`. Images
//! may be a single file, a directory tree (walked recursively, keeping its
//! shape) or a remote URL, which is only checked, never embedded.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::descriptor::{DeploymentUnit, FunctionDescriptor};
use crate::error::{PackageError, Result};
use crate::manifest::{image_content_type, PackageContentEntry};
use crate::staging::{entry_name, is_contained, is_path_segment, StagingTree};

const FILE_URI_PREFIX: &str = "file://";

const REMOTE_SCHEMES: [&str; 3] = ["http", "https", "ftp"];

const URL_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Where an image reference points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageLocation {
    Remote(reqwest::Url),
    Local(PathBuf),
}

impl ImageLocation {
    /// Classify `reference`, resolving local paths against `component_dir`
    ///
    /// `file://` URIs are stripped to a path relative to the component
    /// directory, like plain relative paths.
    pub fn resolve(reference: &str, component_dir: &Path) -> Self {
        if let Ok(url) = reqwest::Url::parse(reference) {
            if REMOTE_SCHEMES.contains(&url.scheme()) {
                return ImageLocation::Remote(url);
            }
        }

        let relative = reference
            .strip_prefix(FILE_URI_PREFIX)
            .map(|rest| rest.trim_start_matches('/'))
            .unwrap_or(reference);
        ImageLocation::Local(component_dir.join(relative))
    }
}

/// Entries produced for one component plus the problems that were skipped
#[derive(Debug, Default)]
pub struct Collected {
    pub entries: Vec<PackageContentEntry>,
    pub warnings: Vec<PackageError>,
    /// Staged path -> source it was copied from
    sources: HashMap<PathBuf, PathBuf>,
}

/// Stages image artifacts of function descriptors
pub struct ArtifactCollector<'a> {
    staging: &'a StagingTree,
    url_checker: Option<reqwest::Client>,
}

impl<'a> ArtifactCollector<'a> {
    /// `verify_urls` enables a HEAD request for every remote image
    pub fn new(staging: &'a StagingTree, verify_urls: bool) -> Self {
        let url_checker = if verify_urls {
            reqwest::Client::builder()
                .timeout(URL_CHECK_TIMEOUT)
                .build()
                .map_err(|e| warn!("Image URL checks disabled: {}", e))
                .ok()
        } else {
            None
        };

        Self {
            staging,
            url_checker,
        }
    }

    /// Stage every image declared by `descriptor`
    ///
    /// `component` names the component's subtree inside each
    /// `<format>_files` directory. Missing or unverifiable images are
    /// reported as warnings; only filesystem failures while staging are
    /// errors.
    pub async fn collect(
        &self,
        component_dir: &Path,
        component: &str,
        descriptor: &FunctionDescriptor,
    ) -> Result<Collected> {
        let mut collected = Collected::default();

        for (vdu, reference) in descriptor.images() {
            if !is_path_segment(vdu.image_format()) {
                let root = image_root(vdu, component);
                warn!(
                    "Ignoring vm_image '{}' of [VNF={}, VDU id={}]: unusable image format '{}'",
                    reference,
                    component,
                    vdu.id,
                    vdu.image_format()
                );
                collected.warnings.push(PackageError::UnsafePath {
                    root: self.staging.root().to_path_buf(),
                    path: root.display().to_string(),
                });
                continue;
            }

            match ImageLocation::resolve(reference, component_dir) {
                ImageLocation::Remote(url) => {
                    if let Some(problem) = self.check_remote(&url).await {
                        warn!(
                            "Failed to verify the existence of vm_image '{}': {}",
                            reference, problem
                        );
                        collected.warnings.push(PackageError::MissingArtifact {
                            component: component.to_string(),
                            reference: reference.to_string(),
                            path: PathBuf::from(url.as_str()),
                        });
                    } else {
                        debug!("vm_image '{}' is remote, referenced only", reference);
                    }
                }
                ImageLocation::Local(path) if path.is_file() => {
                    self.stage_file(&path, component, vdu, &mut collected)?;
                }
                ImageLocation::Local(path) if path.is_dir() => {
                    self.stage_tree(&path, component, vdu, &mut collected)?;
                }
                ImageLocation::Local(path) => {
                    warn!(
                        "Cannot find vm_image={} referenced in [VNF={}, VDU id={}]",
                        path.display(),
                        component,
                        vdu.id
                    );
                    collected.warnings.push(PackageError::MissingArtifact {
                        component: component.to_string(),
                        reference: reference.to_string(),
                        path,
                    });
                }
            }
        }

        Ok(collected)
    }

    /// `None` when the URL answered, otherwise why it could not be verified
    async fn check_remote(&self, url: &reqwest::Url) -> Option<String> {
        let client = self.url_checker.as_ref()?;

        match client.head(url.clone()).send().await {
            Ok(response) if response.status().is_client_error()
                || response.status().is_server_error() =>
            {
                Some(format!("HTTP {}", response.status()))
            }
            Ok(_) => None,
            Err(e) => Some(e.to_string()),
        }
    }

    fn stage_file(
        &self,
        path: &Path,
        component: &str,
        vdu: &DeploymentUnit,
        collected: &mut Collected,
    ) -> Result<()> {
        let Some(file_name) = path.file_name() else {
            return Ok(());
        };
        let relative = image_root(vdu, component).join(file_name);
        self.stage_one(path, &relative, component, vdu, collected)
    }

    fn stage_tree(
        &self,
        root: &Path,
        component: &str,
        vdu: &DeploymentUnit,
        collected: &mut Collected,
    ) -> Result<()> {
        for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.loop_ancestor().is_some() => {
                    warn!("Skipping symlink loop in vm_image of '{}': {}", component, e);
                    continue;
                }
                Err(e) => {
                    let path = e.path().unwrap_or(root).to_path_buf();
                    return Err(PackageError::io(path, e.into()));
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let sub_path = entry.path().strip_prefix(root).unwrap_or(entry.path());
            let relative = image_root(vdu, component).join(sub_path);
            self.stage_one(entry.path(), &relative, component, vdu, collected)?;
        }
        Ok(())
    }

    fn stage_one(
        &self,
        source: &Path,
        relative: &Path,
        component: &str,
        vdu: &DeploymentUnit,
        collected: &mut Collected,
    ) -> Result<()> {
        if !is_contained(relative) {
            warn!(
                "Image '{}' of component '{}' would be staged outside the package, skipping",
                relative.display(),
                component
            );
            collected.warnings.push(PackageError::UnsafePath {
                root: self.staging.root().to_path_buf(),
                path: relative.display().to_string(),
            });
            return Ok(());
        }

        let canonical = std::fs::canonicalize(source).unwrap_or_else(|_| source.to_path_buf());
        if collected.sources.get(relative) == Some(&canonical) {
            debug!("Image '{}' is already staged", entry_name(relative));
            return Ok(());
        }

        if self.staging.contains(relative) {
            warn!(
                "Image '{}' of component '{}' is already in the package, skipping",
                entry_name(relative),
                component
            );
            collected.warnings.push(PackageError::ArtifactNameCollision {
                component: component.to_string(),
                name: entry_name(relative),
            });
            return Ok(());
        }

        let entry = self
            .staging
            .stage(source, relative, image_content_type(vdu.image_format()))?;
        debug!("Staged {} ({})", entry.name, entry.md5);
        collected.sources.insert(relative.to_path_buf(), canonical);
        collected.entries.push(entry);
        Ok(())
    }
}

fn image_root(vdu: &DeploymentUnit, component: &str) -> PathBuf {
    PathBuf::from(format!("{}_files", vdu.image_format())).join(component)
}
