//! Staging tree - the on-disk layout that becomes the archive

use std::path::{Component, Path, PathBuf};

use crate::digest::digest_file;
use crate::error::{PackageError, Result};
use crate::manifest::PackageContentEntry;

/// Directory holding the copied service descriptor
pub const SERVICE_DIR: &str = "service_descriptor";

/// Directory holding the copied function descriptors
pub const FUNCTION_DIR: &str = "function_descriptors";

/// Destination directory that files are copied into before archiving
#[derive(Debug, Clone)]
pub struct StagingTree {
    root: PathBuf,
}

impl StagingTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether a file is already staged at `relative`
    pub fn contains(&self, relative: &Path) -> bool {
        self.root.join(relative).exists()
    }

    /// Copy `source` to `relative` inside the tree and describe the copy
    ///
    /// The digest is taken from the staged copy so the manifest matches
    /// exactly what ships.
    pub fn stage(
        &self,
        source: &Path,
        relative: &Path,
        content_type: String,
    ) -> Result<PackageContentEntry> {
        if !is_contained(relative) {
            return Err(PackageError::UnsafePath {
                root: self.root.clone(),
                path: relative.display().to_string(),
            });
        }

        let target = self.root.join(relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PackageError::io(parent, e))?;
        }
        std::fs::copy(source, &target).map_err(|e| PackageError::io(source, e))?;

        Ok(PackageContentEntry {
            content_type,
            name: entry_name(relative),
            md5: digest_file(&target)?,
        })
    }
}

/// Whether `relative` is made only of normal components, so joining it to
/// a root can never leave that root
pub fn is_contained(relative: &Path) -> bool {
    let mut components = relative.components().peekable();
    components.peek().is_some()
        && components.all(|component| matches!(component, Component::Normal(_)))
}

/// Whether `name` is usable as exactly one path component
pub fn is_path_segment(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(part)), None) if part == name
    )
}

/// Package entry name for a tree-relative path: `/`-separated, rooted
pub fn entry_name(relative: &Path) -> String {
    let parts: Vec<_> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect();
    format!("/{}", parts.join("/"))
}
