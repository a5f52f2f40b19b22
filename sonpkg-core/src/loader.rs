//! Descriptor loading
//!
//! A descriptor directory must hold exactly one file with the workspace's
//! descriptor extension. The file is parsed as YAML and checked against the
//! schema for its kind before anything else looks at it.

use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::descriptor::DescriptorKind;
use crate::error::{PackageError, Result};
use crate::schema::SchemaValidator;

/// A parsed, schema-valid descriptor document
#[derive(Debug, Clone)]
pub struct LoadedDescriptor {
    /// Location of the descriptor file
    pub path: PathBuf,
    /// File name, reused when the descriptor is staged
    pub file_name: String,
    pub document: Value,
}

/// Find the single `kind` descriptor file in `dir`
pub fn locate_descriptor(dir: &Path, extension: &str, kind: DescriptorKind) -> Result<PathBuf> {
    let entries = std::fs::read_dir(dir).map_err(|e| PackageError::io(dir, e))?;

    let mut candidates = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| PackageError::io(dir, e))?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == extension) {
            candidates.push(path);
        }
    }

    match candidates.len() {
        0 => Err(PackageError::MissingDescriptor {
            dir: dir.to_path_buf(),
            kind,
            extension: extension.to_string(),
        }),
        1 => Ok(candidates.remove(0)),
        count => Err(PackageError::AmbiguousDescriptor {
            dir: dir.to_path_buf(),
            kind,
            extension: extension.to_string(),
            count,
        }),
    }
}

/// Load and validate the descriptor held in `dir`
pub fn load_descriptor(
    dir: &Path,
    extension: &str,
    kind: DescriptorKind,
    validator: &dyn SchemaValidator,
) -> Result<LoadedDescriptor> {
    let path = locate_descriptor(dir, extension, kind)?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let content = std::fs::read_to_string(&path).map_err(|e| PackageError::io(&path, e))?;
    let document: Value =
        serde_yaml_ng::from_str(&content).map_err(|source| PackageError::Parse {
            path: path.clone(),
            source,
        })?;

    debug!("Validating {} '{}'", kind, path.display());
    validator
        .validate(&document, kind)
        .map_err(|diagnostics| PackageError::SchemaViolation {
            path: path.clone(),
            kind,
            diagnostic: diagnostics.join("\n"),
        })?;

    Ok(LoadedDescriptor {
        path,
        file_name,
        document,
    })
}
