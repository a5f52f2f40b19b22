//! Packaging error types
//!
//! Every failure the pipeline can hit has its own variant so callers (and
//! tests) can tell "run continues" apart from "run aborts" without parsing
//! log messages. See [`PackageError::is_fatal`].

use std::path::PathBuf;
use thiserror::Error;

use crate::descriptor::{ComponentId, DescriptorKind};

/// Errors and warnings raised while assembling a package
#[derive(Error, Debug)]
pub enum PackageError {
    /// No descriptor file with the expected extension in a directory
    #[error("Missing {kind}: no '*.{extension}' file found in {dir}")]
    MissingDescriptor {
        dir: PathBuf,
        kind: DescriptorKind,
        extension: String,
    },

    /// More than one candidate descriptor file in a directory
    #[error("Ambiguous {kind}: {count} '*.{extension}' files found in {dir}, only one is allowed")]
    AmbiguousDescriptor {
        dir: PathBuf,
        kind: DescriptorKind,
        extension: String,
        count: usize,
    },

    /// The document failed validation against its schema
    #[error("{kind} '{path}' failed schema validation:\n{diagnostic}")]
    SchemaViolation {
        path: PathBuf,
        kind: DescriptorKind,
        diagnostic: String,
    },

    /// The same component is referenced (or provided) more than once
    #[error("Duplicate dependency '{id}' ignored")]
    DuplicateDependency { id: ComponentId },

    /// Components required by the service that no source could provide
    #[error("Unable to resolve all dependencies required by the service descriptor: {}", format_ids(.ids))]
    UnresolvedDependency { ids: Vec<ComponentId> },

    /// A catalogue server could not be used
    #[error("Catalogue server '{url}' is not available: {reason}")]
    UnreachableCatalogue { url: String, reason: String },

    /// An image referenced by a function descriptor could not be found
    #[error("Cannot find image '{reference}' referenced by component '{component}' (resolved to {path})")]
    MissingArtifact {
        component: String,
        reference: String,
        path: PathBuf,
    },

    /// A staged file would overwrite one already in the package
    #[error("'{name}' from component '{component}' collides with a file already in the package")]
    ArtifactNameCollision { component: String, name: String },

    /// A path taken from descriptor data would leave the package or cache tree
    #[error("Refusing to write '{path}': it does not stay inside {root}")]
    UnsafePath { root: PathBuf, path: String },

    /// An explicit destination directory already has content
    #[error("Destination directory '{path}' is not empty")]
    DestinationNotEmpty { path: PathBuf },

    /// The archive could not be written
    #[error("Failed to write package archive {path}")]
    ArchiveWriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The project descriptor lacks general-section fields
    #[error("Please define {} in {path}", .missing.join(", "))]
    InvalidProject { path: PathBuf, missing: Vec<String> },

    /// Filesystem failure outside archive writing
    #[error("I/O error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A descriptor file is not valid YAML
    #[error("Failed to parse {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml_ng::Error,
    },

    /// Transport or decoding failure talking to a catalogue server
    #[error("Catalogue request to '{url}' failed")]
    Catalogue {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl PackageError {
    /// Whether this error aborts the whole packaging run.
    ///
    /// Non-fatal kinds are local to one component, artifact or server: the
    /// unit is skipped and the run goes on. Descriptor lookup and schema
    /// failures are component-local only for function descriptors; for the
    /// service or package descriptor they abort.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            PackageError::DuplicateDependency { .. }
                | PackageError::UnreachableCatalogue { .. }
                | PackageError::MissingArtifact { .. }
                | PackageError::ArtifactNameCollision { .. }
                | PackageError::UnsafePath { .. }
                | PackageError::SchemaViolation {
                    kind: DescriptorKind::Function,
                    ..
                }
                | PackageError::MissingDescriptor {
                    kind: DescriptorKind::Function,
                    ..
                }
                | PackageError::AmbiguousDescriptor {
                    kind: DescriptorKind::Function,
                    ..
                }
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PackageError::Io {
            path: path.into(),
            source,
        }
    }
}

fn format_ids(ids: &[ComponentId]) -> String {
    ids.iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, PackageError>;
