//! Package archive writing
//!
//! Serializes the staging tree into a gzip-compressed tarball. The archive
//! lives inside the tree it packs, so it is excluded from its own walk.

use flate2::write::GzEncoder;
use flate2::Compression;
use std::path::{Path, PathBuf};
use tar::{Builder, HeaderMode};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{PackageError, Result};

/// File extension of package archives
pub const ARCHIVE_EXTENSION: &str = "son";

/// Pack every file under `staging_root` into `<staging_root>/<name>.son`
///
/// The tarball is built in a temporary file and only renamed into place
/// once complete, so a failed run never leaves a partial archive behind.
pub fn write_archive(staging_root: &Path, name: &str) -> Result<PathBuf> {
    let archive_path = staging_root.join(format!("{name}.{ARCHIVE_EXTENSION}"));
    let failure = |source: std::io::Error| PackageError::ArchiveWriteFailure {
        path: archive_path.clone(),
        source,
    };

    let temp = tempfile::Builder::new()
        .prefix(".package-")
        .suffix(".partial")
        .tempfile_in(staging_root)
        .map_err(failure)?;

    {
        let encoder = GzEncoder::new(temp.as_file(), Compression::default());
        let mut builder = Builder::new(encoder);
        builder.mode(HeaderMode::Deterministic);

        for entry in WalkDir::new(staging_root).sort_by_file_name() {
            let entry = entry.map_err(|e| failure(e.into()))?;
            let path = entry.path();
            if !entry.file_type().is_file() || path == archive_path || path == temp.path() {
                continue;
            }

            let relative = path.strip_prefix(staging_root).unwrap_or(path);
            debug!("Adding {} to archive", relative.display());
            builder
                .append_path_with_name(path, relative)
                .map_err(failure)?;
        }

        let encoder = builder.into_inner().map_err(failure)?;
        encoder.finish().map_err(failure)?;
    }

    temp.persist(&archive_path).map_err(|e| failure(e.error))?;

    info!("Package generated successfully ({})", archive_path.display());
    Ok(archive_path)
}
