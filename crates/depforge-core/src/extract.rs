//! Unpacking gzip'd tarballs into a staging directory.

use crate::ProvisionError;
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

/// Extract a `.tar.gz` archive into `dest_dir`.
///
/// `dest_dir` must already exist. Any failure to read, decompress or
/// unpack, including an archive with no entries, is reported as
/// [`ProvisionError::Extract`].
pub fn extract_archive(archive_path: &Path, dest_dir: &Path) -> Result<(), ProvisionError> {
    let extract_error = |reason: String| ProvisionError::Extract {
        archive: archive_path.to_path_buf(),
        reason,
    };

    let file = File::open(archive_path).map_err(|e| extract_error(e.to_string()))?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    archive.set_preserve_permissions(true);

    archive
        .unpack(dest_dir)
        .map_err(|e| extract_error(e.to_string()))?;

    let is_empty = fs::read_dir(dest_dir)?.next().is_none();
    if is_empty {
        return Err(extract_error("archive contains no files".to_string()));
    }

    Ok(())
}

/// Locate the root of an extracted source tree.
///
/// Release tarballs usually wrap everything in a single top-level directory
/// (`boost_1_48_0/`). If that is the case, return it; otherwise the
/// extraction directory itself is the root.
pub fn source_root(extract_dir: &Path) -> io::Result<PathBuf> {
    let mut entries = fs::read_dir(extract_dir)?;
    if let (Some(first), None) = (entries.next(), entries.next()) {
        let path = first?.path();
        if path.is_dir() {
            return Ok(path);
        }
    }
    Ok(extract_dir.to_path_buf())
}
