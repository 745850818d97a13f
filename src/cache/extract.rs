//! gzip-compressed tar extraction

use crate::error::{ArtcacheError, ArtcacheResult};
use flate2::read::GzDecoder;
use std::fs;
use std::io::Read;
use std::path::Path;
use tar::Archive;
use tracing::{debug, warn};

/// What an extraction wrote
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub files: usize,
    pub directories: usize,
    pub bytes: u64,
    /// Link entries and entries that would land outside the destination
    pub skipped: usize,
}

/// Unpack a `.tar.gz` stream under `destination`, preserving relative paths.
///
/// Symlinks and hard links are never materialized, so every served path is
/// a regular file written by this function.
///
/// Nothing is cleaned up on failure; callers must not treat `destination`
/// as valid unless this returns `Ok`.
pub fn extract<R: Read>(reader: R, destination: &Path) -> ArtcacheResult<ExtractSummary> {
    fs::create_dir_all(destination).map_err(|e| {
        ArtcacheError::io(format!("creating {}", destination.display()), e)
    })?;

    let mut archive = Archive::new(GzDecoder::new(reader));
    let mut summary = ExtractSummary::default();

    let entries = archive
        .entries()
        .map_err(|e| ArtcacheError::extract(destination, e))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| ArtcacheError::extract(destination, e))?;
        let entry_type = entry.header().entry_type();
        let size = entry.header().size().unwrap_or(0);
        let path = entry
            .path()
            .map_err(|e| ArtcacheError::extract(destination, e))?
            .into_owned();

        if entry_type.is_symlink() || entry_type.is_hard_link() {
            warn!("Skipping link entry {} in archive", path.display());
            summary.skipped += 1;
            continue;
        }

        let unpacked = entry
            .unpack_in(destination)
            .map_err(|e| ArtcacheError::extract(destination, e))?;
        if !unpacked {
            warn!(
                "Skipping archive entry {} outside {}",
                path.display(),
                destination.display()
            );
            summary.skipped += 1;
            continue;
        }

        if entry_type.is_dir() {
            summary.directories += 1;
        } else if entry_type.is_file() {
            summary.files += 1;
            summary.bytes += size;
        }
    }

    debug!(
        "Extracted {} files ({} bytes) into {}",
        summary.files,
        summary.bytes,
        destination.display()
    );
    Ok(summary)
}

/// Build an in-memory `.tar.gz` from `(path, contents)` pairs
#[cfg(test)]
pub(crate) fn build_archive(files: &[(&str, &[u8])]) -> Vec<u8> {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (path, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, *contents).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}
