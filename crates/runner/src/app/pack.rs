use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use sce_engine::archive::write_archive;
use sce_engine::{ArchiveEntry, ArchiveError};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub(crate) enum PackError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("no files found under {0}")]
    Empty(PathBuf),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

/// Packs every file below `source_dir` into one container. Entry paths are the
/// files' paths relative to `source_dir`.
pub(crate) fn pack_directory(
    source_dir: &Path,
    archive_path: &Path,
    segmented: bool,
) -> Result<usize, PackError> {
    let mut entries = Vec::new();
    collect_entries(source_dir, source_dir, &mut entries)?;
    if entries.is_empty() {
        return Err(PackError::Empty(source_dir.to_path_buf()));
    }
    write_archive(archive_path, segmented, &entries)?;

    info!(
        source = %source_dir.display(),
        archive = %archive_path.display(),
        entry_count = entries.len(),
        segmented,
        "archive_packed"
    );
    Ok(entries.len())
}

fn collect_entries(
    root: &Path,
    dir: &Path,
    out: &mut Vec<ArchiveEntry>,
) -> Result<(), PackError> {
    let read_error = |source: io::Error| PackError::Read {
        path: dir.to_path_buf(),
        source,
    };
    let mut children = fs::read_dir(dir)
        .map_err(read_error)?
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(read_error)?;
    children.sort();

    for child in children {
        if child.is_dir() {
            collect_entries(root, &child, out)?;
            continue;
        }
        let bytes = fs::read(&child).map_err(|source| PackError::Read {
            path: child.clone(),
            source,
        })?;
        let relative = child.strip_prefix(root).unwrap_or(&child);
        let entry_path = relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        out.push(ArchiveEntry::new(entry_path, bytes));
    }
    Ok(())
}
