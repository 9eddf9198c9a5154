use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::format::{read_data, read_entry_from_disk, read_toc, ArchiveError, ArchiveToc};
use super::layout::{normalize_path, ArchiveLayout};

/// Named, randomly addressable containers that can be pinned in memory.
///
/// Virtual paths start with the name of a whole-region container
/// (`m01.pak/scene1/map.bin`); entries of segmented containers carry such
/// paths themselves, so one segmented container can serve several regions.
pub trait ArchiveFileSystem {
    /// Name of the segmented container holding `virtual_path` (a folder or an
    /// entry), if any.
    fn segmented_archive_containing(&self, virtual_path: &str) -> Option<String>;

    fn load_archive_into_memory(&mut self, archive_name: &str) -> Result<(), ArchiveError>;

    /// Drops the in-memory copy of `archive_name`. Returns false if it was not
    /// resident.
    fn dispose_in_memory_archive(&mut self, archive_name: &str) -> bool;

    fn is_resident(&self, archive_name: &str) -> bool;

    fn entry_exists(&self, virtual_path: &str) -> bool;

    fn read_entry(&self, virtual_path: &str) -> Result<Vec<u8>, ArchiveError>;
}

struct MountedArchive {
    file_path: PathBuf,
    toc: ArchiveToc,
}

struct EntryLocation {
    archive: String,
    entry_index: usize,
}

/// Containers found in one directory on disk.
///
/// Mounting reads only tables of contents. Entry reads come from memory when
/// the owning container is resident and from disk otherwise.
pub struct DiskArchiveFileSystem {
    root: PathBuf,
    archives: HashMap<String, MountedArchive>,
    entries: HashMap<String, EntryLocation>,
    segment_folders: HashMap<String, String>,
    resident: HashMap<String, Vec<u8>>,
}

impl DiskArchiveFileSystem {
    pub fn mount(root: &Path, layout: &ArchiveLayout) -> Result<Self, ArchiveError> {
        let mut file_system = Self {
            root: root.to_path_buf(),
            archives: HashMap::new(),
            entries: HashMap::new(),
            segment_folders: HashMap::new(),
            resident: HashMap::new(),
        };

        let mut container_paths = Vec::<(String, PathBuf)>::new();
        let dir_entries = fs::read_dir(root).map_err(|source| ArchiveError::Io {
            path: root.to_path_buf(),
            source,
        })?;
        for dir_entry in dir_entries {
            let dir_entry = dir_entry.map_err(|source| ArchiveError::Io {
                path: root.to_path_buf(),
                source,
            })?;
            let path = dir_entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            let archive_name = file_name.to_lowercase();
            if archive_name.ends_with(&layout.extension) {
                container_paths.push((archive_name, path));
            }
        }
        container_paths.sort_by(|(a, _), (b, _)| a.cmp(b));

        for (archive_name, file_path) in container_paths {
            let toc = read_toc(&file_path)?;
            file_system.index_archive(&archive_name, &toc);
            file_system
                .archives
                .insert(archive_name, MountedArchive { file_path, toc });
        }

        info!(
            root = %file_system.root.display(),
            archive_count = file_system.archives.len(),
            entry_count = file_system.entries.len(),
            segment_folder_count = file_system.segment_folders.len(),
            "archive_file_system_mounted"
        );
        Ok(file_system)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Mounted container names in ascending order.
    pub fn archive_names(&self) -> Vec<&str> {
        let mut names = self.archives.keys().map(String::as_str).collect::<Vec<_>>();
        names.sort_unstable();
        names
    }

    pub fn resident_archive_names(&self) -> Vec<&str> {
        let mut names = self.resident.keys().map(String::as_str).collect::<Vec<_>>();
        names.sort_unstable();
        names
    }

    pub fn resident_bytes(&self) -> usize {
        self.resident.values().map(Vec::len).sum()
    }

    fn index_archive(&mut self, archive_name: &str, toc: &ArchiveToc) {
        for (entry_index, entry) in toc.entries.iter().enumerate() {
            let virtual_path = if toc.segmented {
                entry.path.clone()
            } else {
                format!("{archive_name}/{}", entry.path)
            };

            if toc.segmented {
                let components = virtual_path.split('/').collect::<Vec<_>>();
                for depth in 1..components.len() {
                    let folder = components[..depth].join("/");
                    if let Some(owner) = self.segment_folders.get(&folder) {
                        if owner != archive_name {
                            warn!(
                                folder = %folder,
                                owner = %owner,
                                ignored = %archive_name,
                                "segment_folder_claimed_twice"
                            );
                        }
                        continue;
                    }
                    self.segment_folders
                        .insert(folder, archive_name.to_string());
                }
            }

            if self.entries.contains_key(&virtual_path) {
                warn!(
                    path = %virtual_path,
                    ignored = %archive_name,
                    "archive_entry_shadowed"
                );
                continue;
            }
            self.entries.insert(
                virtual_path,
                EntryLocation {
                    archive: archive_name.to_string(),
                    entry_index,
                },
            );
        }
    }
}

impl ArchiveFileSystem for DiskArchiveFileSystem {
    fn segmented_archive_containing(&self, virtual_path: &str) -> Option<String> {
        let normalized = normalize_path(virtual_path);
        if let Some(owner) = self.segment_folders.get(&normalized) {
            return Some(owner.clone());
        }
        let location = self.entries.get(&normalized)?;
        self.archives
            .get(&location.archive)
            .filter(|mounted| mounted.toc.segmented)
            .map(|_| location.archive.clone())
    }

    fn load_archive_into_memory(&mut self, archive_name: &str) -> Result<(), ArchiveError> {
        let name = archive_name.to_lowercase();
        if self.resident.contains_key(&name) {
            debug!(archive = %name, "archive_already_resident");
            return Ok(());
        }
        let mounted = self
            .archives
            .get(&name)
            .ok_or_else(|| ArchiveError::NotFound { name: name.clone() })?;
        let data = read_data(&mounted.file_path, &mounted.toc)?;
        info!(
            archive = %name,
            bytes = data.len(),
            entry_count = mounted.toc.entries.len(),
            "archive_loaded_into_memory"
        );
        self.resident.insert(name, data);
        Ok(())
    }

    fn dispose_in_memory_archive(&mut self, archive_name: &str) -> bool {
        let name = archive_name.to_lowercase();
        match self.resident.remove(&name) {
            Some(data) => {
                info!(archive = %name, bytes = data.len(), "archive_disposed_from_memory");
                true
            }
            None => false,
        }
    }

    fn is_resident(&self, archive_name: &str) -> bool {
        self.resident.contains_key(&archive_name.to_lowercase())
    }

    fn entry_exists(&self, virtual_path: &str) -> bool {
        self.entries.contains_key(&normalize_path(virtual_path))
    }

    fn read_entry(&self, virtual_path: &str) -> Result<Vec<u8>, ArchiveError> {
        let normalized = normalize_path(virtual_path);
        let not_found = || ArchiveError::EntryNotFound {
            path: normalized.clone(),
        };
        let location = self.entries.get(&normalized).ok_or_else(not_found)?;
        let mounted = self.archives.get(&location.archive).ok_or_else(not_found)?;
        let entry = mounted
            .toc
            .entries
            .get(location.entry_index)
            .ok_or_else(not_found)?;

        match self.resident.get(&location.archive) {
            Some(data) => {
                let start = entry.offset as usize;
                let end = start + entry.len as usize;
                data.get(start..end)
                    .map(<[u8]>::to_vec)
                    .ok_or_else(|| ArchiveError::InvalidFormat {
                        path: mounted.file_path.clone(),
                        message: format!("entry {normalized} out of bounds"),
                    })
            }
            None => read_entry_from_disk(&mounted.file_path, &mounted.toc, entry),
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::archive::format::{write_archive, ArchiveEntry};

    fn build_data_root() -> TempDir {
        let temp = TempDir::new().expect("temp");
        write_archive(
            &temp.path().join("q01.pak"),
            false,
            &[
                ArchiveEntry::new("q01a/map.bin", b"q01a-map".to_vec()),
                ArchiveEntry::new("q01b/map.bin", b"q01b-map".to_vec()),
            ],
        )
        .expect("whole archive");
        write_archive(
            &temp.path().join("seg01.pak"),
            true,
            &[
                ArchiveEntry::new("m01.pak/1/map.bin", b"m01-1".to_vec()),
                ArchiveEntry::new("m02.pak/1/map.bin", b"m02-1".to_vec()),
            ],
        )
        .expect("segmented archive");
        fs::write(temp.path().join("readme.txt"), b"not an archive").expect("stray file");
        temp
    }

    #[test]
    fn mount_indexes_whole_and_segmented_containers() {
        let temp = build_data_root();
        let file_system =
            DiskArchiveFileSystem::mount(temp.path(), &ArchiveLayout::default()).expect("mount");

        assert_eq!(file_system.archive_names(), vec!["q01.pak", "seg01.pak"]);
        assert_eq!(
            file_system.segmented_archive_containing("M01.pak\\1"),
            Some("seg01.pak".to_string())
        );
        assert_eq!(
            file_system.segmented_archive_containing("m02.pak/1/map.bin"),
            Some("seg01.pak".to_string())
        );
        assert_eq!(file_system.segmented_archive_containing("q01.pak/q01a"), None);
        assert!(file_system.entry_exists("q01.pak/q01b/map.bin"));
    }

    #[test]
    fn reads_come_from_disk_until_loaded() {
        let temp = build_data_root();
        let mut file_system =
            DiskArchiveFileSystem::mount(temp.path(), &ArchiveLayout::default()).expect("mount");

        assert_eq!(
            file_system.read_entry("q01.pak/q01a/map.bin").expect("disk read"),
            b"q01a-map"
        );
        assert!(!file_system.is_resident("q01.pak"));

        file_system.load_archive_into_memory("Q01.pak").expect("load");
        assert!(file_system.is_resident("q01.pak"));
        assert_eq!(file_system.resident_bytes(), 16);
        assert_eq!(
            file_system.read_entry("q01.pak/q01b/map.bin").expect("memory read"),
            b"q01b-map"
        );

        assert!(file_system.dispose_in_memory_archive("q01.pak"));
        assert!(!file_system.dispose_in_memory_archive("q01.pak"));
        assert_eq!(file_system.resident_bytes(), 0);
    }

    #[test]
    fn loading_unknown_archive_is_not_found() {
        let temp = build_data_root();
        let mut file_system =
            DiskArchiveFileSystem::mount(temp.path(), &ArchiveLayout::default()).expect("mount");
        assert!(matches!(
            file_system.load_archive_into_memory("z99.pak"),
            Err(ArchiveError::NotFound { ref name }) if name == "z99.pak"
        ));
    }

    #[test]
    fn missing_entry_is_reported() {
        let temp = build_data_root();
        let file_system =
            DiskArchiveFileSystem::mount(temp.path(), &ArchiveLayout::default()).expect("mount");
        assert!(matches!(
            file_system.read_entry("q01.pak/nope.bin"),
            Err(ArchiveError::EntryNotFound { .. })
        ));
    }
}
