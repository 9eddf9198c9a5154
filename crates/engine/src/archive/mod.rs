mod cache;
mod file_system;
mod format;
mod layout;

pub use cache::{ArchiveCacheError, ArchiveCacheManager, TransitionOutcome};
pub use file_system::{ArchiveFileSystem, DiskArchiveFileSystem};
pub use format::{
    read_toc, write_archive, ArchiveEntry, ArchiveError, ArchiveToc, TocEntry,
    ARCHIVE_FORMAT_VERSION,
};
pub use layout::{
    normalize_path, resolve_archive, ArchiveLayout, ResolvedArchive, DEFAULT_ARCHIVE_EXTENSION,
    DEFAULT_SEPARATOR,
};
