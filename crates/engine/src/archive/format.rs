use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;

use super::layout::normalize_path;

const MAGIC: &[u8; 4] = b"SCEA";
const HEADER_LEN: usize = 4 + 2 + 1 + 4 + 4;
const HASH_LEN: usize = 32;
const FLAG_SEGMENTED: u8 = 1 << 0;
// u16 path length, u32 offset, u32 length.
const MIN_TOC_ENTRY_LEN: usize = 2 + 4 + 4;
const STAGING_SUFFIX: &str = ".partial";

pub const ARCHIVE_FORMAT_VERSION: u16 = 1;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive {name} not found")]
    NotFound { name: String },
    #[error("no archive entry at {path}")]
    EntryNotFound { path: String },
    #[error("failed to read/write file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("archive at {path} has invalid format: {message}")]
    InvalidFormat { path: PathBuf, message: String },
}

/// One file to be packed into a container.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub path: String,
    pub bytes: Vec<u8>,
}

impl ArchiveEntry {
    pub fn new(path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            bytes: bytes.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry {
    pub path: String,
    pub offset: u32,
    pub len: u32,
}

/// Table of contents of a container, readable without touching the data blob.
#[derive(Debug, Clone)]
pub struct ArchiveToc {
    pub segmented: bool,
    pub entries: Vec<TocEntry>,
    pub data_offset: u64,
    pub data_hash: [u8; HASH_LEN],
}

impl ArchiveToc {
    pub fn data_len(&self) -> u64 {
        self.entries
            .iter()
            .map(|entry| u64::from(entry.offset) + u64::from(entry.len))
            .max()
            .unwrap_or(0)
    }
}

/// Writes a container holding `entries`. Entry paths are normalized to lower
/// case with `/` separators and stored sorted.
pub fn write_archive(
    path: &Path,
    segmented: bool,
    entries: &[ArchiveEntry],
) -> Result<(), ArchiveError> {
    let mut sorted = entries
        .iter()
        .map(|entry| (normalize_path(&entry.path), entry.bytes.as_slice()))
        .collect::<Vec<_>>();
    sorted.sort_by(|(a, _), (b, _)| a.cmp(b));
    if let Some(window) = sorted.windows(2).find(|pair| pair[0].0 == pair[1].0) {
        return Err(invalid_format(
            path,
            &format!("duplicate entry path {}", window[0].0),
        ));
    }

    let mut toc = Vec::<u8>::new();
    let mut data = Vec::<u8>::new();
    for (entry_path, bytes) in &sorted {
        let path_len = u16::try_from(entry_path.len())
            .map_err(|_| invalid_format(path, "entry path longer than u16::MAX bytes"))?;
        if path_len == 0 {
            return Err(invalid_format(path, "empty entry path"));
        }
        let offset = u32::try_from(data.len())
            .map_err(|_| invalid_format(path, "archive data exceeds u32 offsets"))?;
        let len = u32::try_from(bytes.len())
            .map_err(|_| invalid_format(path, "entry exceeds u32 length"))?;
        toc.extend_from_slice(&path_len.to_le_bytes());
        toc.extend_from_slice(entry_path.as_bytes());
        toc.extend_from_slice(&offset.to_le_bytes());
        toc.extend_from_slice(&len.to_le_bytes());
        data.extend_from_slice(bytes);
    }
    let entry_count = u32::try_from(sorted.len())
        .map_err(|_| invalid_format(path, "too many entries"))?;
    let toc_len =
        u32::try_from(toc.len()).map_err(|_| invalid_format(path, "table of contents too large"))?;

    let mut bytes = Vec::<u8>::with_capacity(HEADER_LEN + toc.len() + HASH_LEN + data.len());
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&ARCHIVE_FORMAT_VERSION.to_le_bytes());
    bytes.push(if segmented { FLAG_SEGMENTED } else { 0 });
    bytes.extend_from_slice(&entry_count.to_le_bytes());
    bytes.extend_from_slice(&toc_len.to_le_bytes());
    bytes.extend_from_slice(&toc);
    bytes.extend_from_slice(&Sha256::digest(&data));
    bytes.extend_from_slice(&data);

    persist(path, &bytes)
}

// Stages the bytes beside `path` and renames them over it, so readers never
// see a partially written container.
fn persist(path: &Path, bytes: &[u8]) -> Result<(), ArchiveError> {
    let to_error = |source: io::Error| io_error(path, source);
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(to_error)?;
    }
    let mut staging = path.as_os_str().to_owned();
    staging.push(STAGING_SUFFIX);
    let staging = PathBuf::from(staging);

    fs::write(&staging, bytes).map_err(to_error)?;
    let swapped = match fs::remove_file(path) {
        Err(error) if error.kind() != io::ErrorKind::NotFound => Err(error),
        _ => fs::rename(&staging, path),
    };
    swapped.map_err(|source| {
        let _ = fs::remove_file(&staging);
        to_error(source)
    })
}

/// Reads only the header and table of contents of the container at `path`.
pub fn read_toc(path: &Path) -> Result<ArchiveToc, ArchiveError> {
    let mut file = File::open(path).map_err(|source| io_error(path, source))?;
    let file_len = file
        .metadata()
        .map_err(|source| io_error(path, source))?
        .len();

    let mut header_bytes = [0u8; HEADER_LEN];
    read_from(&mut file, &mut header_bytes, path)?;
    let mut header = TocReader::new(&header_bytes, path);
    if header.take(MAGIC.len())? != MAGIC {
        return Err(invalid_format(path, "invalid magic"));
    }
    let version = header.u16()?;
    if version != ARCHIVE_FORMAT_VERSION {
        return Err(invalid_format(
            path,
            &format!("unsupported format version {version}"),
        ));
    }
    let flags = header.u8()?;
    let entry_count = header.u32()? as usize;
    let toc_len = header.u32()? as usize;

    let data_offset = (HEADER_LEN + toc_len + HASH_LEN) as u64;
    if data_offset > file_len {
        return Err(invalid_format(path, "unexpected end of file"));
    }
    if entry_count > toc_len / MIN_TOC_ENTRY_LEN {
        return Err(invalid_format(
            path,
            &format!("{entry_count} entries cannot fit in a {toc_len}-byte table of contents"),
        ));
    }
    let mut toc_and_hash = vec![0u8; toc_len + HASH_LEN];
    read_from(&mut file, &mut toc_and_hash, path)?;
    let (toc_bytes, hash_bytes) = toc_and_hash.split_at(toc_len);

    let mut reader = TocReader::new(toc_bytes, path);
    let mut entries = Vec::<TocEntry>::with_capacity(entry_count);
    for _ in 0..entry_count {
        entries.push(TocEntry {
            path: reader.string()?,
            offset: reader.u32()?,
            len: reader.u32()?,
        });
    }
    if !reader.is_at_end() {
        return Err(invalid_format(path, "table of contents length mismatch"));
    }
    let data_hash: [u8; HASH_LEN] = hash_bytes
        .try_into()
        .map_err(|_| invalid_format(path, "invalid data hash"))?;

    let toc = ArchiveToc {
        segmented: flags & FLAG_SEGMENTED != 0,
        entries,
        data_offset,
        data_hash,
    };
    if toc.data_offset + toc.data_len() != file_len {
        return Err(invalid_format(path, "data length does not match entries"));
    }
    Ok(toc)
}

/// Reads and verifies the whole data blob of a container.
pub fn read_data(path: &Path, toc: &ArchiveToc) -> Result<Vec<u8>, ArchiveError> {
    let bytes = fs::read(path).map_err(|source| io_error(path, source))?;
    let start = toc.data_offset as usize;
    if start > bytes.len() || (bytes.len() - start) as u64 != toc.data_len() {
        return Err(invalid_format(path, "data length does not match entries"));
    }
    let data = &bytes[start..];
    if Sha256::digest(data).as_slice() != toc.data_hash.as_slice() {
        return Err(invalid_format(path, "data hash mismatch"));
    }
    Ok(data.to_vec())
}

/// Reads one entry straight from disk without loading the container.
pub fn read_entry_from_disk(
    path: &Path,
    toc: &ArchiveToc,
    entry: &TocEntry,
) -> Result<Vec<u8>, ArchiveError> {
    let mut file = File::open(path).map_err(|source| io_error(path, source))?;
    file.seek(SeekFrom::Start(toc.data_offset + u64::from(entry.offset)))
        .map_err(|source| io_error(path, source))?;
    let mut out = vec![0u8; entry.len as usize];
    read_from(&mut file, &mut out, path)?;
    Ok(out)
}

fn read_from(file: &mut File, buf: &mut [u8], path: &Path) -> Result<(), ArchiveError> {
    file.read_exact(buf).map_err(|source| {
        if source.kind() == io::ErrorKind::UnexpectedEof {
            invalid_format(path, "unexpected end of file")
        } else {
            io_error(path, source)
        }
    })
}

struct TocReader<'a> {
    bytes: &'a [u8],
    position: usize,
    path: &'a Path,
}

impl<'a> TocReader<'a> {
    fn new(bytes: &'a [u8], path: &'a Path) -> Self {
        Self {
            bytes,
            position: 0,
            path,
        }
    }

    fn is_at_end(&self) -> bool {
        self.position == self.bytes.len()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ArchiveError> {
        let bytes = self.bytes;
        let rest = &bytes[self.position..];
        if len > rest.len() {
            return Err(invalid_format(self.path, "unexpected end of table"));
        }
        self.position += len;
        Ok(&rest[..len])
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], ArchiveError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, ArchiveError> {
        Ok(self.take_array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, ArchiveError> {
        self.take_array().map(u16::from_le_bytes)
    }

    fn u32(&mut self) -> Result<u32, ArchiveError> {
        self.take_array().map(u32::from_le_bytes)
    }

    fn string(&mut self) -> Result<String, ArchiveError> {
        let len = usize::from(self.u16()?);
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec())
            .map_err(|_| invalid_format(self.path, "invalid UTF-8 entry path"))
    }
}

fn io_error(path: &Path, source: io::Error) -> ArchiveError {
    ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn invalid_format(path: &Path, message: &str) -> ArchiveError {
    ArchiveError::InvalidFormat {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}
