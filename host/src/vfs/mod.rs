//! Virtual File System.
//!
//! The runtime only talks to filesystems through [`FileSystem`] and [`VirtualFile`], so a backend can be swapped at
//! configuration time. [`MemFs`] is the in-memory backend shipped with this crate.

use std::{
    io::SeekFrom,
    time::{SystemTime, UNIX_EPOCH},
};

pub use crate::vfs::{limits::VfsLimits, mem::MemFs};
use crate::error::{LimitExceeded, LimitedResource};

mod limits;
mod mem;
pub(crate) mod path;

/// Current wall clock time in nanoseconds since the UNIX epoch.
pub(crate) fn unix_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

/// Filesystem failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FsError {
    /// Entity not found.
    #[error("entity not found")]
    NotFound,

    /// Entity already exists.
    #[error("entity already exists")]
    AlreadyExists,

    /// Expected a directory but found a file.
    #[error("not a directory")]
    NotADirectory,

    /// Expected a file but found a directory.
    #[error("is a directory")]
    IsADirectory,

    /// Directory still has children.
    #[error("directory not empty")]
    NotEmpty,

    /// Seek to a negative or unrepresentable position.
    #[error("invalid offset")]
    InvalidOffset,

    /// Content is not valid UTF-8.
    #[error("invalid encoding")]
    InvalidEncoding,

    /// Path cannot be parsed.
    #[error("invalid path: {0}")]
    InvalidPath(&'static str),

    /// Operation is not valid for the given arguments.
    #[error("invalid input")]
    InvalidInput,

    /// Handle was not opened with the required access mode.
    #[error("permission denied")]
    PermissionDenied,

    /// Resource limit reached.
    #[error(transparent)]
    LimitExceeded(#[from] LimitExceeded),

    /// Operation not supported by this backend.
    #[error("unsupported operation")]
    Unsupported,

    /// Backend-specific I/O failure.
    #[error("I/O error")]
    Io,
}

impl From<FsError> for std::io::Error {
    fn from(e: FsError) -> Self {
        use std::io::ErrorKind;

        let kind = match e {
            FsError::NotFound => ErrorKind::NotFound,
            FsError::AlreadyExists => ErrorKind::AlreadyExists,
            FsError::NotADirectory => ErrorKind::NotADirectory,
            FsError::IsADirectory => ErrorKind::IsADirectory,
            FsError::NotEmpty => ErrorKind::DirectoryNotEmpty,
            FsError::InvalidOffset | FsError::InvalidInput => ErrorKind::InvalidInput,
            FsError::InvalidEncoding => ErrorKind::InvalidData,
            FsError::InvalidPath(_) => ErrorKind::InvalidFilename,
            FsError::PermissionDenied => ErrorKind::PermissionDenied,
            FsError::LimitExceeded(LimitExceeded {
                resource: LimitedResource::Path | LimitedResource::PathSegment,
                ..
            }) => ErrorKind::InvalidFilename,
            FsError::LimitExceeded(LimitExceeded {
                resource: LimitedResource::FileSize,
                ..
            }) => ErrorKind::FileTooLarge,
            FsError::LimitExceeded(_) => ErrorKind::QuotaExceeded,
            FsError::Unsupported => ErrorKind::Unsupported,
            FsError::Io => ErrorKind::Other,
        };
        Self::new(kind, e)
    }
}

/// Kind of a filesystem node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    /// Regular file.
    File,

    /// Directory.
    Directory,
}

/// Node metadata.
///
/// Timestamps are nanoseconds since the UNIX epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    /// Node kind.
    pub file_type: FileType,

    /// Size in bytes. Directories report 0.
    pub len: u64,

    /// Last read access.
    pub accessed: u64,

    /// Last content change.
    pub modified: u64,

    /// Creation.
    pub created: u64,
}

impl Metadata {
    /// Is this a directory?
    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Directory
    }

    /// Is this a regular file?
    pub fn is_file(&self) -> bool {
        self.file_type == FileType::File
    }
}

/// Directory listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// File name, without the parent path.
    pub name: String,

    /// Metadata at listing time.
    pub metadata: Metadata,
}

/// Options for [`FileSystem::open`].
///
/// Without any of `read`, `write` or `append` the file is opened read-only.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OpenOptions {
    /// Allow reading.
    read: bool,

    /// Allow writing at the cursor.
    write: bool,

    /// Allow writing, always at the end of the file.
    append: bool,

    /// Truncate the file to zero length.
    truncate: bool,

    /// Create the file if it is missing.
    create: bool,

    /// Create the file, failing if it exists.
    create_new: bool,
}

impl OpenOptions {
    /// Read-only options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set read access.
    pub fn read(self, read: bool) -> Self {
        Self { read, ..self }
    }

    /// Set write access.
    pub fn write(self, write: bool) -> Self {
        Self { write, ..self }
    }

    /// Set append mode.
    pub fn append(self, append: bool) -> Self {
        Self { append, ..self }
    }

    /// Set truncation.
    pub fn truncate(self, truncate: bool) -> Self {
        Self { truncate, ..self }
    }

    /// Create if missing.
    pub fn create(self, create: bool) -> Self {
        Self { create, ..self }
    }

    /// Always create, failing with [`FsError::AlreadyExists`] if the file exists.
    pub fn create_new(self, create_new: bool) -> Self {
        Self { create_new, ..self }
    }

    /// Handle may be read.
    pub fn is_readable(&self) -> bool {
        self.read || !self.is_writable()
    }

    /// Handle may be written.
    pub fn is_writable(&self) -> bool {
        self.write || self.append
    }

    /// Writes go to the end.
    pub fn is_append(&self) -> bool {
        self.append
    }

    /// Truncate on open.
    pub fn is_truncate(&self) -> bool {
        self.truncate
    }

    /// Missing files are created.
    pub fn is_create(&self) -> bool {
        self.create || self.create_new
    }

    /// Existing files are rejected.
    pub fn is_create_new(&self) -> bool {
        self.create_new
    }
}

/// Filesystem backend.
///
/// Paths are absolute and `/`-separated; relative paths are resolved against the root. Implementations must keep the
/// tree consistent under concurrent use, i.e. every mutation is atomic.
pub trait FileSystem: std::fmt::Debug + Send + Sync {
    /// List directory, sorted by name.
    fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>, FsError>;

    /// Create empty directory. The parent must exist.
    fn create_dir(&self, path: &str) -> Result<(), FsError>;

    /// Remove empty directory.
    fn remove_dir(&self, path: &str) -> Result<(), FsError>;

    /// Remove file.
    fn remove_file(&self, path: &str) -> Result<(), FsError>;

    /// Move node. A destination file is replaced if the source is a file as well.
    fn rename(&self, from: &str, to: &str) -> Result<(), FsError>;

    /// Node metadata.
    fn metadata(&self, path: &str) -> Result<Metadata, FsError>;

    /// Open file.
    fn open(&self, path: &str, options: &OpenOptions) -> Result<Box<dyn VirtualFile>, FsError>;
}

/// Open file handle with its own cursor.
///
/// Timestamps are nanoseconds since the UNIX epoch.
pub trait VirtualFile: std::fmt::Debug + Send {
    /// Last read access.
    fn last_accessed(&self) -> u64;

    /// Last content change.
    fn last_modified(&self) -> u64;

    /// Creation time. Never changes.
    fn created_time(&self) -> u64;

    /// Current size in bytes.
    fn size(&self) -> u64;

    /// Truncate or zero-extend to exactly `new_size` bytes.
    fn set_len(&mut self, new_size: u64) -> Result<(), FsError>;

    /// Read at the cursor, advancing it. Returns 0 at the end of the file.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, FsError>;

    /// Write at the cursor (or at the end in append mode), advancing it.
    ///
    /// The whole buffer is written; gaps are filled with zeros.
    fn write(&mut self, buf: &[u8]) -> Result<usize, FsError>;

    /// Move the cursor, returning the new absolute position.
    fn seek(&mut self, pos: SeekFrom) -> Result<u64, FsError>;

    /// Synchronize buffered state with the backend.
    fn flush(&mut self) -> Result<(), FsError>;

    /// Read at `offset` without moving the cursor.
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize, FsError> {
        let pos = self.seek(SeekFrom::Current(0))?;
        self.seek(SeekFrom::Start(offset))?;
        let res = self.read(buf);
        self.seek(SeekFrom::Start(pos))?;
        res
    }

    /// Write at `offset` without moving the cursor.
    fn write_at(&mut self, buf: &[u8], offset: u64) -> Result<usize, FsError> {
        let pos = self.seek(SeekFrom::Current(0))?;
        self.seek(SeekFrom::Start(offset))?;
        let res = self.write(buf);
        self.seek(SeekFrom::Start(pos))?;
        res
    }

    /// Read everything from the cursor to the end.
    fn read_to_end(&mut self) -> Result<Vec<u8>, FsError> {
        let mut out = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = self.read(&mut chunk)?;
            if n == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&chunk[..n]);
        }
    }

    /// Read everything from the cursor to the end as UTF-8.
    fn read_to_string(&mut self) -> Result<String, FsError> {
        String::from_utf8(self.read_to_end()?).map_err(|_| FsError::InvalidEncoding)
    }

    /// Write string.
    fn write_str(&mut self, s: &str) -> Result<usize, FsError> {
        self.write(s.as_bytes())
    }
}
