//! In-memory filesystem.
//!
//! The directory tree sits behind a single [`RwLock`], so every structural change (create, remove, rename) happens
//! under one write guard. File contents live in their own shared node, which lets open handles read and write without
//! touching the tree lock. Locks are always taken tree first, file second.
//!
//! All changes are constrained by [`VfsLimits`].

use std::{
    collections::BTreeMap,
    io::{Cursor, Read, SeekFrom},
    sync::{
        Arc, RwLock, RwLockReadGuard, RwLockWriteGuard,
        atomic::{AtomicU64, Ordering},
    },
};

use crate::{
    error::{LimitExceeded, LimitedResource},
    vfs::{
        DirEntry, FileSystem, FileType, FsError, Metadata, OpenOptions, VfsLimits, VirtualFile,
        path::{PathSegment, VfsPath},
        unix_nanos,
    },
};

/// Shared version of [`FileNode`].
type SharedFileNode = Arc<RwLock<FileNode>>;

/// Node timestamps, in nanoseconds since the UNIX epoch.
#[derive(Debug, Clone, Copy)]
struct Timestamps {
    /// Creation.
    created: u64,

    /// Last read.
    accessed: u64,

    /// Last write.
    modified: u64,
}

impl Timestamps {
    /// All timestamps set to "now".
    fn now() -> Self {
        let now = unix_nanos();
        Self {
            created: now,
            accessed: now,
            modified: now,
        }
    }
}

/// File content.
#[derive(Debug)]
struct FileNode {
    /// File content stored in memory.
    content: Vec<u8>,

    /// Timestamps.
    times: Timestamps,

    /// Set once the file is removed from the tree.
    unlinked: bool,
}

impl FileNode {
    /// Create empty file.
    fn new() -> Self {
        Self {
            content: Vec::new(),
            times: Timestamps::now(),
            unlinked: false,
        }
    }

    /// Get metadata.
    fn metadata(&self) -> Metadata {
        Metadata {
            file_type: FileType::File,
            len: self.content.len() as u64,
            accessed: self.times.accessed,
            modified: self.times.modified,
            created: self.times.created,
        }
    }

    /// Truncate or zero-extend content, keeping storage accounting in sync.
    fn resize(&mut self, new_len: u64, accounting: &Accounting) -> Result<(), FsError> {
        let old_len = self.content.len() as u64;
        let new_len_usize = usize::try_from(new_len).map_err(|_| FsError::InvalidOffset)?;

        if new_len > old_len {
            if new_len > accounting.limits.max_file_size {
                return Err(LimitExceeded {
                    resource: LimitedResource::FileSize,
                    limit: accounting.limits.max_file_size,
                    current: old_len,
                    requested: new_len - old_len,
                }
                .into());
            }
            accounting.storage.inc(new_len - old_len)?;
        } else {
            accounting.storage.dec(old_len - new_len)?;
        }

        self.content.resize(new_len_usize, 0);
        Ok(())
    }
}

/// Lock file node for modification, failing if it was removed.
fn lock_live(node: &SharedFileNode) -> Result<RwLockWriteGuard<'_, FileNode>, FsError> {
    let guard = node.write().expect("not poisoned");
    if guard.unlinked {
        return Err(FsError::NotFound);
    }
    Ok(guard)
}

/// Directory.
#[derive(Debug)]
struct DirNode {
    /// Child nodes indexed by name.
    ///
    /// Ordered, so listings are stable.
    children: BTreeMap<PathSegment, VfsNode>,

    /// Timestamps.
    times: Timestamps,
}

impl DirNode {
    /// Create empty directory.
    fn new() -> Self {
        Self {
            children: BTreeMap::new(),
            times: Timestamps::now(),
        }
    }

    /// Get metadata.
    fn metadata(&self) -> Metadata {
        Metadata {
            file_type: FileType::Directory,
            len: 0,
            accessed: self.times.accessed,
            modified: self.times.modified,
            created: self.times.created,
        }
    }

    /// Walk down to a directory.
    fn dir(&self, path: &[PathSegment]) -> Result<&Self, FsError> {
        let mut current = self;
        for segment in path {
            current = match current.children.get(segment) {
                Some(VfsNode::Directory(dir)) => dir,
                Some(VfsNode::File(_)) => return Err(FsError::NotADirectory),
                None => return Err(FsError::NotFound),
            };
        }
        Ok(current)
    }

    /// Walk down to a directory, mutable version.
    fn dir_mut(&mut self, path: &[PathSegment]) -> Result<&mut Self, FsError> {
        let mut current = self;
        for segment in path {
            current = match current.children.get_mut(segment) {
                Some(VfsNode::Directory(dir)) => dir,
                Some(VfsNode::File(_)) => return Err(FsError::NotADirectory),
                None => return Err(FsError::NotFound),
            };
        }
        Ok(current)
    }
}

/// A node in the filesystem tree.
#[derive(Debug)]
enum VfsNode {
    /// A regular file.
    File(SharedFileNode),

    /// A directory containing child nodes.
    Directory(DirNode),
}

impl VfsNode {
    /// Get metadata.
    fn metadata(&self) -> Metadata {
        match self {
            Self::File(file) => file.read().expect("not poisoned").metadata(),
            Self::Directory(dir) => dir.metadata(),
        }
    }

    /// Is this a directory?
    fn is_dir(&self) -> bool {
        matches!(self, Self::Directory(_))
    }
}

/// Tracked allocation of some resource.
#[derive(Debug)]
struct Allocation {
    /// Current amount of allocation.
    n: AtomicU64,

    /// The resource.
    resource: LimitedResource,

    /// Allocation limit.
    limit: u64,
}

impl Allocation {
    /// Create new allocation tracker for given resource.
    fn new(resource: LimitedResource, limit: u64) -> Self {
        Self {
            n: AtomicU64::new(0),
            resource,
            limit,
        }
    }

    /// Get current allocation size.
    fn get(&self) -> u64 {
        self.n.load(Ordering::SeqCst)
    }

    /// Increase allocation by given amount.
    fn inc(&self, n: u64) -> Result<(), LimitExceeded> {
        self.n
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |old| {
                let new = old.checked_add(n)?;
                (new <= self.limit).then_some(new)
            })
            .map(|_| ())
            .map_err(|current| LimitExceeded {
                resource: self.resource,
                limit: self.limit,
                current,
                requested: n,
            })
    }

    /// Decrease allocation by given amount.
    fn dec(&self, n: u64) -> Result<(), LimitExceeded> {
        self.n
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |old| old.checked_sub(n))
            .map(|_| ())
            .map_err(|current| LimitExceeded {
                resource: self.resource,
                limit: self.limit,
                current,
                requested: n,
            })
    }
}

/// Limits and their current allocations.
///
/// Shared between the filesystem and all open handles.
#[derive(Debug)]
struct Accounting {
    /// Limits.
    limits: VfsLimits,

    /// Current allocation of inodes.
    inodes: Allocation,

    /// Current allocation of storage bytes.
    storage: Allocation,
}

/// In-memory filesystem.
#[derive(Debug)]
pub struct MemFs {
    /// Root directory.
    root: RwLock<DirNode>,

    /// Resource accounting.
    accounting: Arc<Accounting>,
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new(VfsLimits::default())
    }
}

impl MemFs {
    /// Create a new filesystem that only contains the root directory.
    pub fn new(limits: VfsLimits) -> Self {
        let inodes = Allocation::new(LimitedResource::Inodes, limits.inodes);
        let storage = Allocation::new(LimitedResource::Storage, limits.max_storage_bytes);

        Self {
            root: RwLock::new(DirNode::new()),
            accounting: Arc::new(Accounting {
                limits,
                inodes,
                storage,
            }),
        }
    }

    /// Unpack directories and regular files of a TAR archive into the filesystem.
    ///
    /// Paths inside the archive are resolved against the root. Existing files are overwritten.
    pub fn populate_from_tar(&self, tar_data: &[u8]) -> std::io::Result<()> {
        let inodes_pre = self.accounting.inodes.get();
        let storage_pre = self.accounting.storage.get();

        let mut archive = tar::Archive::new(Cursor::new(tar_data));
        for entry in archive.entries()? {
            let mut entry = entry?;
            let path = entry.path()?.to_string_lossy().into_owned();

            match entry.header().entry_type() {
                tar::EntryType::Directory => match self.create_dir(&path) {
                    Ok(()) => {}
                    Err(FsError::AlreadyExists) => {
                        if !self.metadata(&path)?.is_dir() {
                            return Err(FsError::NotADirectory.into());
                        }
                    }
                    Err(e) => return Err(e.into()),
                },
                tar::EntryType::Regular => {
                    let mut content = Vec::new();
                    entry.read_to_end(&mut content)?;

                    let options = OpenOptions::new().write(true).create(true).truncate(true);
                    let mut file = self.open(&path, &options)?;
                    file.write(&content)?;
                }
                other => {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::Unsupported,
                        format!("Unsupported TAR content: {other:?} @ {path}"),
                    ));
                }
            }
        }

        log::info!(
            "unpacked {} inodes and {} bytes from {} bytes TAR",
            self.accounting.inodes.get().saturating_sub(inodes_pre),
            self.accounting.storage.get().saturating_sub(storage_pre),
            tar_data.len(),
        );

        Ok(())
    }

    /// Parse path.
    fn parse(&self, path: &str) -> Result<VfsPath, FsError> {
        VfsPath::parse(path, &self.accounting.limits)
    }

    /// Lock tree for reading.
    fn read_root(&self) -> RwLockReadGuard<'_, DirNode> {
        self.root.read().expect("not poisoned")
    }

    /// Lock tree for writing.
    fn write_root(&self) -> RwLockWriteGuard<'_, DirNode> {
        self.root.write().expect("not poisoned")
    }

    /// Release a file that was detached from the tree.
    ///
    /// Open handles observe [`FsError::NotFound`] afterwards.
    fn unlink(&self, file: &SharedFileNode) -> Result<(), FsError> {
        let mut node = file.write().expect("not poisoned");
        node.unlinked = true;
        let content = std::mem::take(&mut node.content);
        self.accounting.storage.dec(content.len() as u64)?;
        self.accounting.inodes.dec(1)?;
        Ok(())
    }
}

impl FileSystem for MemFs {
    fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>, FsError> {
        let path = self.parse(path)?;
        let root = self.read_root();
        let dir = root.dir(path.segments())?;

        Ok(dir
            .children
            .iter()
            .map(|(name, node)| DirEntry {
                name: name.to_string(),
                metadata: node.metadata(),
            })
            .collect())
    }

    fn create_dir(&self, path: &str) -> Result<(), FsError> {
        let path = self.parse(path)?;
        let Some((parent, name)) = path.split_last() else {
            return Err(FsError::AlreadyExists);
        };

        let mut root = self.write_root();
        let parent = root.dir_mut(parent)?;
        if parent.children.contains_key(name) {
            return Err(FsError::AlreadyExists);
        }

        self.accounting.inodes.inc(1)?;
        parent
            .children
            .insert(name.clone(), VfsNode::Directory(DirNode::new()));
        Ok(())
    }

    fn remove_dir(&self, path: &str) -> Result<(), FsError> {
        let path = self.parse(path)?;
        let Some((parent, name)) = path.split_last() else {
            return Err(FsError::InvalidInput);
        };

        let mut root = self.write_root();
        let parent = root.dir_mut(parent)?;
        let is_empty = match parent.children.get(name) {
            None => return Err(FsError::NotFound),
            Some(VfsNode::File(_)) => return Err(FsError::NotADirectory),
            Some(VfsNode::Directory(dir)) => dir.children.is_empty(),
        };
        if !is_empty {
            return Err(FsError::NotEmpty);
        }

        parent.children.remove(name);
        self.accounting.inodes.dec(1)?;
        Ok(())
    }

    fn remove_file(&self, path: &str) -> Result<(), FsError> {
        let path = self.parse(path)?;
        let Some((parent, name)) = path.split_last() else {
            return Err(FsError::IsADirectory);
        };

        let mut root = self.write_root();
        let parent = root.dir_mut(parent)?;
        let file = match parent.children.get(name) {
            None => return Err(FsError::NotFound),
            Some(VfsNode::Directory(_)) => return Err(FsError::IsADirectory),
            Some(VfsNode::File(file)) => Arc::clone(file),
        };

        parent.children.remove(name);
        self.unlink(&file)
    }

    fn rename(&self, from: &str, to: &str) -> Result<(), FsError> {
        let from = self.parse(from)?;
        let to = self.parse(to)?;
        let Some((from_parent, from_name)) = from.split_last() else {
            return Err(FsError::InvalidInput);
        };

        let mut root = self.write_root();

        // validate everything before touching the tree
        let source_is_dir = root
            .dir(from_parent)?
            .children
            .get(from_name)
            .ok_or(FsError::NotFound)?
            .is_dir();
        if from == to {
            return Ok(());
        }
        if source_is_dir && to.starts_with(&from) {
            return Err(FsError::InvalidInput);
        }
        let Some((to_parent, to_name)) = to.split_last() else {
            // the root is an existing, non-empty directory
            return Err(if source_is_dir {
                FsError::InvalidInput
            } else {
                FsError::IsADirectory
            });
        };
        let replaced = match root.dir(to_parent)?.children.get(to_name) {
            None => None,
            Some(VfsNode::File(_)) if source_is_dir => return Err(FsError::NotADirectory),
            Some(VfsNode::File(file)) => Some(Arc::clone(file)),
            Some(VfsNode::Directory(_)) if !source_is_dir => return Err(FsError::IsADirectory),
            Some(VfsNode::Directory(dir)) => {
                return Err(if dir.children.is_empty() {
                    FsError::IsADirectory
                } else {
                    FsError::NotEmpty
                });
            }
        };

        let node = root
            .dir_mut(from_parent)?
            .children
            .remove(from_name)
            .ok_or(FsError::NotFound)?;
        root.dir_mut(to_parent)?
            .children
            .insert(to_name.clone(), node);
        drop(root);

        if let Some(file) = replaced {
            self.unlink(&file)?;
        }
        Ok(())
    }

    fn metadata(&self, path: &str) -> Result<Metadata, FsError> {
        let path = self.parse(path)?;
        let root = self.read_root();

        match path.split_last() {
            None => Ok(root.metadata()),
            Some((parent, name)) => root
                .dir(parent)?
                .children
                .get(name)
                .map(VfsNode::metadata)
                .ok_or(FsError::NotFound),
        }
    }

    fn open(&self, path: &str, options: &OpenOptions) -> Result<Box<dyn VirtualFile>, FsError> {
        let path = self.parse(path)?;
        if options.is_truncate() && !options.is_writable() {
            return Err(FsError::PermissionDenied);
        }
        let Some((parent, name)) = path.split_last() else {
            return Err(FsError::IsADirectory);
        };

        let node = if options.is_create() {
            let mut root = self.write_root();
            let parent = root.dir_mut(parent)?;
            let existing = match parent.children.get(name) {
                None => None,
                Some(VfsNode::Directory(_)) => return Err(FsError::IsADirectory),
                Some(VfsNode::File(file)) => Some(Arc::clone(file)),
            };

            match existing {
                Some(_) if options.is_create_new() => return Err(FsError::AlreadyExists),
                Some(file) => file,
                None => {
                    self.accounting.inodes.inc(1)?;
                    let file = Arc::new(RwLock::new(FileNode::new()));
                    parent
                        .children
                        .insert(name.clone(), VfsNode::File(Arc::clone(&file)));
                    file
                }
            }
        } else {
            let root = self.read_root();
            match root.dir(parent)?.children.get(name) {
                None => return Err(FsError::NotFound),
                Some(VfsNode::Directory(_)) => return Err(FsError::IsADirectory),
                Some(VfsNode::File(file)) => Arc::clone(file),
            }
        };

        let mut file = MemFile {
            node,
            accounting: Arc::clone(&self.accounting),
            cursor: 0,
            readable: options.is_readable(),
            writable: options.is_writable(),
            append: options.is_append(),
        };
        if options.is_truncate() {
            let mut node = lock_live(&file.node)?;
            node.resize(0, &file.accounting)?;
            node.times.modified = unix_nanos();
        }
        if file.append {
            file.cursor = file.size();
        }

        Ok(Box::new(file))
    }
}

/// Open handle to a [`MemFs`] file.
#[derive(Debug)]
struct MemFile {
    /// Shared file node.
    node: SharedFileNode,

    /// Accounting of the owning filesystem.
    accounting: Arc<Accounting>,

    /// Cursor.
    cursor: u64,

    /// Handle may read.
    readable: bool,

    /// Handle may write.
    writable: bool,

    /// Writes go to the end.
    append: bool,
}

impl MemFile {
    /// Lock node for reading.
    fn read_node(&self) -> RwLockReadGuard<'_, FileNode> {
        self.node.read().expect("not poisoned")
    }
}

impl VirtualFile for MemFile {
    fn last_accessed(&self) -> u64 {
        self.read_node().times.accessed
    }

    fn last_modified(&self) -> u64 {
        self.read_node().times.modified
    }

    fn created_time(&self) -> u64 {
        self.read_node().times.created
    }

    fn size(&self) -> u64 {
        self.read_node().content.len() as u64
    }

    fn set_len(&mut self, new_size: u64) -> Result<(), FsError> {
        if !self.writable {
            return Err(FsError::PermissionDenied);
        }

        let mut node = lock_live(&self.node)?;
        node.resize(new_size, &self.accounting)?;
        node.times.modified = unix_nanos();
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, FsError> {
        if !self.readable {
            return Err(FsError::PermissionDenied);
        }

        let mut node = lock_live(&self.node)?;
        let len = node.content.len();
        let n = match usize::try_from(self.cursor) {
            Ok(start) if start < len => {
                let n = buf.len().min(len - start);
                buf[..n].copy_from_slice(&node.content[start..start + n]);
                n
            }
            _ => 0,
        };
        node.times.accessed = unix_nanos();
        drop(node);

        self.cursor += n as u64;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, FsError> {
        if !self.writable {
            return Err(FsError::PermissionDenied);
        }
        // an empty write never moves the end of the file, even past EOF
        if buf.is_empty() {
            return Ok(0);
        }

        let mut node = lock_live(&self.node)?;
        let offset = if self.append {
            node.content.len() as u64
        } else {
            self.cursor
        };
        let end = offset
            .checked_add(buf.len() as u64)
            .ok_or(FsError::InvalidOffset)?;
        if end > node.content.len() as u64 {
            node.resize(end, &self.accounting)?;
        }

        // both fit into memory at this point
        let start = offset as usize;
        node.content[start..start + buf.len()].copy_from_slice(buf);
        node.times.modified = unix_nanos();
        drop(node);

        self.cursor = end;
        Ok(buf.len())
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64, FsError> {
        let (base, delta) = match pos {
            SeekFrom::Start(offset) => {
                self.cursor = offset;
                return Ok(offset);
            }
            SeekFrom::End(delta) => (self.size(), delta),
            SeekFrom::Current(delta) => (self.cursor, delta),
        };

        self.cursor = base
            .checked_add_signed(delta)
            .ok_or(FsError::InvalidOffset)?;
        Ok(self.cursor)
    }

    fn flush(&mut self) -> Result<(), FsError> {
        Ok(())
    }
}
