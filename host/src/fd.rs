//! File descriptor table.

use std::collections::BTreeMap;

use crate::{
    bindings::types::{Errno, Fdflags, Fdstat, Filetype, Rights},
    stdio::Stdio,
    vfs::{VirtualFile, path::VfsPath},
};

/// Descriptors below this value are reserved for stdin, stdout and stderr.
pub(crate) const FIRST_FREE_FD: u32 = 3;

/// Rights of a regular file descriptor, minus read and write.
pub(crate) fn file_rights() -> Rights {
    Rights::FD_SEEK
        | Rights::FD_FDSTAT_SET_FLAGS
        | Rights::FD_SYNC
        | Rights::FD_DATASYNC
        | Rights::FD_TELL
        | Rights::FD_ADVISE
        | Rights::FD_ALLOCATE
        | Rights::FD_FILESTAT_GET
        | Rights::FD_FILESTAT_SET_SIZE
        | Rights::POLL_FD_READWRITE
}

/// Rights of a directory descriptor.
pub(crate) fn directory_rights() -> Rights {
    Rights::PATH_CREATE_DIRECTORY
        | Rights::PATH_CREATE_FILE
        | Rights::PATH_OPEN
        | Rights::FD_READDIR
        | Rights::PATH_RENAME_SOURCE
        | Rights::PATH_RENAME_TARGET
        | Rights::PATH_FILESTAT_GET
        | Rights::FD_FILESTAT_GET
        | Rights::PATH_REMOVE_DIRECTORY
        | Rights::PATH_UNLINK_FILE
}

/// Rights a directory passes on to descriptors opened through it.
pub(crate) fn directory_inheriting() -> Rights {
    directory_rights() | file_rights() | Rights::FD_READ | Rights::FD_WRITE
}

/// One of the standard streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StdioStream {
    /// fd 0.
    Stdin,

    /// fd 1.
    Stdout,

    /// fd 2.
    Stderr,
}

/// What a descriptor points to.
#[derive(Debug)]
pub(crate) enum FdKind {
    /// Standard stream.
    Stdio {
        /// Which stream.
        stream: StdioStream,

        /// Buffers.
        stdio: Stdio,
    },

    /// Open file.
    File {
        /// Handle owned by this descriptor.
        file: Box<dyn VirtualFile>,

        /// Path at open time.
        path: VfsPath,
    },

    /// Directory.
    Directory {
        /// Path within the filesystem.
        path: VfsPath,

        /// Guest-visible name, if this is a preopen.
        preopen: Option<String>,
    },
}

/// Table entry.
#[derive(Debug)]
pub(crate) struct FdEntry {
    /// Target.
    pub(crate) kind: FdKind,

    /// Rights of this descriptor.
    pub(crate) rights_base: Rights,

    /// Rights handed to descriptors opened through this one.
    pub(crate) rights_inheriting: Rights,

    /// Descriptor flags.
    pub(crate) flags: Fdflags,
}

impl FdEntry {
    /// Entry for a standard stream.
    pub(crate) fn stdio(stream: StdioStream, stdio: Stdio) -> Self {
        let access = match stream {
            StdioStream::Stdin => Rights::FD_READ,
            StdioStream::Stdout | StdioStream::Stderr => Rights::FD_WRITE,
        };

        Self {
            kind: FdKind::Stdio { stream, stdio },
            rights_base: access | Rights::FD_FILESTAT_GET | Rights::POLL_FD_READWRITE,
            rights_inheriting: Rights::empty(),
            flags: Fdflags::empty(),
        }
    }

    /// Entry for a directory.
    pub(crate) fn directory(path: VfsPath, preopen: Option<String>) -> Self {
        Self {
            kind: FdKind::Directory { path, preopen },
            rights_base: directory_rights(),
            rights_inheriting: directory_inheriting(),
            flags: Fdflags::empty(),
        }
    }

    /// Entry is readable.
    pub(crate) fn can_read(&self) -> bool {
        self.rights_base.contains(Rights::FD_READ)
    }

    /// Entry is writable.
    pub(crate) fn can_write(&self) -> bool {
        self.rights_base.contains(Rights::FD_WRITE)
    }

    /// Fail with [`Errno::Notcapable`] unless the entry holds all of `rights`.
    pub(crate) fn require(&self, rights: Rights) -> Result<(), Errno> {
        if self.rights_base.contains(rights) {
            Ok(())
        } else {
            Err(Errno::Notcapable)
        }
    }

    /// File type as reported to the guest.
    pub(crate) fn filetype(&self) -> Filetype {
        match &self.kind {
            FdKind::Stdio { .. } => Filetype::CharacterDevice,
            FdKind::File { .. } => Filetype::RegularFile,
            FdKind::Directory { .. } => Filetype::Directory,
        }
    }

    /// Describe entry.
    pub(crate) fn fdstat(&self) -> Fdstat {
        Fdstat {
            fs_filetype: self.filetype(),
            fs_flags: self.flags,
            fs_rights_base: self.rights_base,
            fs_rights_inheriting: self.rights_inheriting,
        }
    }
}

/// Maps descriptor numbers to open entries.
///
/// Descriptors are private to one instance.
#[derive(Debug, Default)]
pub(crate) struct FdTable {
    /// Open entries.
    entries: BTreeMap<u32, FdEntry>,
}

impl FdTable {
    /// Create table with stdin, stdout and stderr attached to `stdio`.
    pub(crate) fn new(stdio: &Stdio) -> Self {
        let mut table = Self::default();
        for (fd, stream) in [StdioStream::Stdin, StdioStream::Stdout, StdioStream::Stderr]
            .into_iter()
            .enumerate()
        {
            table
                .entries
                .insert(fd as u32, FdEntry::stdio(stream, stdio.clone()));
        }
        table
    }

    /// Insert at the lowest free descriptor that is not reserved for stdio.
    pub(crate) fn insert(&mut self, entry: FdEntry) -> Result<u32, Errno> {
        let mut fd = FIRST_FREE_FD;
        for used in self.entries.range(FIRST_FREE_FD..).map(|(fd, _)| *fd) {
            if used != fd {
                break;
            }
            fd = fd.checked_add(1).ok_or(Errno::Mfile)?;
        }

        self.entries.insert(fd, entry);
        Ok(fd)
    }

    /// Look up entry.
    pub(crate) fn get(&self, fd: u32) -> Result<&FdEntry, Errno> {
        self.entries.get(&fd).ok_or(Errno::Badf)
    }

    /// Look up entry mutably.
    pub(crate) fn get_mut(&mut self, fd: u32) -> Result<&mut FdEntry, Errno> {
        self.entries.get_mut(&fd).ok_or(Errno::Badf)
    }

    /// Release descriptor.
    pub(crate) fn remove(&mut self, fd: u32) -> Result<FdEntry, Errno> {
        self.entries.remove(&fd).ok_or(Errno::Badf)
    }

    /// Move `from` onto `to`, closing whatever `to` pointed to.
    ///
    /// Both descriptors must be open.
    pub(crate) fn renumber(&mut self, from: u32, to: u32) -> Result<Option<FdEntry>, Errno> {
        if !self.entries.contains_key(&to) {
            return Err(Errno::Badf);
        }
        if from == to {
            self.get(from)?;
            return Ok(None);
        }

        let entry = self.remove(from)?;
        Ok(self.entries.insert(to, entry))
    }

    /// Directory path behind a descriptor.
    pub(crate) fn directory(&self, fd: u32) -> Result<&VfsPath, Errno> {
        match &self.get(fd)?.kind {
            FdKind::Directory { path, .. } => Ok(path),
            FdKind::File { .. } | FdKind::Stdio { .. } => Err(Errno::Notdir),
        }
    }

    /// Iterate over all open files.
    pub(crate) fn files_mut(&mut self) -> impl Iterator<Item = (u32, &mut Box<dyn VirtualFile>)> {
        self.entries
            .iter_mut()
            .filter_map(|(fd, entry)| match &mut entry.kind {
                FdKind::File { file, .. } => Some((*fd, file)),
                FdKind::Stdio { .. } | FdKind::Directory { .. } => None,
            })
    }
}
