//! Path helpers.
//!
//! Guest paths are always relative to a directory descriptor and may never leave it.

use crate::{
    bindings::types::{self, Errno, Fdflags, Oflags, Rights},
    fd::{FdEntry, FdKind, directory_inheriting, directory_rights, file_rights},
    state::WasiState,
    vfs::{
        FsError, OpenOptions,
        path::{PathTraversal, VfsPath},
    },
};

impl WasiState {
    /// Resolve a guest path relative to a directory descriptor.
    ///
    /// Absolute paths and `..` steps that climb above the directory are rejected with
    /// [`Errno::Notcapable`].
    pub(super) fn resolve(&self, dirfd: u32, path: &str) -> Result<VfsPath, Errno> {
        let base = self.fds.directory(dirfd)?;
        let (is_root, directions) = PathTraversal::parse(path, &self.limits)?;
        if is_root {
            log::debug!("reject absolute path: {path}");
            return Err(Errno::Notcapable);
        }

        let mut resolved = base.clone();
        let mut depth = 0usize;
        for direction in directions {
            match direction? {
                PathTraversal::Stay => {}
                PathTraversal::Up => {
                    if depth == 0 {
                        log::debug!("reject path escaping {base}: {path}");
                        return Err(Errno::Notcapable);
                    }
                    resolved.pop();
                    depth -= 1;
                }
                PathTraversal::Down(segment) => {
                    resolved.push(segment);
                    depth += 1;
                }
            }
        }
        Ok(resolved)
    }

    /// `path_open`
    ///
    /// Directories are opened as directory descriptors, regardless of the `DIRECTORY` flag. Requested rights are
    /// capped by what the parent descriptor hands on, and read/write access follows the capped rights only.
    pub(super) fn open_at(
        &mut self,
        dirfd: u32,
        path: &str,
        oflags: Oflags,
        rights_base: Rights,
        rights_inheriting: Rights,
        fdflags: Fdflags,
    ) -> Result<u32, types::Error> {
        let dir = self.fds.get(dirfd)?;
        dir.require(Rights::PATH_OPEN)?;
        if oflags.contains(Oflags::CREAT) {
            dir.require(Rights::PATH_CREATE_FILE)?;
        }
        let rights_base = rights_base & dir.rights_inheriting;
        let rights_inheriting = rights_inheriting & dir.rights_inheriting;

        if oflags.contains(Oflags::TRUNC) && !rights_base.contains(Rights::FD_WRITE) {
            return Err(Errno::Notcapable.into());
        }

        let path = self.resolve(dirfd, path)?;
        let target = path.to_string();
        let existing = match self.fs.metadata(&target) {
            Ok(metadata) => Some(metadata),
            Err(FsError::NotFound) => None,
            Err(e) => return Err(e.into()),
        };

        let exclusive = Oflags::CREAT | Oflags::EXCL;
        let entry = match existing {
            Some(metadata) if metadata.is_dir() => {
                if oflags.contains(exclusive) {
                    return Err(Errno::Exist.into());
                }
                if oflags.contains(Oflags::TRUNC) {
                    return Err(Errno::Isdir.into());
                }
                FdEntry {
                    kind: FdKind::Directory {
                        path,
                        preopen: None,
                    },
                    rights_base: rights_base & directory_rights(),
                    rights_inheriting: rights_inheriting & directory_inheriting(),
                    flags: fdflags,
                }
            }
            Some(_) if oflags.contains(Oflags::DIRECTORY) => return Err(Errno::Notdir.into()),
            None if oflags.contains(Oflags::DIRECTORY) => return Err(Errno::Noent.into()),
            _ => {
                let options = OpenOptions::new()
                    .read(rights_base.contains(Rights::FD_READ))
                    .write(rights_base.contains(Rights::FD_WRITE))
                    .append(fdflags.contains(Fdflags::APPEND))
                    .truncate(oflags.contains(Oflags::TRUNC))
                    .create(oflags.contains(Oflags::CREAT))
                    .create_new(oflags.contains(exclusive));
                let file = self.fs.open(&target, &options)?;
                FdEntry {
                    kind: FdKind::File { file, path },
                    rights_base: file_rights() | (rights_base & (Rights::FD_READ | Rights::FD_WRITE)),
                    rights_inheriting: Rights::empty(),
                    flags: fdflags,
                }
            }
        };

        let fd = self.fds.insert(entry)?;
        log::debug!("open {target} as fd {fd}");
        Ok(fd)
    }
}
