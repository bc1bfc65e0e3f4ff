//! Descriptor helpers.

use std::io::SeekFrom;

use wiggle::{GuestError, GuestMemory, GuestPtr};

use crate::{
    bindings::types::{self, Errno, Filetype},
    fd::FdKind,
    state::WasiState,
};

/// Size of an encoded [`types::Dirent`] header.
const DIRENT_SIZE: usize = 24;

/// Scratch space with the alignment of [`types::Dirent`].
#[repr(C, align(8))]
struct DirentBytes([u8; DIRENT_SIZE]);

/// Encode a directory entry header in its guest layout.
fn encode_dirent(dirent: types::Dirent) -> Result<[u8; DIRENT_SIZE], GuestError> {
    let mut bytes = DirentBytes([0; DIRENT_SIZE]);
    GuestMemory::Unshared(&mut bytes.0).write(GuestPtr::new(0), dirent)?;
    Ok(bytes.0)
}

impl WasiState {
    /// `fd_datasync` and `fd_sync`
    pub(super) fn sync(&mut self, fd: u32) -> Result<(), types::Error> {
        match &mut self.fds.get_mut(fd)?.kind {
            FdKind::File { file, .. } => Ok(file.flush()?),
            FdKind::Directory { .. } => Ok(()),
            FdKind::Stdio { .. } => Err(Errno::Inval.into()),
        }
    }

    /// Move the cursor of a file.
    pub(super) fn seek(&mut self, fd: u32, pos: SeekFrom) -> Result<u64, Errno> {
        match &mut self.fds.get_mut(fd)?.kind {
            FdKind::File { file, .. } => Ok(file.seek(pos)?),
            FdKind::Stdio { .. } => Err(Errno::Spipe),
            FdKind::Directory { .. } => Err(Errno::Isdir),
        }
    }

    /// Guest-visible name of a preopened directory.
    pub(super) fn preopen_name(&self, fd: u32) -> Result<&str, Errno> {
        match &self.fds.get(fd)?.kind {
            FdKind::Directory {
                preopen: Some(name),
                ..
            } => Ok(name),
            FdKind::Directory { preopen: None, .. } | FdKind::File { .. } | FdKind::Stdio { .. } => {
                Err(Errno::Badf)
            }
        }
    }

    /// Fill `out` with the entries of directory `fd`, starting at entry `cookie`.
    ///
    /// Returns the number of bytes used, which equals the length of `out` if the listing was cut off.
    pub(super) fn read_dir_into(
        &self,
        fd: u32,
        out: &mut [u8],
        cookie: u64,
    ) -> Result<usize, types::Error> {
        let path = self.fds.directory(fd)?;
        let parent = path.parent();

        let mut entries = vec![
            (".".to_owned(), Filetype::Directory, self.inode(path, None)),
            ("..".to_owned(), Filetype::Directory, self.inode(&parent, None)),
        ];
        for entry in self.fs.read_dir(&path.to_string())? {
            let ino = self.inode(path, Some(&entry.name));
            entries.push((entry.name, entry.metadata.file_type.into(), ino));
        }

        let start = usize::try_from(cookie).unwrap_or(usize::MAX);
        let mut used = 0;
        for (d_next, (name, d_type, d_ino)) in (1u64..).zip(entries).skip(start) {
            let header = encode_dirent(types::Dirent {
                d_next,
                d_ino,
                d_namlen: name.len().try_into()?,
                d_type,
            })?;
            for chunk in [header.as_slice(), name.as_bytes()] {
                let n = chunk.len().min(out.len() - used);
                out[used..used + n].copy_from_slice(&chunk[..n]);
                used += n;
            }
            if used == out.len() {
                break;
            }
        }
        Ok(used)
    }
}
