//! Syscall bodies.
//!
//! [`WasiState`] implements the generated [`WasiSnapshotPreview1`] trait. The glue in
//! [`bindings::sync`](crate::bindings::sync) decodes the raw guest arguments, calls into this implementation and
//! turns the result into the status code seen by the guest.

use std::io::SeekFrom;

use rand::RngExt;
use wiggle::{GuestMemory, GuestPtr};

use crate::{
    bindings::{
        types::{self, Errno},
        wasi_snapshot_preview1::WasiSnapshotPreview1,
    },
    error::ProcExit,
    fd::{FdKind, StdioStream},
    linker::{Syscall, unsupported},
    state::WasiState,
    vfs::path::VfsPath,
};

mod env;
mod fd;
mod path;

impl WasiState {
    /// Stat a filesystem path.
    fn stat_path(&self, path: &VfsPath) -> Result<types::Filestat, Errno> {
        let metadata = self.fs.metadata(&path.to_string())?;
        Ok(types::Filestat {
            dev: 0,
            ino: self.inode(path, None),
            filetype: metadata.file_type.into(),
            nlink: 1,
            size: metadata.len,
            atim: metadata.accessed,
            mtim: metadata.modified,
            ctim: metadata.created,
        })
    }
}

/// Borrow `len` bytes of guest memory at `ptr`.
///
/// Fails with [`Errno::Fault`] if the region is out of bounds, so nothing is allocated for untrusted lengths.
fn slice_mut<'a>(
    memory: &'a mut GuestMemory<'_>,
    ptr: GuestPtr<u8>,
    len: types::Size,
) -> Result<&'a mut [u8], types::Error> {
    // shared memories cannot be borrowed
    memory
        .as_slice_mut(ptr.as_array(len))?
        .ok_or_else(|| Errno::Notsup.into())
}

/// Fill `iovs` from `read` until a short read.
fn scatter(
    memory: &mut GuestMemory<'_>,
    iovs: types::IovecArray,
    mut read: impl FnMut(&mut [u8]) -> Result<usize, types::Error>,
) -> Result<types::Size, types::Error> {
    let mut total = 0usize;
    for iov in iovs.iter() {
        let iov = memory.read(iov?)?;
        let n = read(slice_mut(memory, iov.buf, iov.buf_len)?)?;
        total += n;
        if n < iov.buf_len as usize {
            break;
        }
    }
    Ok(types::Size::try_from(total)?)
}

/// Feed `ciovs` into `write`.
fn gather(
    memory: &GuestMemory<'_>,
    ciovs: types::CiovecArray,
    mut write: impl FnMut(&[u8]) -> Result<usize, types::Error>,
) -> Result<types::Size, types::Error> {
    let mut total = 0usize;
    for ciov in ciovs.iter() {
        let ciov = memory.read(ciov?)?;
        total += write(&memory.as_cow(ciov.buf.as_array(ciov.buf_len))?)?;
    }
    Ok(types::Size::try_from(total)?)
}

/// Read a UTF-8 string from guest memory.
fn read_string(memory: &GuestMemory<'_>, ptr: GuestPtr<str>) -> Result<String, types::Error> {
    Ok(memory.as_cow_str(ptr)?.into_owned())
}

impl WasiSnapshotPreview1 for WasiState {
    fn args_get(
        &mut self,
        memory: &mut GuestMemory<'_>,
        argv: GuestPtr<GuestPtr<u8>>,
        argv_buf: GuestPtr<u8>,
    ) -> Result<(), types::Error> {
        env::write_string_table(memory, argv, argv_buf, self.args.iter().map(String::as_bytes))
    }

    fn args_sizes_get(
        &mut self,
        _memory: &mut GuestMemory<'_>,
    ) -> Result<(types::Size, types::Size), types::Error> {
        let buf_size = self.args.iter().map(|a| a.len() + 1).sum::<usize>();
        Ok((self.args.len().try_into()?, buf_size.try_into()?))
    }

    fn environ_get(
        &mut self,
        memory: &mut GuestMemory<'_>,
        environ: GuestPtr<GuestPtr<u8>>,
        environ_buf: GuestPtr<u8>,
    ) -> Result<(), types::Error> {
        let entries = self
            .envs
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>();
        env::write_string_table(
            memory,
            environ,
            environ_buf,
            entries.iter().map(String::as_bytes),
        )
    }

    fn environ_sizes_get(
        &mut self,
        _memory: &mut GuestMemory<'_>,
    ) -> Result<(types::Size, types::Size), types::Error> {
        let buf_size = self
            .envs
            .iter()
            .map(|(k, v)| k.len() + v.len() + 2)
            .sum::<usize>();
        Ok((self.envs.len().try_into()?, buf_size.try_into()?))
    }

    fn clock_res_get(
        &mut self,
        _memory: &mut GuestMemory<'_>,
        _id: types::Clockid,
    ) -> Result<types::Timestamp, types::Error> {
        Ok(1)
    }

    fn clock_time_get(
        &mut self,
        _memory: &mut GuestMemory<'_>,
        id: types::Clockid,
        _precision: types::Timestamp,
    ) -> Result<types::Timestamp, types::Error> {
        Ok(self.clock_now(id))
    }

    fn fd_advise(
        &mut self,
        _memory: &mut GuestMemory<'_>,
        fd: types::Fd,
        _offset: types::Filesize,
        _len: types::Filesize,
        _advice: types::Advice,
    ) -> Result<(), types::Error> {
        match self.fds.get(fd.into())?.kind {
            FdKind::File { .. } => Ok(()),
            FdKind::Directory { .. } => Err(Errno::Isdir.into()),
            FdKind::Stdio { .. } => Err(Errno::Spipe.into()),
        }
    }

    fn fd_allocate(
        &mut self,
        _memory: &mut GuestMemory<'_>,
        fd: types::Fd,
        offset: types::Filesize,
        len: types::Filesize,
    ) -> Result<(), types::Error> {
        let entry = self.fds.get_mut(fd.into())?;
        let writable = entry.can_write();
        let FdKind::File { file, .. } = &mut entry.kind else {
            return Err(Errno::Badf.into());
        };
        if !writable {
            return Err(Errno::Badf.into());
        }

        let end = offset.checked_add(len).ok_or(Errno::Fbig)?;
        if end > file.size() {
            file.set_len(end)?;
        }
        Ok(())
    }

    fn fd_close(&mut self, _memory: &mut GuestMemory<'_>, fd: types::Fd) -> Result<(), types::Error> {
        let fd = u32::from(fd);
        let entry = self.fds.remove(fd)?;
        if let FdKind::File { mut file, path } = entry.kind {
            log::debug!("close fd {fd} ({path})");
            file.flush()?;
        }
        Ok(())
    }

    fn fd_datasync(
        &mut self,
        _memory: &mut GuestMemory<'_>,
        fd: types::Fd,
    ) -> Result<(), types::Error> {
        self.sync(fd.into())
    }

    fn fd_fdstat_get(
        &mut self,
        _memory: &mut GuestMemory<'_>,
        fd: types::Fd,
    ) -> Result<types::Fdstat, types::Error> {
        Ok(self.fds.get(fd.into())?.fdstat())
    }

    /// The append mode of an open file is fixed at open time.
    fn fd_fdstat_set_flags(
        &mut self,
        _memory: &mut GuestMemory<'_>,
        fd: types::Fd,
        flags: types::Fdflags,
    ) -> Result<(), types::Error> {
        let entry = self.fds.get_mut(fd.into())?;
        if matches!(entry.kind, FdKind::File { .. })
            && (entry.flags ^ flags).contains(types::Fdflags::APPEND)
        {
            return Err(Errno::Notsup.into());
        }
        entry.flags = flags;
        Ok(())
    }

    /// Rights can only be dropped, never gained.
    fn fd_fdstat_set_rights(
        &mut self,
        _memory: &mut GuestMemory<'_>,
        fd: types::Fd,
        fs_rights_base: types::Rights,
        fs_rights_inheriting: types::Rights,
    ) -> Result<(), types::Error> {
        let entry = self.fds.get_mut(fd.into())?;
        if !entry.rights_base.contains(fs_rights_base)
            || !entry.rights_inheriting.contains(fs_rights_inheriting)
        {
            return Err(Errno::Notcapable.into());
        }
        entry.rights_base = fs_rights_base;
        entry.rights_inheriting = fs_rights_inheriting;
        Ok(())
    }

    fn fd_filestat_get(
        &mut self,
        _memory: &mut GuestMemory<'_>,
        fd: types::Fd,
    ) -> Result<types::Filestat, types::Error> {
        let stat = match &self.fds.get(fd.into())?.kind {
            FdKind::Stdio { .. } => types::Filestat {
                dev: 0,
                ino: 0,
                filetype: types::Filetype::CharacterDevice,
                nlink: 1,
                size: 0,
                atim: 0,
                mtim: 0,
                ctim: 0,
            },
            FdKind::File { file, path } => types::Filestat {
                dev: 0,
                ino: self.inode(path, None),
                filetype: types::Filetype::RegularFile,
                nlink: 1,
                size: file.size(),
                atim: file.last_accessed(),
                mtim: file.last_modified(),
                ctim: file.created_time(),
            },
            FdKind::Directory { path, .. } => self.stat_path(path)?,
        };
        Ok(stat)
    }

    fn fd_filestat_set_size(
        &mut self,
        _memory: &mut GuestMemory<'_>,
        fd: types::Fd,
        size: types::Filesize,
    ) -> Result<(), types::Error> {
        let entry = self.fds.get_mut(fd.into())?;
        let writable = entry.can_write();
        match &mut entry.kind {
            FdKind::File { file, .. } if writable => Ok(file.set_len(size)?),
            FdKind::File { .. } | FdKind::Stdio { .. } => Err(Errno::Badf.into()),
            FdKind::Directory { .. } => Err(Errno::Isdir.into()),
        }
    }

    fn fd_filestat_set_times(
        &mut self,
        _memory: &mut GuestMemory<'_>,
        _fd: types::Fd,
        _atim: types::Timestamp,
        _mtim: types::Timestamp,
        _fst_flags: types::Fstflags,
    ) -> Result<(), types::Error> {
        Err(unsupported(Syscall::FdFilestatSetTimes))
    }

    fn fd_pread(
        &mut self,
        memory: &mut GuestMemory<'_>,
        fd: types::Fd,
        iovs: types::IovecArray,
        offset: types::Filesize,
    ) -> Result<types::Size, types::Error> {
        let entry = self.fds.get_mut(fd.into())?;
        let readable = entry.can_read();
        let file = match &mut entry.kind {
            FdKind::File { file, .. } if readable => file,
            FdKind::File { .. } => return Err(Errno::Badf.into()),
            FdKind::Directory { .. } => return Err(Errno::Isdir.into()),
            FdKind::Stdio { .. } => return Err(Errno::Spipe.into()),
        };

        let mut offset = offset;
        scatter(memory, iovs, |buf| {
            let n = file.read_at(buf, offset)?;
            offset += n as u64;
            Ok(n)
        })
    }

    fn fd_prestat_get(
        &mut self,
        _memory: &mut GuestMemory<'_>,
        fd: types::Fd,
    ) -> Result<types::Prestat, types::Error> {
        let name = self.preopen_name(fd.into())?;
        Ok(types::Prestat::Dir(types::PrestatDir {
            pr_name_len: name.len().try_into()?,
        }))
    }

    fn fd_prestat_dir_name(
        &mut self,
        memory: &mut GuestMemory<'_>,
        fd: types::Fd,
        path: GuestPtr<u8>,
        path_max_len: types::Size,
    ) -> Result<(), types::Error> {
        let name = self.preopen_name(fd.into())?;
        let len = types::Size::try_from(name.len())?;
        if len > path_max_len {
            return Err(Errno::Nametoolong.into());
        }
        memory.copy_from_slice(name.as_bytes(), path.as_array(len))?;
        Ok(())
    }

    fn fd_pwrite(
        &mut self,
        memory: &mut GuestMemory<'_>,
        fd: types::Fd,
        ciovs: types::CiovecArray,
        offset: types::Filesize,
    ) -> Result<types::Size, types::Error> {
        let entry = self.fds.get_mut(fd.into())?;
        let writable = entry.can_write();
        let file = match &mut entry.kind {
            FdKind::File { file, .. } if writable => file,
            FdKind::File { .. } => return Err(Errno::Badf.into()),
            FdKind::Directory { .. } => return Err(Errno::Isdir.into()),
            FdKind::Stdio { .. } => return Err(Errno::Spipe.into()),
        };

        let mut offset = offset;
        gather(memory, ciovs, |data| {
            let n = file.write_at(data, offset)?;
            offset += n as u64;
            Ok(n)
        })
    }

    fn fd_read(
        &mut self,
        memory: &mut GuestMemory<'_>,
        fd: types::Fd,
        iovs: types::IovecArray,
    ) -> Result<types::Size, types::Error> {
        let entry = self.fds.get_mut(fd.into())?;
        if matches!(entry.kind, FdKind::Directory { .. }) {
            return Err(Errno::Isdir.into());
        }
        if !entry.can_read() {
            return Err(Errno::Badf.into());
        }

        match &mut entry.kind {
            FdKind::Stdio { stdio, .. } => scatter(memory, iovs, |buf| Ok(stdio.read_stdin(buf))),
            FdKind::File { file, .. } => scatter(memory, iovs, |buf| Ok(file.read(buf)?)),
            FdKind::Directory { .. } => Err(Errno::Isdir.into()),
        }
    }

    /// The cookie is the index of the next entry. `.` and `..` come first, followed by the sorted directory
    /// content. The last entry is cut off if the buffer is too small, which tells the guest to retry with a larger
    /// buffer.
    fn fd_readdir(
        &mut self,
        memory: &mut GuestMemory<'_>,
        fd: types::Fd,
        buf: GuestPtr<u8>,
        buf_len: types::Size,
        cookie: types::Dircookie,
    ) -> Result<types::Size, types::Error> {
        let out = slice_mut(memory, buf, buf_len)?;
        let used = self.read_dir_into(fd.into(), out, cookie)?;
        Ok(types::Size::try_from(used)?)
    }

    fn fd_renumber(
        &mut self,
        _memory: &mut GuestMemory<'_>,
        from: types::Fd,
        to: types::Fd,
    ) -> Result<(), types::Error> {
        if let Some(replaced) = self.fds.renumber(from.into(), to.into())?
            && let FdKind::File { mut file, .. } = replaced.kind
        {
            file.flush()?;
        }
        Ok(())
    }

    fn fd_seek(
        &mut self,
        _memory: &mut GuestMemory<'_>,
        fd: types::Fd,
        offset: types::Filedelta,
        whence: types::Whence,
    ) -> Result<types::Filesize, types::Error> {
        let pos = match whence {
            types::Whence::Set => SeekFrom::Start(u64::try_from(offset).map_err(|_| Errno::Inval)?),
            types::Whence::Cur => SeekFrom::Current(offset),
            types::Whence::End => SeekFrom::End(offset),
        };
        Ok(self.seek(fd.into(), pos)?)
    }

    fn fd_sync(&mut self, _memory: &mut GuestMemory<'_>, fd: types::Fd) -> Result<(), types::Error> {
        self.sync(fd.into())
    }

    fn fd_tell(
        &mut self,
        _memory: &mut GuestMemory<'_>,
        fd: types::Fd,
    ) -> Result<types::Filesize, types::Error> {
        Ok(self.seek(fd.into(), SeekFrom::Current(0))?)
    }

    fn fd_write(
        &mut self,
        memory: &mut GuestMemory<'_>,
        fd: types::Fd,
        ciovs: types::CiovecArray,
    ) -> Result<types::Size, types::Error> {
        let entry = self.fds.get_mut(fd.into())?;
        if matches!(entry.kind, FdKind::Directory { .. }) {
            return Err(Errno::Isdir.into());
        }
        if !entry.can_write() {
            return Err(Errno::Badf.into());
        }

        match &mut entry.kind {
            FdKind::Stdio { stream, stdio } => {
                let stream = *stream;
                gather(memory, ciovs, |data| {
                    match stream {
                        StdioStream::Stdout => stdio.write_stdout(data),
                        StdioStream::Stderr => stdio.write_stderr(data),
                        StdioStream::Stdin => return Err(Errno::Badf.into()),
                    }
                    Ok(data.len())
                })
            }
            FdKind::File { file, .. } => gather(memory, ciovs, |data| Ok(file.write(data)?)),
            FdKind::Directory { .. } => Err(Errno::Isdir.into()),
        }
    }

    fn path_create_directory(
        &mut self,
        memory: &mut GuestMemory<'_>,
        dirfd: types::Fd,
        path: GuestPtr<str>,
    ) -> Result<(), types::Error> {
        let path = self.resolve(dirfd.into(), &read_string(memory, path)?)?;
        Ok(self.fs.create_dir(&path.to_string())?)
    }

    fn path_filestat_get(
        &mut self,
        memory: &mut GuestMemory<'_>,
        dirfd: types::Fd,
        _flags: types::Lookupflags,
        path: GuestPtr<str>,
    ) -> Result<types::Filestat, types::Error> {
        let path = self.resolve(dirfd.into(), &read_string(memory, path)?)?;
        Ok(self.stat_path(&path)?)
    }

    fn path_filestat_set_times(
        &mut self,
        _memory: &mut GuestMemory<'_>,
        _dirfd: types::Fd,
        _flags: types::Lookupflags,
        _path: GuestPtr<str>,
        _atim: types::Timestamp,
        _mtim: types::Timestamp,
        _fst_flags: types::Fstflags,
    ) -> Result<(), types::Error> {
        Err(unsupported(Syscall::PathFilestatSetTimes))
    }

    fn path_link(
        &mut self,
        _memory: &mut GuestMemory<'_>,
        _old_fd: types::Fd,
        _old_flags: types::Lookupflags,
        _old_path: GuestPtr<str>,
        _new_fd: types::Fd,
        _new_path: GuestPtr<str>,
    ) -> Result<(), types::Error> {
        Err(unsupported(Syscall::PathLink))
    }

    fn path_open(
        &mut self,
        memory: &mut GuestMemory<'_>,
        dirfd: types::Fd,
        _dirflags: types::Lookupflags,
        path: GuestPtr<str>,
        oflags: types::Oflags,
        fs_rights_base: types::Rights,
        fs_rights_inheriting: types::Rights,
        fdflags: types::Fdflags,
    ) -> Result<types::Fd, types::Error> {
        let path = read_string(memory, path)?;
        let fd = self.open_at(
            dirfd.into(),
            &path,
            oflags,
            fs_rights_base,
            fs_rights_inheriting,
            fdflags,
        )?;
        Ok(fd.into())
    }

    fn path_readlink(
        &mut self,
        _memory: &mut GuestMemory<'_>,
        _dirfd: types::Fd,
        _path: GuestPtr<str>,
        _buf: GuestPtr<u8>,
        _buf_len: types::Size,
    ) -> Result<types::Size, types::Error> {
        Err(unsupported(Syscall::PathReadlink))
    }

    fn path_remove_directory(
        &mut self,
        memory: &mut GuestMemory<'_>,
        dirfd: types::Fd,
        path: GuestPtr<str>,
    ) -> Result<(), types::Error> {
        let dirfd = u32::from(dirfd);
        let path = self.resolve(dirfd, &read_string(memory, path)?)?;
        if &path == self.fds.directory(dirfd)? {
            return Err(Errno::Inval.into());
        }
        Ok(self.fs.remove_dir(&path.to_string())?)
    }

    fn path_rename(
        &mut self,
        memory: &mut GuestMemory<'_>,
        old_fd: types::Fd,
        old_path: GuestPtr<str>,
        new_fd: types::Fd,
        new_path: GuestPtr<str>,
    ) -> Result<(), types::Error> {
        let from = self.resolve(old_fd.into(), &read_string(memory, old_path)?)?;
        let to = self.resolve(new_fd.into(), &read_string(memory, new_path)?)?;
        Ok(self.fs.rename(&from.to_string(), &to.to_string())?)
    }

    fn path_symlink(
        &mut self,
        _memory: &mut GuestMemory<'_>,
        _old_path: GuestPtr<str>,
        _dirfd: types::Fd,
        _new_path: GuestPtr<str>,
    ) -> Result<(), types::Error> {
        Err(unsupported(Syscall::PathSymlink))
    }

    fn path_unlink_file(
        &mut self,
        memory: &mut GuestMemory<'_>,
        dirfd: types::Fd,
        path: GuestPtr<str>,
    ) -> Result<(), types::Error> {
        let path = self.resolve(dirfd.into(), &read_string(memory, path)?)?;
        Ok(self.fs.remove_file(&path.to_string())?)
    }

    fn poll_oneoff(
        &mut self,
        _memory: &mut GuestMemory<'_>,
        _subs: GuestPtr<types::Subscription>,
        _events: GuestPtr<types::Event>,
        _nsubscriptions: types::Size,
    ) -> Result<types::Size, types::Error> {
        Err(unsupported(Syscall::PollOneoff))
    }

    fn proc_exit(&mut self, _memory: &mut GuestMemory<'_>, status: types::Exitcode) -> wasmtime::Error {
        log::debug!("guest called proc_exit({status})");
        wasmtime::Error::new(ProcExit(status as i32))
    }

    fn proc_raise(
        &mut self,
        _memory: &mut GuestMemory<'_>,
        _sig: types::Signal,
    ) -> Result<(), types::Error> {
        Err(unsupported(Syscall::ProcRaise))
    }

    fn sched_yield(&mut self, _memory: &mut GuestMemory<'_>) -> Result<(), types::Error> {
        std::thread::yield_now();
        Ok(())
    }

    fn random_get(
        &mut self,
        memory: &mut GuestMemory<'_>,
        buf: GuestPtr<u8>,
        buf_len: types::Size,
    ) -> Result<(), types::Error> {
        rand::rng().fill(slice_mut(memory, buf, buf_len)?);
        Ok(())
    }

    fn sock_accept(
        &mut self,
        _memory: &mut GuestMemory<'_>,
        _fd: types::Fd,
        _flags: types::Fdflags,
    ) -> Result<types::Fd, types::Error> {
        Err(unsupported(Syscall::SockAccept))
    }

    fn sock_recv(
        &mut self,
        _memory: &mut GuestMemory<'_>,
        _fd: types::Fd,
        _ri_data: types::IovecArray,
        _ri_flags: types::Riflags,
    ) -> Result<(types::Size, types::Roflags), types::Error> {
        Err(unsupported(Syscall::SockRecv))
    }

    fn sock_send(
        &mut self,
        _memory: &mut GuestMemory<'_>,
        _fd: types::Fd,
        _si_data: types::CiovecArray,
        _si_flags: types::Siflags,
    ) -> Result<types::Size, types::Error> {
        Err(unsupported(Syscall::SockSend))
    }

    fn sock_shutdown(
        &mut self,
        _memory: &mut GuestMemory<'_>,
        _fd: types::Fd,
        _how: types::Sdflags,
    ) -> Result<(), types::Error> {
        Err(unsupported(Syscall::SockShutdown))
    }
}
