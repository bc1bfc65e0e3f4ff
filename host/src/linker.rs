//! WebAssembly linker code.
//!
//! The `wasi_snapshot_preview1` imports are registered by the glue generated in [`bindings::sync`]. This module
//! keeps the table of those calls.

use wasmtime::Linker;

use crate::{
    bindings::{self, types},
    state::WasiState,
};

/// A `wasi_snapshot_preview1` import.
///
/// The discriminants form a stable, number-indexed table of all linked calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Syscall {
    /// `args_get`
    ArgsGet = 0,
    /// `args_sizes_get`
    ArgsSizesGet = 1,
    /// `clock_res_get`
    ClockResGet = 2,
    /// `clock_time_get`
    ClockTimeGet = 3,
    /// `environ_get`
    EnvironGet = 4,
    /// `environ_sizes_get`
    EnvironSizesGet = 5,
    /// `fd_advise`
    FdAdvise = 6,
    /// `fd_allocate`
    FdAllocate = 7,
    /// `fd_close`
    FdClose = 8,
    /// `fd_datasync`
    FdDatasync = 9,
    /// `fd_fdstat_get`
    FdFdstatGet = 10,
    /// `fd_fdstat_set_flags`
    FdFdstatSetFlags = 11,
    /// `fd_fdstat_set_rights`
    FdFdstatSetRights = 12,
    /// `fd_filestat_get`
    FdFilestatGet = 13,
    /// `fd_filestat_set_size`
    FdFilestatSetSize = 14,
    /// `fd_filestat_set_times`
    FdFilestatSetTimes = 15,
    /// `fd_pread`
    FdPread = 16,
    /// `fd_prestat_get`
    FdPrestatGet = 17,
    /// `fd_prestat_dir_name`
    FdPrestatDirName = 18,
    /// `fd_pwrite`
    FdPwrite = 19,
    /// `fd_read`
    FdRead = 20,
    /// `fd_readdir`
    FdReaddir = 21,
    /// `fd_renumber`
    FdRenumber = 22,
    /// `fd_seek`
    FdSeek = 23,
    /// `fd_sync`
    FdSync = 24,
    /// `fd_tell`
    FdTell = 25,
    /// `fd_write`
    FdWrite = 26,
    /// `path_create_directory`
    PathCreateDirectory = 27,
    /// `path_filestat_get`
    PathFilestatGet = 28,
    /// `path_filestat_set_times`
    PathFilestatSetTimes = 29,
    /// `path_link`
    PathLink = 30,
    /// `path_open`
    PathOpen = 31,
    /// `path_readlink`
    PathReadlink = 32,
    /// `path_remove_directory`
    PathRemoveDirectory = 33,
    /// `path_rename`
    PathRename = 34,
    /// `path_symlink`
    PathSymlink = 35,
    /// `path_unlink_file`
    PathUnlinkFile = 36,
    /// `poll_oneoff`
    PollOneoff = 37,
    /// `proc_exit`
    ProcExit = 38,
    /// `proc_raise`
    ProcRaise = 39,
    /// `random_get`
    RandomGet = 40,
    /// `sched_yield`
    SchedYield = 41,
    /// `sock_accept`
    SockAccept = 42,
    /// `sock_recv`
    SockRecv = 43,
    /// `sock_send`
    SockSend = 44,
    /// `sock_shutdown`
    SockShutdown = 45,
}

impl Syscall {
    /// All linked calls, ordered by [`index`](Self::index).
    pub const ALL: [Self; 46] = [
        Self::ArgsGet,
        Self::ArgsSizesGet,
        Self::ClockResGet,
        Self::ClockTimeGet,
        Self::EnvironGet,
        Self::EnvironSizesGet,
        Self::FdAdvise,
        Self::FdAllocate,
        Self::FdClose,
        Self::FdDatasync,
        Self::FdFdstatGet,
        Self::FdFdstatSetFlags,
        Self::FdFdstatSetRights,
        Self::FdFilestatGet,
        Self::FdFilestatSetSize,
        Self::FdFilestatSetTimes,
        Self::FdPread,
        Self::FdPrestatGet,
        Self::FdPrestatDirName,
        Self::FdPwrite,
        Self::FdRead,
        Self::FdReaddir,
        Self::FdRenumber,
        Self::FdSeek,
        Self::FdSync,
        Self::FdTell,
        Self::FdWrite,
        Self::PathCreateDirectory,
        Self::PathFilestatGet,
        Self::PathFilestatSetTimes,
        Self::PathLink,
        Self::PathOpen,
        Self::PathReadlink,
        Self::PathRemoveDirectory,
        Self::PathRename,
        Self::PathSymlink,
        Self::PathUnlinkFile,
        Self::PollOneoff,
        Self::ProcExit,
        Self::ProcRaise,
        Self::RandomGet,
        Self::SchedYield,
        Self::SockAccept,
        Self::SockRecv,
        Self::SockSend,
        Self::SockShutdown,
    ];

    /// Position in [`ALL`](Self::ALL).
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Import name.
    pub fn name(self) -> &'static str {
        match self {
            Self::ArgsGet => "args_get",
            Self::ArgsSizesGet => "args_sizes_get",
            Self::ClockResGet => "clock_res_get",
            Self::ClockTimeGet => "clock_time_get",
            Self::EnvironGet => "environ_get",
            Self::EnvironSizesGet => "environ_sizes_get",
            Self::FdAdvise => "fd_advise",
            Self::FdAllocate => "fd_allocate",
            Self::FdClose => "fd_close",
            Self::FdDatasync => "fd_datasync",
            Self::FdFdstatGet => "fd_fdstat_get",
            Self::FdFdstatSetFlags => "fd_fdstat_set_flags",
            Self::FdFdstatSetRights => "fd_fdstat_set_rights",
            Self::FdFilestatGet => "fd_filestat_get",
            Self::FdFilestatSetSize => "fd_filestat_set_size",
            Self::FdFilestatSetTimes => "fd_filestat_set_times",
            Self::FdPread => "fd_pread",
            Self::FdPrestatGet => "fd_prestat_get",
            Self::FdPrestatDirName => "fd_prestat_dir_name",
            Self::FdPwrite => "fd_pwrite",
            Self::FdRead => "fd_read",
            Self::FdReaddir => "fd_readdir",
            Self::FdRenumber => "fd_renumber",
            Self::FdSeek => "fd_seek",
            Self::FdSync => "fd_sync",
            Self::FdTell => "fd_tell",
            Self::FdWrite => "fd_write",
            Self::PathCreateDirectory => "path_create_directory",
            Self::PathFilestatGet => "path_filestat_get",
            Self::PathFilestatSetTimes => "path_filestat_set_times",
            Self::PathLink => "path_link",
            Self::PathOpen => "path_open",
            Self::PathReadlink => "path_readlink",
            Self::PathRemoveDirectory => "path_remove_directory",
            Self::PathRename => "path_rename",
            Self::PathSymlink => "path_symlink",
            Self::PathUnlinkFile => "path_unlink_file",
            Self::PollOneoff => "poll_oneoff",
            Self::ProcExit => "proc_exit",
            Self::ProcRaise => "proc_raise",
            Self::RandomGet => "random_get",
            Self::SchedYield => "sched_yield",
            Self::SockAccept => "sock_accept",
            Self::SockRecv => "sock_recv",
            Self::SockSend => "sock_send",
            Self::SockShutdown => "sock_shutdown",
        }
    }

    /// Whether the call does something other than failing with `ENOTSUP`.
    pub fn is_supported(self) -> bool {
        !matches!(
            self,
            Self::FdFilestatSetTimes
                | Self::PathFilestatSetTimes
                | Self::PathLink
                | Self::PathReadlink
                | Self::PathSymlink
                | Self::PollOneoff
                | Self::ProcRaise
                | Self::SockAccept
                | Self::SockRecv
                | Self::SockSend
                | Self::SockShutdown
        )
    }
}

impl std::fmt::Display for Syscall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Answer a call that is linked but not implemented.
pub(crate) fn unsupported(syscall: Syscall) -> types::Error {
    log::warn!("guest called unsupported syscall {syscall}");
    types::Errno::Notsup.into()
}

/// Link all `wasi_snapshot_preview1` imports.
pub(crate) fn link(linker: &mut Linker<WasiState>) -> wasmtime::Result<()> {
    bindings::sync::add_wasi_snapshot_preview1_to_linker(linker, |state| state)?;
    Ok(())
}
