//! Host runtime for WebAssembly guests that target `wasi_snapshot_preview1`.
//!
//! Guests run inside [wasmtime] against a pluggable [`FileSystem`]. The shipped backend is the in-memory
//! [`MemFs`]. Standard streams are captured in [`Stdio`] buffers.
//!
//! ```no_run
//! use wasi_memfs_host::{WasiConfig, WasiRuntime};
//!
//! let mut runtime = WasiRuntime::new(WasiConfig::new().with_arg("guest")).unwrap();
//! runtime.instantiate(std::fs::read("guest.wasm").unwrap()).unwrap();
//! let exit_code = runtime.start().unwrap();
//! println!("{exit_code}: {}", runtime.stdout_string().unwrap());
//! ```
pub use crate::{
    config::WasiConfig,
    error::{ConfigError, LimitExceeded, LimitedResource, WasiError},
    linker::Syscall,
    runtime::{InstanceStatus, WasiRuntime},
    state::WasiState,
    stdio::Stdio,
    vfs::{
        DirEntry, FileSystem, FileType, FsError, MemFs, Metadata, OpenOptions, VfsLimits,
        VirtualFile,
    },
};

mod bindings;
mod config;
mod error;
mod fd;
mod linker;
mod runtime;
mod state;
mod stdio;
mod syscalls;
mod vfs;
