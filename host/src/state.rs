//! State handling of guests.

use std::{hash::Hash, sync::Arc, time::Instant};

use rand::RngExt;
use siphasher::sip128::{Hasher128, SipHasher24};

use crate::{
    config::WasiConfig,
    error::ConfigError,
    fd::{FdEntry, FdTable},
    stdio::Stdio,
    vfs::{FileSystem, VfsLimits, path::VfsPath},
};

/// State of a guest instance, stored in the wasmtime store.
///
/// Host functions registered through [`WasiRuntime::instantiate_with`](crate::WasiRuntime::instantiate_with) reach
/// it via [`Caller::data`](wasmtime::Caller::data).
#[derive(Debug)]
pub struct WasiState {
    /// Program arguments.
    pub(crate) args: Vec<String>,

    /// Environment variables.
    pub(crate) envs: Vec<(String, String)>,

    /// Filesystem backend.
    pub(crate) fs: Arc<dyn FileSystem>,

    /// Open descriptors.
    pub(crate) fds: FdTable,

    /// Standard streams.
    pub(crate) stdio: Stdio,

    /// Limits applied to guest-provided paths.
    pub(crate) limits: VfsLimits,

    /// Origin of the monotonic clock.
    pub(crate) clock_origin: Instant,

    /// Hash key for inode numbers.
    ///
    /// Random per instance, so guests cannot learn anything about other instances from them.
    inode_key: [u8; 16],
}

impl WasiState {
    /// Create state from a validated configuration.
    ///
    /// Every preopen must point to an existing directory.
    pub(crate) fn new(
        config: &WasiConfig,
        fs: Arc<dyn FileSystem>,
        stdio: Stdio,
    ) -> Result<Self, ConfigError> {
        let mut fds = FdTable::new(&stdio);

        for (guest, host) in config.effective_preopens() {
            let invalid = |reason: String| ConfigError::InvalidPreopen {
                guest: guest.clone(),
                host: host.clone(),
                reason,
            };

            let path = VfsPath::parse(&host, &config.vfs).map_err(|e| invalid(e.to_string()))?;
            let metadata = fs
                .metadata(&path.to_string())
                .map_err(|e| invalid(e.to_string()))?;
            if !metadata.is_dir() {
                return Err(invalid("not a directory".to_owned()));
            }

            let fd = fds
                .insert(FdEntry::directory(path, Some(guest.clone())))
                .map_err(|e| invalid(format!("{e:?}")))?;
            log::debug!("preopened {host} as {guest} on fd {fd}");
        }

        Ok(Self {
            args: config.args.clone(),
            envs: config.envs.clone(),
            fs,
            fds,
            stdio,
            limits: config.vfs.clone(),
            clock_origin: Instant::now(),
            inode_key: rand::rng().random(),
        })
    }

    /// Standard streams of the guest.
    pub fn stdio(&self) -> &Stdio {
        &self.stdio
    }

    /// Filesystem backend.
    pub fn fs(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    /// Stable inode number for `path`, or for the entry `child` within it.
    pub(crate) fn inode(&self, path: &VfsPath, child: Option<&str>) -> u64 {
        let mut hasher = SipHasher24::new_with_key(&self.inode_key);
        for segment in path.segments().iter().map(|s| &**s).chain(child) {
            segment.hash(&mut hasher);
        }
        let (lower, _upper) = hasher.finish128().as_u64();
        lower
    }

    /// Flush every open file.
    ///
    /// Called once the guest finished, so that buffering backends persist the data. Failures are logged since the
    /// guest cannot observe them anymore.
    pub(crate) fn flush_all(&mut self) {
        for (fd, file) in self.fds.files_mut() {
            if let Err(e) = file.flush() {
                log::warn!("cannot flush fd {fd}: {e}");
            }
        }
    }
}
