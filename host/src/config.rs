//! Configuration of guest instances.

use std::{collections::HashSet, sync::Arc};

use crate::{
    error::ConfigError,
    vfs::{FileSystem, VfsLimits},
};

/// Configuration of a [`WasiRuntime`](crate::WasiRuntime).
///
/// Immutable once the runtime is created. Validation happens in [`WasiRuntime::new`](crate::WasiRuntime::new), so
/// misconfiguration is reported before any guest code runs.
#[derive(Debug, Clone, Default)]
pub struct WasiConfig {
    /// Program arguments, including the program name.
    pub(crate) args: Vec<String>,

    /// Environment variables, in insertion order.
    pub(crate) envs: Vec<(String, String)>,

    /// Preopened directories: guest-visible name and path within the filesystem.
    ///
    /// If empty, the filesystem root is preopened as `/`.
    pub(crate) preopens: Vec<(String, String)>,

    /// Filesystem backend.
    ///
    /// A fresh [`MemFs`](crate::MemFs) is created if unset.
    pub(crate) fs: Option<Arc<dyn FileSystem>>,

    /// Limits for the default in-memory filesystem and for guest paths.
    pub(crate) vfs: VfsLimits,
}

impl WasiConfig {
    /// Create empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add program argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add program arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add environment variable.
    ///
    /// Keys must be unique.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Map the directory `host` of the filesystem into the guest under the name `guest`.
    pub fn with_preopen(mut self, guest: impl Into<String>, host: impl Into<String>) -> Self {
        self.preopens.push((guest.into(), host.into()));
        self
    }

    /// Set filesystem backend.
    ///
    /// The backend may be shared with other runtimes.
    pub fn with_fs(self, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            fs: Some(fs),
            ..self
        }
    }

    /// Set virtual filesystem limits.
    pub fn with_vfs_limits(self, limits: VfsLimits) -> Self {
        Self { vfs: limits, ..self }
    }

    /// Preopens, with the default applied.
    pub(crate) fn effective_preopens(&self) -> Vec<(String, String)> {
        if self.preopens.is_empty() {
            vec![("/".to_owned(), "/".to_owned())]
        } else {
            self.preopens.clone()
        }
    }

    /// Check everything that does not need the filesystem.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if let Some(index) = self.args.iter().position(|arg| arg.contains('\0')) {
            return Err(ConfigError::InvalidArgument { index });
        }

        let mut keys = HashSet::with_capacity(self.envs.len());
        for (key, value) in &self.envs {
            if key.is_empty() || key.contains('=') || key.contains('\0') {
                return Err(ConfigError::InvalidEnvKey { key: key.clone() });
            }
            if value.contains('\0') {
                return Err(ConfigError::InvalidEnvValue { key: key.clone() });
            }
            if !keys.insert(key.as_str()) {
                return Err(ConfigError::DuplicateEnv { key: key.clone() });
            }
        }

        let mut guests = HashSet::with_capacity(self.preopens.len());
        for (guest, host) in &self.preopens {
            let invalid = |reason: &str| ConfigError::InvalidPreopen {
                guest: guest.clone(),
                host: host.clone(),
                reason: reason.to_owned(),
            };

            if guest.is_empty() || guest.contains('\0') {
                return Err(invalid("guest name must be non-empty and free of NULL bytes"));
            }
            if !host.starts_with('/') {
                return Err(invalid("host path must be absolute"));
            }
            if !guests.insert(guest.as_str()) {
                return Err(ConfigError::DuplicatePreopen {
                    guest: guest.clone(),
                });
            }
        }

        Ok(())
    }
}
