//! Error types.

use crate::vfs::FsError;

/// Resource that is bounded by [`VfsLimits`](crate::VfsLimits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitedResource {
    /// Number of inodes.
    Inodes,

    /// Total storage bytes.
    Storage,

    /// Size of a single file.
    FileSize,

    /// Length of a whole path.
    Path,

    /// Length of a single path segment.
    PathSegment,
}

impl std::fmt::Display for LimitedResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Inodes => "inodes",
            Self::Storage => "storage",
            Self::FileSize => "file size",
            Self::Path => "path",
            Self::PathSegment => "path segment",
        };
        f.write_str(name)
    }
}

/// A resource limit was hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{resource} limit reached: limit<={limit} current=={current} requested+={requested}")]
pub struct LimitExceeded {
    /// Resource that was exhausted.
    pub resource: LimitedResource,

    /// Configured limit.
    pub limit: u64,

    /// Allocation at the time of the request.
    pub current: u64,

    /// Requested additional amount.
    pub requested: u64,
}

/// Misconfiguration detected before any guest code runs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Argument contains a NULL byte.
    #[error("argument #{index} contains a NULL byte")]
    InvalidArgument {
        /// Position of the argument.
        index: usize,
    },

    /// Environment variable defined twice.
    #[error("environment variable `{key}` is defined more than once")]
    DuplicateEnv {
        /// Variable name.
        key: String,
    },

    /// Environment variable name is empty or contains `=` or NULL.
    #[error("invalid environment variable name `{key}`")]
    InvalidEnvKey {
        /// Variable name.
        key: String,
    },

    /// Environment variable value contains NULL.
    #[error("value of environment variable `{key}` contains a NULL byte")]
    InvalidEnvValue {
        /// Variable name.
        key: String,
    },

    /// Two preopens share the same guest name.
    #[error("preopen `{guest}` is defined more than once")]
    DuplicatePreopen {
        /// Guest-visible name.
        guest: String,
    },

    /// Preopen cannot be mapped.
    #[error("invalid preopen `{guest}` -> `{host}`: {reason}")]
    InvalidPreopen {
        /// Guest-visible name.
        guest: String,

        /// Path within the filesystem backend.
        host: String,

        /// Human-readable cause.
        reason: String,
    },
}

/// Errors reported to the host.
///
/// Failures of individual syscalls never show up here. The guest observes them as status codes.
#[derive(Debug, thiserror::Error)]
pub enum WasiError {
    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Host-side filesystem access failed.
    #[error(transparent)]
    Fs(#[from] FsError),

    /// The module does not export a usable entry point.
    #[error("guest module does not export a `{name}: () -> ()` function")]
    EntryPointMissing {
        /// Name of the entry point.
        name: &'static str,
    },

    /// `start` was called before `instantiate`.
    #[error("guest module is not instantiated")]
    NotInstantiated,

    /// `instantiate` was called twice.
    #[error("guest module is already instantiated")]
    AlreadyInstantiated,

    /// The instance already exited or aborted.
    #[error("guest instance already finished")]
    AlreadyFinished,

    /// The guest trapped.
    ///
    /// This is fatal for the instance.
    #[error("guest execution aborted: {message}")]
    RuntimeAborted {
        /// Trap code, if the abort was caused by a WebAssembly trap.
        trap: Option<wasmtime::Trap>,

        /// Description of the cause.
        message: String,
    },

    /// Captured output is not valid UTF-8.
    #[error("output is not valid UTF-8")]
    InvalidEncoding,

    /// Compilation, linking or engine setup failed.
    #[error("{context}: {message}")]
    Engine {
        /// What was being done.
        context: &'static str,

        /// Engine error message.
        message: String,
    },
}

impl WasiError {
    /// Wrap an engine error.
    pub(crate) fn engine(context: &'static str, e: &wasmtime::Error) -> Self {
        Self::Engine {
            context,
            message: e.to_string(),
        }
    }
}

/// Guest requested termination via `proc_exit`.
///
/// Travels through the engine as the error of the host call and is recovered by downcasting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("guest exited with status {0}")]
pub(crate) struct ProcExit(pub(crate) i32);
