//! Bindings generated from the `wasi_snapshot_preview1` interface description.
//!
//! [`types`] holds the ABI types, [`wasi_snapshot_preview1::WasiSnapshotPreview1`] the trait that
//! [`WasiState`](crate::WasiState) implements and [`sync`] the glue that registers it with a wasmtime linker.

use wiggle::GuestError;

use crate::{
    error::{LimitExceeded, LimitedResource},
    vfs::{FileType, FsError},
};

wiggle::from_witx!({
    witx: ["../witx/preview1/wasi_snapshot_preview1.witx"],
    errors: { errno => trappable Error },
    wasmtime: false,
    tracing: false,
});

/// Linker glue for calls that run to completion on the calling thread.
pub(crate) mod sync {
    wiggle::wasmtime_integration!({
        witx: ["../witx/preview1/wasi_snapshot_preview1.witx"],
        target: super,
        errors: { errno => trappable Error },
        tracing: false,
    });
}

impl wiggle::GuestErrorType for types::Errno {
    fn success() -> Self {
        Self::Success
    }
}

impl From<GuestError> for types::Error {
    fn from(err: GuestError) -> Self {
        match err {
            GuestError::InvalidFlagValue { .. } | GuestError::InvalidEnumValue { .. } => {
                types::Errno::Inval.into()
            }
            GuestError::InvalidUtf8 { .. } => types::Errno::Ilseq.into(),
            GuestError::TryFromIntError { .. } => types::Errno::Overflow.into(),
            GuestError::InFunc { err, .. } => Self::from(*err),
            // pointers that overflow, are misaligned or point outside of the memory are reported to the guest
            // instead of trapping
            _ => types::Errno::Fault.into(),
        }
    }
}

impl From<std::num::TryFromIntError> for types::Error {
    fn from(_err: std::num::TryFromIntError) -> Self {
        types::Errno::Overflow.into()
    }
}

impl From<FsError> for types::Errno {
    fn from(e: FsError) -> Self {
        match e {
            FsError::NotFound => Self::Noent,
            FsError::AlreadyExists => Self::Exist,
            FsError::NotADirectory => Self::Notdir,
            FsError::IsADirectory => Self::Isdir,
            FsError::NotEmpty => Self::Notempty,
            FsError::InvalidOffset | FsError::InvalidInput | FsError::InvalidPath(_) => Self::Inval,
            FsError::InvalidEncoding => Self::Ilseq,
            FsError::PermissionDenied => Self::Acces,
            FsError::LimitExceeded(LimitExceeded { resource, .. }) => match resource {
                LimitedResource::Path | LimitedResource::PathSegment => Self::Nametoolong,
                LimitedResource::FileSize => Self::Fbig,
                LimitedResource::Inodes | LimitedResource::Storage => Self::Nospc,
            },
            FsError::Unsupported => Self::Notsup,
            FsError::Io => Self::Io,
        }
    }
}

impl From<FsError> for types::Error {
    fn from(e: FsError) -> Self {
        types::Errno::from(e).into()
    }
}

impl From<LimitExceeded> for types::Errno {
    fn from(e: LimitExceeded) -> Self {
        FsError::from(e).into()
    }
}

impl From<FileType> for types::Filetype {
    fn from(file_type: FileType) -> Self {
        match file_type {
            FileType::File => Self::RegularFile,
            FileType::Directory => Self::Directory,
        }
    }
}
