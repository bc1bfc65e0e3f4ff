//! Resource bounds of [`MemFs`](crate::MemFs).

/// Bounds enforced by an in-memory filesystem.
///
/// Tree depth is not bounded on its own. Every directory costs an [inode](Self::inodes), and walking a path is
/// bounded by [`max_path_length`](Self::max_path_length).
#[derive(Debug, Clone)]
#[expect(missing_copy_implementations, reason = "allow later extensions")]
pub struct VfsLimits {
    /// Number of files and directories, excluding the root.
    pub inodes: u64,

    /// Bytes in a path passed to the filesystem.
    pub max_path_length: u64,

    /// Bytes in a single path segment.
    pub max_path_segment_size: u64,

    /// File content bytes, summed over all files.
    pub max_storage_bytes: u64,

    /// Content bytes of one file.
    ///
    /// Lower than [`max_storage_bytes`](Self::max_storage_bytes) so a single file cannot take the whole budget.
    pub max_file_size: u64,
}

impl Default for VfsLimits {
    fn default() -> Self {
        Self {
            inodes: 10_000,
            max_path_length: 4096,
            max_path_segment_size: 255,
            max_storage_bytes: 100 * 1024 * 1024,
            max_file_size: 10 * 1024 * 1024,
        }
    }
}
