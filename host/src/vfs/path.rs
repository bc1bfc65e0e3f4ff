//! Path types and parsing.

use std::ops::Deref;

use crate::{
    error::{LimitExceeded, LimitedResource},
    vfs::{FsError, VfsLimits},
};

/// Path segment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct PathSegment(Box<str>);

impl PathSegment {
    /// Create new path segment.
    ///
    /// # Error
    /// Fails if the segment is [too long](VfsLimits::max_path_segment_size).
    ///
    /// # Panic
    /// The caller MUST ensure the following properties, otherwise this method panics:
    ///
    /// - the segment MUST NOT contain a NULL character
    /// - the segment MUST NOT contain a slash `/` character
    /// - the segment MUST NOT be empty
    pub(crate) fn new(s: &str, limit: &VfsLimits) -> Result<Self, LimitExceeded> {
        assert!(!s.contains('\0'));
        assert!(!s.contains('/'));
        assert!(!s.is_empty());

        let len = s.len() as u64;
        if len > limit.max_path_segment_size {
            return Err(LimitExceeded {
                resource: LimitedResource::PathSegment,
                limit: limit.max_path_segment_size,
                current: 0,
                requested: len,
            });
        }

        Ok(Self(s.into()))
    }
}

impl Deref for PathSegment {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.0.deref()
    }
}

impl std::fmt::Display for PathSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.deref().fmt(f)
    }
}

/// "Direction" for path traversal.
#[derive(Debug, PartialEq, Eq, Hash)]
pub(crate) enum PathTraversal {
    /// Go to parent.
    ///
    /// This is equivalent to `..`.
    Up,

    /// Stay at current level.
    ///
    /// This is equivalent to `.`.
    Stay,

    /// Look up directory child.
    Down(PathSegment),
}

impl PathTraversal {
    /// Parse path.
    ///
    /// Returns whether the path is absolute, followed by the traversal steps.
    pub(crate) fn parse(
        s: &str,
        limit: &VfsLimits,
    ) -> Result<
        (
            bool,
            impl Iterator<Item = Result<Self, LimitExceeded>> + std::fmt::Debug,
        ),
        FsError,
    > {
        let len = s.len() as u64;
        if len > limit.max_path_length {
            return Err(LimitExceeded {
                resource: LimitedResource::Path,
                limit: limit.max_path_length,
                current: 0,
                requested: len,
            }
            .into());
        }

        if s.is_empty() {
            return Err(FsError::InvalidPath("path cannot be empty"));
        }
        if s.contains('\0') {
            return Err(FsError::InvalidPath("path contains NULL byte"));
        }

        let mut segments = s.split('/').peekable();
        let is_root = if segments.peek().is_some_and(|first| first.is_empty()) {
            segments.next();
            true
        } else {
            false
        };

        let segments = segments.map(|s| {
            let direction = match s {
                "" | "." => Self::Stay,
                ".." => Self::Up,
                other => Self::Down(PathSegment::new(other, limit)?),
            };
            Ok(direction)
        });
        Ok((is_root, segments))
    }
}

/// Normalized absolute path.
///
/// The empty segment list is the root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub(crate) struct VfsPath(Vec<PathSegment>);

impl VfsPath {
    /// Parse and lexically normalize a path.
    ///
    /// Relative paths are resolved against the root. Note that `/..` = `/`, i.e. overshooting is allowed.
    pub(crate) fn parse(s: &str, limit: &VfsLimits) -> Result<Self, FsError> {
        let (_is_root, directions) = PathTraversal::parse(s, limit)?;

        let mut path = Self::default();
        for direction in directions {
            match direction? {
                PathTraversal::Stay => {}
                PathTraversal::Up => {
                    path.0.pop();
                }
                PathTraversal::Down(segment) => path.0.push(segment),
            }
        }
        Ok(path)
    }

    /// Is this the root directory?
    pub(crate) fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Path segments, root first.
    pub(crate) fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    /// Split into parent segments and final name.
    ///
    /// Returns [`None`] for the root.
    pub(crate) fn split_last(&self) -> Option<(&[PathSegment], &PathSegment)> {
        let (name, parent) = self.0.split_last()?;
        Some((parent, name))
    }

    /// Descend into child.
    pub(crate) fn push(&mut self, segment: PathSegment) {
        self.0.push(segment);
    }

    /// Ascend to parent.
    pub(crate) fn pop(&mut self) -> Option<PathSegment> {
        self.0.pop()
    }

    /// Parent directory. The root is its own parent.
    pub(crate) fn parent(&self) -> Self {
        let mut parent = self.clone();
        parent.pop();
        parent
    }

    /// Checks if `self` equals `other` or lives below it.
    pub(crate) fn starts_with(&self, other: &Self) -> bool {
        self.0.starts_with(&other.0)
    }
}

impl std::fmt::Display for VfsPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.0 {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}
