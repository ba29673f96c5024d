//! Error types for store operations.
//!
//! Every failure is classified into one of four [`ErrorKind`]s so that a
//! serving layer can map it to its own status codes without depending on
//! the concrete variant layout.

use std::io;

use thiserror::Error;

/// Placeholder shown instead of the real temp file path in diagnostics.
pub const TEMP_FILE_NAME: &str = "<temporary file>";

/// Coarse classification of a [`StoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    PathForbidden,
    NotFound,
    IsDirectory,
    IoFailure,
}

/// Errors that can occur during store operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("path forbidden: {path}")]
    PathForbidden { path: String },

    #[error("blob not found: {name}")]
    NotFound { name: String },

    #[error("not a blob: {name} is a directory")]
    IsDirectory { name: String },

    #[error("{op} {path}: {source}")]
    Io {
        op: &'static str,
        path: String,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::PathForbidden { .. } => ErrorKind::PathForbidden,
            StoreError::NotFound { .. } => ErrorKind::NotFound,
            StoreError::IsDirectory { .. } => ErrorKind::IsDirectory,
            StoreError::Io { .. } => ErrorKind::IoFailure,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub(crate) fn not_found(name: impl Into<String>) -> Self {
        StoreError::NotFound { name: name.into() }
    }

    pub(crate) fn forbidden(path: impl Into<String>) -> Self {
        StoreError::PathForbidden { path: path.into() }
    }

    pub(crate) fn io(op: &'static str, path: impl Into<String>, source: io::Error) -> Self {
        StoreError::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// I/O failure on the in-flight temporary file.
    pub(crate) fn temp(op: &'static str, source: io::Error) -> Self {
        Self::io(op, TEMP_FILE_NAME, source)
    }

    /// Classify a failure from looking up an existing blob by name.
    ///
    /// A missing file, or a missing shard directory along the way, is
    /// reported as `NotFound`; a directory sitting where a blob should be
    /// is `IsDirectory`.
    pub(crate) fn lookup(op: &'static str, name: &str, source: io::Error) -> Self {
        if is_missing(&source) {
            return Self::not_found(name);
        }
        if source.raw_os_error() == Some(libc::EISDIR) {
            return StoreError::IsDirectory {
                name: name.to_string(),
            };
        }
        Self::io(op, name, source)
    }
}

/// True for "no such file" and "a path component is not a directory".
pub(crate) fn is_missing(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::NotFound || err.raw_os_error() == Some(libc::ENOTDIR)
}
