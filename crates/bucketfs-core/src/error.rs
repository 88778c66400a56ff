//! Error types for the object-storage filesystem adapter

use std::fmt;

use thiserror::Error;

/// Result type alias using the adapter Error
pub type Result<T> = std::result::Result<T, Error>;

/// Failure reported by an object-storage client
///
/// This is the collaborator-level error: the adapter never returns it
/// directly, it is always wrapped into an operation-specific [`Error`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("Object not found: {key}")]
    NotFound { key: String },

    #[error("Service error ({code}): {message}")]
    Service { code: String, message: String },

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Invalid request: {message}")]
    Request { message: String },
}

impl ClientError {
    /// Returns true if the service reported that the key does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound { .. })
    }
}

/// Attribute that a metadata lookup was trying to retrieve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataAttribute {
    MimeType,
    FileSize,
    LastModified,
    Visibility,
}

impl fmt::Display for MetadataAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetadataAttribute::MimeType => "mime_type",
            MetadataAttribute::FileSize => "file_size",
            MetadataAttribute::LastModified => "last_modified",
            MetadataAttribute::Visibility => "visibility",
        };
        f.write_str(name)
    }
}

/// Operation error returned by the adapter
///
/// Every variant carries the logical path(s) the caller passed in, and the
/// collaborator failure (if any) as its `source()`.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Unable to check existence for: {path}: {source}")]
    ExistenceCheckFailed {
        path: String,
        #[source]
        source: ClientError,
    },

    #[error("Unable to read file from location: {path}: {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: ClientError,
    },

    #[error("Unable to write file at location: {path}: {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: ClientError,
    },

    #[error("Unable to delete file located at: {path}: {source}")]
    DeleteFailed {
        path: String,
        #[source]
        source: ClientError,
    },

    #[error("Unable to delete directory located at: {path}: {source}")]
    DeleteDirectoryFailed {
        path: String,
        #[source]
        source: ClientError,
    },

    #[error("Unable to create directory at location: {path}: {source}")]
    CreateDirectoryFailed {
        path: String,
        #[source]
        source: ClientError,
    },

    #[error("Unable to set visibility for file {path}: {source}")]
    SetVisibilityFailed {
        path: String,
        #[source]
        source: ClientError,
    },

    #[error("Unable to retrieve the {attribute} for file at location: {path}. {reason}")]
    MetadataRetrievalFailed {
        path: String,
        attribute: MetadataAttribute,
        reason: String,
        #[source]
        source: Option<ClientError>,
    },

    #[error("Unable to list contents at location: {path}: {source}")]
    ListingFailed {
        path: String,
        #[source]
        source: ClientError,
    },

    #[error("Unable to copy file from {from} to {to}: {source}")]
    CopyFailed {
        from: String,
        to: String,
        #[source]
        source: ClientError,
    },

    /// A move is a copy followed by a delete; `source` is the
    /// [`Error::CopyFailed`] or [`Error::DeleteFailed`] of the failing step.
    #[error("Unable to move file from {from} to {to}: {source}")]
    MoveFailed {
        from: String,
        to: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Invalid visibility provided: {value}")]
    InvalidVisibility { value: String },

    // Configuration errors
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Logical path the failing operation was called with
    ///
    /// For copy and move this is the source path.
    pub fn path(&self) -> Option<&str> {
        match self {
            Error::ExistenceCheckFailed { path, .. }
            | Error::ReadFailed { path, .. }
            | Error::WriteFailed { path, .. }
            | Error::DeleteFailed { path, .. }
            | Error::DeleteDirectoryFailed { path, .. }
            | Error::CreateDirectoryFailed { path, .. }
            | Error::SetVisibilityFailed { path, .. }
            | Error::MetadataRetrievalFailed { path, .. }
            | Error::ListingFailed { path, .. } => Some(path),
            Error::CopyFailed { from, .. } | Error::MoveFailed { from, .. } => Some(from),
            Error::InvalidVisibility { .. } | Error::InvalidConfig { .. } | Error::Io(_) => None,
        }
    }

    /// The collaborator failure at the root of this error, if any
    pub fn client_error(&self) -> Option<&ClientError> {
        match self {
            Error::ExistenceCheckFailed { source, .. }
            | Error::ReadFailed { source, .. }
            | Error::WriteFailed { source, .. }
            | Error::DeleteFailed { source, .. }
            | Error::DeleteDirectoryFailed { source, .. }
            | Error::CreateDirectoryFailed { source, .. }
            | Error::SetVisibilityFailed { source, .. }
            | Error::ListingFailed { source, .. }
            | Error::CopyFailed { source, .. } => Some(source),
            Error::MetadataRetrievalFailed { source, .. } => source.as_ref(),
            Error::MoveFailed { source, .. } => source.client_error(),
            Error::InvalidVisibility { .. } | Error::InvalidConfig { .. } | Error::Io(_) => None,
        }
    }

    /// Returns true if the root cause is a missing object
    pub fn is_not_found(&self) -> bool {
        self.client_error().is_some_and(ClientError::is_not_found)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::InvalidConfig {
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_walks_move_chain() {
        let err = Error::MoveFailed {
            from: "a.txt".to_string(),
            to: "b.txt".to_string(),
            source: Box::new(Error::CopyFailed {
                from: "a.txt".to_string(),
                to: "b.txt".to_string(),
                source: ClientError::NotFound {
                    key: "a.txt".to_string(),
                },
            }),
        };
        assert!(err.is_not_found());
        assert_eq!(err.path(), Some("a.txt"));

        let err = Error::WriteFailed {
            path: "a.txt".to_string(),
            source: ClientError::Transport {
                message: "connection reset".to_string(),
            },
        };
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_metadata_error_without_client_source() {
        let err = Error::MetadataRetrievalFailed {
            path: "foo/bar.md".to_string(),
            attribute: MetadataAttribute::MimeType,
            reason: "mime type is not available".to_string(),
            source: None,
        };
        assert!(err.client_error().is_none());
        assert_eq!(
            err.to_string(),
            "Unable to retrieve the mime_type for file at location: foo/bar.md. mime type is not available"
        );
    }

    #[test]
    fn test_source_chain_is_exposed() {
        use std::error::Error as _;

        let err = Error::DeleteFailed {
            path: "x".to_string(),
            source: ClientError::Service {
                code: "AccessDenied".to_string(),
                message: "denied".to_string(),
            },
        };
        let source = err.source().map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("Service error (AccessDenied): denied"));
    }
}
