use std::io;

use nodefs_ace::AceError;
use nodefs_xattr::XattrError;
use thiserror::Error;

/// Errors that can occur while resolving or mutating the tree
#[derive(Error, Debug)]
pub enum TreeError {
    /// Missing node, path segment or ancestor. Carries the id or segment name.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("not a leaf: {0} still has children")]
    NotALeaf(String),

    /// The record exists but a mandatory attribute is missing, usually after
    /// a crash in the middle of a mutation
    #[error("incomplete node {node_id}: missing {attribute}")]
    IncompleteNode { node_id: String, attribute: String },

    #[error("inconsistent ace encoding: {0}")]
    InconsistentEncoding(#[from] AceError),

    #[error("invalid reference: {0}")]
    InvalidReference(String),

    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("node {node_id} already carries {limit} grants")]
    GrantLimitExceeded { node_id: String, limit: usize },

    #[error("metadata backend error: {0}")]
    Backend(XattrError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, TreeError>;

/// Coarse classification for the request layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    NotSupported,
    InvalidArgument,
    Internal,
}

impl TreeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TreeError::NotFound(_) | TreeError::IncompleteNode { .. } => ErrorKind::NotFound,
            TreeError::AlreadyExists(_)
            | TreeError::NotALeaf(_)
            | TreeError::GrantLimitExceeded { .. } => ErrorKind::Conflict,
            TreeError::NotSupported(_) => ErrorKind::NotSupported,
            TreeError::InvalidReference(_) => ErrorKind::InvalidArgument,
            TreeError::InconsistentEncoding(_)
            | TreeError::Backend(_)
            | TreeError::Io(_)
            | TreeError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, TreeError::NotFound(_))
    }
}

impl From<XattrError> for TreeError {
    fn from(err: XattrError) -> Self {
        match err {
            XattrError::NotFound { path } => TreeError::NotFound(path.display().to_string()),
            XattrError::AttrUnset { path, key } => {
                TreeError::NotFound(format!("{key} on {}", path.display()))
            }
            other => TreeError::Backend(other),
        }
    }
}
