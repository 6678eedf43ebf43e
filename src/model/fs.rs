use std::time::SystemTime;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FSError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("remote failure: {message}")]
    Remote { message: String },

    #[error("{operation} is not supported on a {kind} handle")]
    Unsupported {
        operation: &'static str,
        kind: &'static str,
    },

    #[error("file already closed")]
    Closed,

    #[error("seek to a negative offset")]
    InvalidSeek,

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid configuration: {message}")]
    Config { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FSError {
    pub fn remote(message: impl Into<String>) -> Self {
        FSError::Remote {
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FSError::NotFound(_))
    }
}

/// Stat record handed to the serving layer for both handle variants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub modified_time: Option<SystemTime>,
    pub is_dir: bool,
    pub content_type: Option<String>,
    pub etag: Option<String>,
}

impl FileInfo {
    pub fn directory(name: &str) -> Self {
        Self {
            name: name.to_string(),
            size: 0,
            modified_time: None,
            is_dir: true,
            content_type: None,
            etag: None,
        }
    }
}
