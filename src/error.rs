//! Defines the error type shared by all byte sources.

use thiserror::Error;

use crate::position::Position;

/// Result type used throughout this crate.
pub type SourceResult<T> = Result<T, SourceError>;

/// The ways in which constructing or accessing a byte source can fail.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The accessed position lies outside the extent of the source.
    #[error("position {position:?} is outside the extent of {name}")]
    OutOfRange {
        /// The name of the accessed source.
        name: String,
        /// The position the access started at.
        position: Position,
    },

    /// A write was attempted on a read-only source.
    #[error("{name} is read-only")]
    ReadOnly {
        /// The name of the accessed source.
        name: String,
    },

    /// An I/O operation on the underlying data failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The memory of the target process is not accessible to this process.
    #[error("access to the memory of process {pid} was denied")]
    AccessDenied {
        /// The id of the target process.
        pid: u32,
    },

    /// The target process does not exist (anymore).
    #[error("process {pid} is not a valid target")]
    InvalidHandle {
        /// The id of the target process.
        pid: u32,
    },
}
