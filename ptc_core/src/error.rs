//! Error types for point-cloud sessions.

use std::path::PathBuf;

use thiserror::Error;

use crate::session::State;

/// Coarse classification of an [`Error`].
///
/// Callers that only care about the category (e.g. "was this an exhaustion
/// signal or a real failure?") match on this instead of the full enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Open,
    Schema,
    MissingVariable,
    VariableShape,
    BufferSize,
    Eof,
    InvalidState,
    InvalidArgument,
    Codec,
}

/// Main error type for point-cloud operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Opening a session failed: unknown backend, bad path, corrupt header.
    #[error("cannot open {path:?} with backend '{backend}'")]
    Open {
        path: PathBuf,
        backend: String,
        #[source]
        source: anyhow::Error,
    },

    /// Variable declared with a type tag outside the recognized set.
    #[error("unknown variable type '{tag}'")]
    UnknownType { tag: String },

    /// Two declarations share a name.
    #[error("duplicate variable name '{name}'")]
    DuplicateVariable { name: String },

    /// A declaration has an empty name.
    #[error("variable names must not be empty")]
    EmptyVariableName,

    /// A declared variable is absent from the point's data mapping.
    #[error("point data is missing declared variable '{name}'")]
    MissingVariable { name: String },

    /// A data value does not have the component count of its declared type.
    #[error("variable '{name}' expects {expected} components, got {actual}")]
    VariableShape {
        name: String,
        expected: usize,
        actual: usize,
    },

    /// A caller buffer has the wrong number of elements.
    #[error("{buffer} buffer holds {actual} values, expected {expected}")]
    BufferSize {
        buffer: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Every point has been read.
    #[error("end of point cloud reached")]
    Eof,

    /// Operation not allowed in the session's current state.
    #[error("cannot {operation} while session is {state}")]
    InvalidState {
        operation: &'static str,
        state: State,
    },

    /// Argument outside its valid range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Backend failure, carried as reported.
    #[error(transparent)]
    Codec(anyhow::Error),
}

impl Error {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Open { .. } => ErrorKind::Open,
            Error::UnknownType { .. } | Error::DuplicateVariable { .. } | Error::EmptyVariableName => {
                ErrorKind::Schema
            }
            Error::MissingVariable { .. } => ErrorKind::MissingVariable,
            Error::VariableShape { .. } => ErrorKind::VariableShape,
            Error::BufferSize { .. } => ErrorKind::BufferSize,
            Error::Eof => ErrorKind::Eof,
            Error::InvalidState { .. } => ErrorKind::InvalidState,
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::Codec(_) => ErrorKind::Codec,
        }
    }

    /// True for the single-point exhaustion signal.
    pub fn is_eof(&self) -> bool {
        matches!(self, Error::Eof)
    }

    pub(crate) fn open(path: impl Into<PathBuf>, backend: &str, source: anyhow::Error) -> Self {
        Self::Open {
            path: path.into(),
            backend: backend.to_string(),
            source,
        }
    }

    pub(crate) fn buffer_size(buffer: &'static str, expected: usize, actual: usize) -> Self {
        Self::BufferSize {
            buffer,
            expected,
            actual,
        }
    }
}

/// Result type alias for point-cloud operations.
pub type Result<T> = std::result::Result<T, Error>;
