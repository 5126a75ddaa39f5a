//! Error types for model operations.

use std::fmt;
use thiserror::Error;

use crate::element::CElement;

/// Status codes reported by model consistency failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// The element (or its underlying resource) does not exist.
    ElementDoesNotExist,
    /// The element's resource cannot be modified.
    ReadOnly,
    /// The destination of a copy/move is not a usable container.
    InvalidDestination,
    /// The destination already holds an element with the same name.
    NameCollision,
    /// The operation does not apply to this kind of element.
    InvalidElementTypes,
    /// A new name for an element is not a single file name.
    InvalidPath,
    /// Reading the resource failed.
    IoFailure,
}

impl StatusCode {
    /// Numeric code carried by the status.
    pub fn code(&self) -> u32 {
        match self {
            StatusCode::ElementDoesNotExist => 969,
            StatusCode::ReadOnly => 976,
            StatusCode::InvalidDestination => 978,
            StatusCode::NameCollision => 977,
            StatusCode::InvalidElementTypes => 4,
            StatusCode::InvalidPath => 979,
            StatusCode::IoFailure => 985,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCode::ElementDoesNotExist => "element_does_not_exist",
            StatusCode::ReadOnly => "read_only",
            StatusCode::InvalidDestination => "invalid_destination",
            StatusCode::NameCollision => "name_collision",
            StatusCode::InvalidElementTypes => "invalid_element_types",
            StatusCode::InvalidPath => "invalid_path",
            StatusCode::IoFailure => "io_failure",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.as_str(), self.code())
    }
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("[{code}] {message}")]
    Status {
        code: StatusCode,
        element: Option<CElement>,
        message: String,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ModelError {
    pub fn status(
        code: StatusCode,
        element: Option<&CElement>,
        message: impl Into<String>,
    ) -> Self {
        ModelError::Status {
            code,
            element: element.cloned(),
            message: message.into(),
        }
    }

    pub fn does_not_exist(element: &CElement) -> Self {
        Self::status(
            StatusCode::ElementDoesNotExist,
            Some(element),
            format!("{} does not exist", element),
        )
    }

    pub fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        ModelError::Io {
            path: path.display().to_string(),
            source,
        }
    }

    /// Status code of the failure; plain I/O errors report `IoFailure`.
    pub fn code(&self) -> StatusCode {
        match self {
            ModelError::Status { code, .. } => *code,
            ModelError::Io { .. } => StatusCode::IoFailure,
        }
    }

    /// Element the failure refers to, when there is one.
    pub fn element(&self) -> Option<&CElement> {
        match self {
            ModelError::Status { element, .. } => element.as_ref(),
            ModelError::Io { .. } => None,
        }
    }
}

pub type ModelResult<T> = std::result::Result<T, ModelError>;
