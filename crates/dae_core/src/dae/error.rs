//! Error taxonomy for COLLADA document resolution.

use std::fmt;

use thiserror::Error;

/// Which registry an unresolved id was looked up in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefKind {
    Source,
    Vertices,
    Geometry,
    Controller,
    Material,
    Effect,
}

impl fmt::Display for RefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RefKind::Source => "source",
            RefKind::Vertices => "vertices",
            RefKind::Geometry => "geometry",
            RefKind::Controller => "controller",
            RefKind::Material => "material",
            RefKind::Effect => "effect",
        };
        f.write_str(name)
    }
}

/// Errors that abort the resolution of a document.
#[derive(Error, Debug)]
pub enum ParseError {
    /// A required attribute or child is missing, a value does not parse,
    /// or a handler was given the wrong element.
    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    /// A valid COLLADA construct this loader does not implement.
    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// An id referenced from somewhere in the document does not exist.
    #[error("Unresolved {kind} reference '{id}'")]
    UnresolvedReference { kind: RefKind, id: String },

    /// The document declares a COLLADA version outside the supported set.
    #[error("Unsupported COLLADA version '{0}'")]
    VersionUnsupported(String),
}

/// Coarse error category, for callers that branch on the kind of failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    MalformedDocument,
    UnsupportedFeature,
    UnresolvedReference,
    VersionUnsupported,
}

impl ParseError {
    /// The category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ParseError::MalformedDocument(_) => ErrorKind::MalformedDocument,
            ParseError::UnsupportedFeature(_) => ErrorKind::UnsupportedFeature,
            ParseError::UnresolvedReference { .. } => ErrorKind::UnresolvedReference,
            ParseError::VersionUnsupported(_) => ErrorKind::VersionUnsupported,
        }
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        ParseError::MalformedDocument(message.into())
    }

    pub(crate) fn unsupported(message: impl Into<String>) -> Self {
        ParseError::UnsupportedFeature(message.into())
    }

    pub(crate) fn unresolved(kind: RefKind, id: impl Into<String>) -> Self {
        ParseError::UnresolvedReference {
            kind,
            id: id.into(),
        }
    }
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;
