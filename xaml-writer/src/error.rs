//! Diagnostics produced while constructing object graphs.

use std::fmt;

use xaml_schema::{ConversionError, SchemaError};

use crate::event::SourcePosition;

/// Category of a construction diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, facet::Facet)]
#[repr(u8)]
pub enum ErrorKind {
    /// Unknown namespace, type or member.
    SchemaResolution,
    /// A type could not be instantiated.
    Activation,
    /// A literal did not convert to the target type.
    ValueConversion,
    /// A markup extension failed or referenced something that never resolved.
    ExtensionEvaluation,
    /// A value could not be attached where it was written.
    Assignment,
    /// Unmatched scope events. Always fatal.
    StackDiscipline,
}

impl ErrorKind {
    /// Whether construction can continue past a diagnostic of this kind.
    pub fn is_recoverable(self) -> bool {
        !matches!(self, ErrorKind::StackDiscipline)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::SchemaResolution => "schema resolution error",
            ErrorKind::Activation => "activation error",
            ErrorKind::ValueConversion => "value conversion error",
            ErrorKind::ExtensionEvaluation => "extension evaluation error",
            ErrorKind::Assignment => "assignment error",
            ErrorKind::StackDiscipline => "stack discipline error",
        })
    }
}

/// One construction diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, facet::Facet)]
pub struct XamlError {
    /// Category.
    pub kind: ErrorKind,
    /// Type or member involved, if any.
    pub name: Option<String>,
    /// Approximate location.
    pub position: Option<SourcePosition>,
    /// Human-readable detail.
    pub message: String,
}

impl XamlError {
    /// Create a diagnostic.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            name: None,
            position: None,
            message: message.into(),
        }
    }

    /// Attach the type or member name involved.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attach a position unless one is already set.
    pub fn at(mut self, position: Option<SourcePosition>) -> Self {
        if self.position.is_none() {
            self.position = position;
        }
        self
    }

    pub(crate) fn schema(err: SchemaError, name: impl Into<String>) -> Self {
        Self::new(ErrorKind::SchemaResolution, err.to_string()).with_name(name)
    }

    pub(crate) fn conversion(err: ConversionError, name: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValueConversion, err.to_string()).with_name(name)
    }

    pub(crate) fn assignment(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Assignment, message)
    }

    pub(crate) fn stack(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StackDiscipline, message)
    }
}

impl fmt::Display for XamlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(name) = &self.name {
            write!(f, " ({name})")?;
        }
        if let Some(pos) = &self.position {
            write!(f, " at {pos}")?;
        }
        write!(f, ": {}", self.message)
    }
}

impl std::error::Error for XamlError {}

/// An unrecoverable internal-consistency violation; the session is over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FatalError(pub XamlError);

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fatal: {}", self.0)
    }
}

impl std::error::Error for FatalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

/// Error driving a writer from an event source.
#[derive(Debug)]
pub enum ConstructError<E> {
    /// The event source failed.
    Source(E),
    /// The writer hit a fatal error.
    Fatal(FatalError),
}

impl<E: fmt::Display> fmt::Display for ConstructError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstructError::Source(e) => write!(f, "event source error: {e}"),
            ConstructError::Fatal(e) => write!(f, "{e}"),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for ConstructError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConstructError::Source(e) => Some(e),
            ConstructError::Fatal(e) => Some(e),
        }
    }
}

impl<E> From<FatalError> for ConstructError<E> {
    fn from(e: FatalError) -> Self {
        ConstructError::Fatal(e)
    }
}
