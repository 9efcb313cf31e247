//! Error types for schema registration, resolution and literal conversion.

use std::fmt;

/// A schema registration or resolution failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// The xmlns URI is not registered and is not a valid `using:` URI.
    UnknownNamespace {
        /// The namespace URI.
        uri: String,
    },
    /// No type of that name in any type namespace the URI maps to.
    UnknownType {
        /// The namespace URI.
        uri: String,
        /// The local name.
        name: String,
    },
    /// The type (and its bases) has no member of that name.
    UnknownProperty {
        /// Full name of the type searched.
        ty: String,
        /// The member name.
        name: String,
    },
    /// The property exists but cannot be used on the given type.
    PropertyNotOnType {
        /// The property name, as `Owner.Name`.
        property: String,
        /// Full name of the type it was used on.
        ty: String,
    },
    /// A type with the same name already exists in the type namespace.
    DuplicateType {
        /// Full name of the type.
        name: String,
    },
    /// The type already declares a member of the same name.
    DuplicateProperty {
        /// Full name of the owning type.
        ty: String,
        /// The member name.
        name: String,
    },
    /// A content property name does not resolve on its type.
    MissingContentProperty {
        /// Full name of the type.
        ty: String,
        /// The configured content property name.
        name: String,
    },
    /// A `[uri]Type.Property` string could not be split.
    InvalidQualifiedName {
        /// The offending text.
        text: String,
    },
    /// A type refers to a text syntax that was never registered.
    UnknownTextSyntax {
        /// The syntax name.
        name: String,
    },
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaError::UnknownNamespace { uri } => write!(f, "unknown xmlns '{uri}'"),
            SchemaError::UnknownType { uri, name } => {
                write!(f, "unknown type '{name}' in xmlns '{uri}'")
            }
            SchemaError::UnknownProperty { ty, name } => {
                write!(f, "type '{ty}' has no member '{name}'")
            }
            SchemaError::PropertyNotOnType { property, ty } => {
                write!(f, "member '{property}' cannot be set on type '{ty}'")
            }
            SchemaError::DuplicateType { name } => write!(f, "type '{name}' registered twice"),
            SchemaError::DuplicateProperty { ty, name } => {
                write!(f, "member '{name}' registered twice on '{ty}'")
            }
            SchemaError::MissingContentProperty { ty, name } => {
                write!(f, "content property '{name}' not found on '{ty}'")
            }
            SchemaError::InvalidQualifiedName { text } => {
                write!(f, "'{text}' is not of the form [uri]Type.Property")
            }
            SchemaError::UnknownTextSyntax { name } => write!(f, "unknown text syntax '{name}'"),
        }
    }
}

impl std::error::Error for SchemaError {}

/// A literal could not be converted to its target type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionError {
    /// Full name of the target type.
    pub target: String,
    /// The text that failed to convert.
    pub text: String,
    /// Why it failed.
    pub reason: String,
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cannot convert '{}' to {}: {}",
            self.text, self.target, self.reason
        )
    }
}

impl std::error::Error for ConversionError {}
