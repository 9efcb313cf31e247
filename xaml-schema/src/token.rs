//! Stable handles into the schema tables.

use std::fmt;

/// Index of a registered type descriptor.
///
/// Indices are assigned in registration order and never change once the
/// schema is frozen, so they can be stored in object graphs and saved
/// contexts in place of the descriptors themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, facet::Facet)]
pub struct TypeIndex(pub u32);

/// Index of a registered property descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, facet::Facet)]
pub struct PropertyIndex(pub u32);

/// Identifies an assembly (a unit of type registration).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, facet::Facet)]
pub struct AssemblyToken(pub u32);

/// A code namespace inside an assembly, e.g. `Microsoft.UI.Xaml.Controls`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeNamespace {
    /// Owning assembly.
    pub assembly: AssemblyToken,
    /// Dotted code namespace name.
    pub name: String,
}

impl TypeNamespace {
    /// Create a type namespace handle.
    pub fn new(assembly: AssemblyToken, name: impl Into<String>) -> Self {
        Self {
            assembly,
            name: name.into(),
        }
    }
}

impl TypeIndex {
    pub(crate) fn slot(self) -> usize {
        self.0 as usize
    }
}

impl PropertyIndex {
    pub(crate) fn slot(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TypeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type#{}", self.0)
    }
}

impl fmt::Display for PropertyIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "property#{}", self.0)
    }
}

impl fmt::Display for TypeNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (assembly {})", self.name, self.assembly.0)
    }
}
