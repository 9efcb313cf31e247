#![warn(missing_docs)]
//! Schema context for XAML object construction.
//!
//! The schema holds every type and member the object writer can construct,
//! the mapping from xmlns URIs to code namespaces, and the conversions used
//! to turn attribute literals into typed values.
//!
//! A schema is configured through a [`SchemaBuilder`] and frozen into an
//! `Arc<SchemaContext>`. Once frozen it is immutable, so it can be shared by
//! any number of writers and deferred replays, on any thread.
//!
//! # Example
//!
//! ```
//! use xaml_schema::{PropertyDef, SchemaBuilder, TypeDef, TypeNamespace};
//!
//! let mut builder = SchemaBuilder::new();
//! let asm = builder.add_assembly("App");
//! let ns = TypeNamespace::new(asm, "App.Controls");
//! builder.register_namespace("urn:app", &ns);
//!
//! let double = builder.well_known().double;
//! let button = builder.add_type(TypeDef::object(&ns, "Button")).unwrap();
//! builder.add_property(button, PropertyDef::new("Width", double)).unwrap();
//!
//! let schema = builder.build().unwrap();
//! let ty = schema.resolve_type("urn:app", "Button").unwrap();
//! assert!(schema.resolve_property(ty.index, "Width").is_ok());
//! ```

mod context;
mod descriptor;
mod error;
mod namespace;
mod primitive;
mod token;
mod tracing_macros;

pub use context::{SYSTEM_NAMESPACE, SchemaBuilder, SchemaContext, TextSyntax, WellKnownTypes};
pub use descriptor::{
    CollectionInfo, ExtensionKind, Factory, PropertyDef, PropertyDescriptor, Setter, TypeDef,
    TypeDescriptor, TypeKind,
};
pub use error::{ConversionError, SchemaError};
pub use namespace::{Directive, XAML_NAMESPACE, XML_NAMESPACE, crack_using_xmlns};
pub use primitive::{EnumDef, PrimitiveKind, Scalar, parse_with_shape};
pub use token::{AssemblyToken, PropertyIndex, TypeIndex, TypeNamespace};
