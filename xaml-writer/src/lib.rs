//! Streaming construction of typed object graphs from XAML node events.
//!
//! A tokenizer produces [`XamlEvent`]s (`StartObject`, `StartMember`,
//! `Value`, ...). The [`ObjectWriter`] interprets them against a
//! [`SchemaContext`](xaml_schema::SchemaContext): it resolves types and
//! members, creates objects, converts literals, evaluates markup extensions
//! and assigns the results into an [`ObjectGraph`].
//!
//! ```
//! use xaml_schema::{PropertyDef, SchemaBuilder, TypeDef, TypeNamespace};
//! use xaml_writer::{construct, MemberName, Value, VecEventSource, WriterSettings, XamlEvent};
//!
//! let mut builder = SchemaBuilder::new();
//! let ns = TypeNamespace::new(builder.add_assembly("Demo"), "Demo");
//! builder.register_namespace("urn:demo", &ns);
//! let int32 = builder.well_known().int32;
//! let point = builder.add_type(TypeDef::object(&ns, "Point")).unwrap();
//! let x = builder.add_property(point, PropertyDef::new("X", int32)).unwrap();
//! let schema = builder.build().unwrap();
//!
//! let mut source = VecEventSource::from_events([
//!     XamlEvent::start_object("urn:demo", "Point"),
//!     XamlEvent::StartMember(MemberName::local("X")),
//!     XamlEvent::text("3"),
//!     XamlEvent::EndMember,
//!     XamlEvent::EndObject,
//! ]);
//! let tree = construct(&mut source, schema, WriterSettings::new())
//!     .unwrap()
//!     .into_tree()
//!     .unwrap();
//! let root = tree.graph.node(tree.root_object().unwrap());
//! assert!(matches!(root.get(x), Some(Value::Scalar(_))));
//! ```
//!
//! Templates and `x:Load="False"` elements are recorded instead of built;
//! see [`TemplateContent`] and [`DeferredElementCreator`].

#![warn(missing_docs)]

mod error;
mod event;
mod extension;
mod graph;
mod namescope;
mod saved;
mod settings;
mod source;
mod stack;
mod tracing_macros;
mod writer;

pub use error::{ConstructError, ErrorKind, FatalError, XamlError};
pub use event::{MemberName, RecordedEvent, SourcePosition, XamlEvent, XamlValue};
pub use extension::{
    Evaluated, ExprArg, ExtensionCall, ExtensionExpr, ExtensionTarget, parse_extension,
};
pub use graph::{
    DeferredPlaceholder, ElementRef, Expression, Item, ObjectGraph, ObjectId, ObjectNode,
    PropertySystem, TemplateBindingRecord, TemplateRef, ThemeReference, Value,
};
pub use namescope::{DuplicateName, NameLookup, NameScope};
pub use saved::{DeferredElementCreator, SavedContext, TemplateContent, hash_events};
pub use settings::{
    Activator, MarkupExtensionProvider, ObjectWriterCallbacks, ResourceResolver, WriterSettings,
};
pub use source::{VecEventSource, XamlEventSource};
pub use stack::{ActiveMember, Frame, Instance, MemberMode, MemberTarget, WriterStack};
pub use writer::{Construction, ObjectTree, ObjectWriter, WriterState, construct};
