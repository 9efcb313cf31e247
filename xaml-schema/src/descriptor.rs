//! Type and property descriptors.
//!
//! Descriptors are owned by the [`SchemaContext`](crate::SchemaContext) and are
//! immutable once the schema is frozen. Everything else refers to them through
//! [`TypeIndex`] and [`PropertyIndex`].

use crate::primitive::{EnumDef, PrimitiveKind, Scalar};
use crate::token::{PropertyIndex, TypeIndex, TypeNamespace};

/// How instances of a type come into being.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Factory {
    /// Created through the default constructor.
    Default,
    /// Created by the host activator, addressed by a qualified runtime name.
    Activate(String),
    /// Created by converting initialization text through the type's conversion.
    Primitive,
    /// Cannot be created from markup (abstract types, interfaces).
    Abstract,
}

/// The built-in markup extensions, plus a slot for host-provided ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, facet::Facet)]
#[repr(u8)]
pub enum ExtensionKind {
    /// `{StaticResource key}`
    StaticResource,
    /// `{ThemeResource key}`
    ThemeResource,
    /// `{TemplateBinding property}`
    TemplateBinding,
    /// `{Binding path}`
    Binding,
    /// `{x:Null}`
    Null,
    /// Provided by a registered host extension provider.
    Custom,
}

/// The closed set of type shapes the writer knows how to handle.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    /// An ordinary object with properties.
    Object,
    /// A built-in primitive, converted from text.
    Primitive(PrimitiveKind),
    /// An enumeration, converted from member names or ordinals.
    Enum(EnumDef),
    /// A markup extension; its provided value replaces the instance.
    MarkupExtension(ExtensionKind),
}

/// Collection-add capability of a type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionInfo {
    /// Expected item type, if the collection is typed.
    pub item_type: Option<TypeIndex>,
    /// Items are stored under an `x:Key` (dictionary semantics).
    pub keyed: bool,
    /// Whether the same value may be added twice.
    pub allows_duplicates: bool,
}

impl CollectionInfo {
    /// An ordered list that accepts duplicates.
    pub fn list(item_type: Option<TypeIndex>) -> Self {
        Self {
            item_type,
            keyed: false,
            allows_duplicates: true,
        }
    }

    /// A keyed dictionary.
    pub fn dictionary(item_type: Option<TypeIndex>) -> Self {
        Self {
            item_type,
            keyed: true,
            allows_duplicates: false,
        }
    }

    /// Forbid adding the same value twice.
    pub fn unique(mut self) -> Self {
        self.allows_duplicates = false;
        self
    }
}

/// A constructible (or at least nameable) type.
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    /// Stable index of this type.
    pub index: TypeIndex,
    /// Local name, e.g. `Grid`.
    pub name: String,
    /// Code namespace the type lives in.
    pub namespace: TypeNamespace,
    /// Base type, if any.
    pub base: Option<TypeIndex>,
    /// Shape of the type.
    pub kind: TypeKind,
    /// Factory contract.
    pub factory: Factory,
    /// Property implicitly populated by child content, inherited from bases.
    pub content_property: Option<PropertyIndex>,
    /// Collection-add capability, inherited from bases.
    pub collection: Option<CollectionInfo>,
    /// Name of a registered text syntax used to convert literals.
    pub text_syntax: Option<String>,
}

impl TypeDescriptor {
    /// `Namespace.Name` form used in diagnostics.
    pub fn full_name(&self) -> String {
        if self.namespace.name.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace.name, self.name)
        }
    }

    /// Whether this type has collection-add capability.
    pub fn is_collection(&self) -> bool {
        self.collection.is_some()
    }

    /// Whether this type is a markup extension.
    pub fn extension_kind(&self) -> Option<ExtensionKind> {
        match self.kind {
            TypeKind::MarkupExtension(kind) => Some(kind),
            _ => None,
        }
    }

    /// Whether literals can be converted into this type.
    pub fn has_text_conversion(&self) -> bool {
        matches!(self.kind, TypeKind::Primitive(_) | TypeKind::Enum(_)) || self.text_syntax.is_some()
    }
}

/// How a property may be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Setter {
    /// Assignable.
    ReadWrite,
    /// Read-only collection: markup may only add items to it.
    AddOnly,
    /// Not settable from markup.
    ReadOnly,
}

/// A settable member on a type.
#[derive(Debug, Clone)]
pub struct PropertyDescriptor {
    /// Stable index of this property.
    pub index: PropertyIndex,
    /// Member name, e.g. `Children`.
    pub name: String,
    /// Type that declares the member.
    pub declaring_type: TypeIndex,
    /// Type of values the member accepts.
    pub value_type: TypeIndex,
    /// Attached property (`Owner.Property` syntax on foreign objects).
    pub attached: bool,
    /// Stored in the property system under this descriptor's index.
    pub indexable: bool,
    /// Default value reported by the property system when nothing is set.
    pub default_value: Option<Scalar>,
    /// Setter contract.
    pub setter: Setter,
    /// Content is recorded and constructed on demand (templates).
    pub deferred: bool,
}

/// Registration input for a type.
#[derive(Debug, Clone)]
pub struct TypeDef {
    pub(crate) name: String,
    pub(crate) namespace: TypeNamespace,
    pub(crate) base: Option<TypeIndex>,
    pub(crate) kind: TypeKind,
    pub(crate) factory: Factory,
    pub(crate) content_property: Option<String>,
    pub(crate) collection: Option<CollectionInfo>,
    pub(crate) text_syntax: Option<String>,
}

impl TypeDef {
    /// An ordinary default-constructible object type.
    pub fn object(namespace: &TypeNamespace, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.clone(),
            base: None,
            kind: TypeKind::Object,
            factory: Factory::Default,
            content_property: None,
            collection: None,
            text_syntax: None,
        }
    }

    /// A primitive type created from text.
    pub fn primitive(namespace: &TypeNamespace, name: impl Into<String>, kind: PrimitiveKind) -> Self {
        Self {
            kind: TypeKind::Primitive(kind),
            factory: Factory::Primitive,
            ..Self::object(namespace, name)
        }
    }

    /// An enumeration type.
    pub fn enumeration(namespace: &TypeNamespace, name: impl Into<String>, def: EnumDef) -> Self {
        Self {
            kind: TypeKind::Enum(def),
            factory: Factory::Primitive,
            ..Self::object(namespace, name)
        }
    }

    /// A markup extension type.
    pub fn extension(namespace: &TypeNamespace, name: impl Into<String>, kind: ExtensionKind) -> Self {
        Self {
            kind: TypeKind::MarkupExtension(kind),
            ..Self::object(namespace, name)
        }
    }

    /// Set the base type.
    pub fn with_base(mut self, base: TypeIndex) -> Self {
        self.base = Some(base);
        self
    }

    /// Set the factory contract.
    pub fn with_factory(mut self, factory: Factory) -> Self {
        self.factory = factory;
        self
    }

    /// Name the content property; resolved when the schema is frozen.
    pub fn with_content_property(mut self, name: impl Into<String>) -> Self {
        self.content_property = Some(name.into());
        self
    }

    /// Give the type collection-add capability.
    pub fn with_collection(mut self, info: CollectionInfo) -> Self {
        self.collection = Some(info);
        self
    }

    /// Convert literals through a registered text syntax.
    pub fn with_text_syntax(mut self, name: impl Into<String>) -> Self {
        self.text_syntax = Some(name.into());
        if matches!(self.factory, Factory::Default) {
            self.factory = Factory::Primitive;
        }
        self
    }
}

/// Registration input for a property.
#[derive(Debug, Clone)]
pub struct PropertyDef {
    pub(crate) name: String,
    pub(crate) value_type: TypeIndex,
    pub(crate) attached: bool,
    pub(crate) indexable: bool,
    pub(crate) default_value: Option<Scalar>,
    pub(crate) setter: Setter,
    pub(crate) deferred: bool,
}

impl PropertyDef {
    /// A read-write property of the given value type.
    pub fn new(name: impl Into<String>, value_type: TypeIndex) -> Self {
        Self {
            name: name.into(),
            value_type,
            attached: false,
            indexable: true,
            default_value: None,
            setter: Setter::ReadWrite,
            deferred: false,
        }
    }

    /// An attached property (`Owner.Name`).
    pub fn attached(mut self) -> Self {
        self.attached = true;
        self
    }

    /// A plain member that is not stored in the property system.
    pub fn not_indexable(mut self) -> Self {
        self.indexable = false;
        self
    }

    /// Default value reported when nothing is set.
    pub fn with_default(mut self, value: Scalar) -> Self {
        self.default_value = Some(value);
        self
    }

    /// Override the setter contract.
    pub fn with_setter(mut self, setter: Setter) -> Self {
        self.setter = setter;
        self
    }

    /// Record the content instead of constructing it.
    pub fn deferred(mut self) -> Self {
        self.deferred = true;
        self
    }
}
