//! The schema registry: builder, frozen context and cached resolution.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::descriptor::{
    CollectionInfo, ExtensionKind, Factory, PropertyDef, PropertyDescriptor, TypeDef,
    TypeDescriptor, TypeKind,
};
use crate::error::{ConversionError, SchemaError};
use crate::namespace::{XAML_NAMESPACE, crack_using_xmlns};
use crate::primitive::{PrimitiveKind, Scalar};
use crate::token::{AssemblyToken, PropertyIndex, TypeIndex, TypeNamespace};
use crate::tracing_macros::{debug, trace};

/// Converts a literal into a value of a complex type (e.g. a thickness).
pub type TextSyntax = Arc<dyn Fn(&str) -> Result<Scalar, String> + Send + Sync>;

/// Name of the code namespace holding the language primitives.
pub const SYSTEM_NAMESPACE: &str = "System";

/// Types every schema carries.
#[derive(Debug, Clone, Copy)]
pub struct WellKnownTypes {
    /// `x:Object`, the root of every hierarchy.
    pub object: TypeIndex,
    /// `x:String`
    pub string: TypeIndex,
    /// `x:Boolean`
    pub boolean: TypeIndex,
    /// `x:Int32`
    pub int32: TypeIndex,
    /// `x:Double`
    pub double: TypeIndex,
    /// `x:Null`
    pub null: TypeIndex,
}

/// Collects types, members and xmlns mappings, then freezes them.
///
/// A new builder already knows the XAML language namespace: its primitives
/// (`x:String`, `x:Int32`, ...), `x:Object` and `x:Null`.
pub struct SchemaBuilder {
    assemblies: Vec<String>,
    xmlns: HashMap<String, Vec<TypeNamespace>>,
    types: Vec<TypeDescriptor>,
    pending_content: Vec<(TypeIndex, String)>,
    type_names: HashMap<TypeNamespace, HashMap<String, TypeIndex>>,
    properties: Vec<PropertyDescriptor>,
    members: HashMap<TypeIndex, HashMap<String, PropertyIndex>>,
    text_syntaxes: HashMap<String, TextSyntax>,
    well_known: WellKnownTypes,
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaBuilder {
    /// Create a builder with the language namespace pre-registered.
    pub fn new() -> Self {
        let placeholder = TypeIndex(0);
        let mut builder = Self {
            assemblies: Vec::new(),
            xmlns: HashMap::new(),
            types: Vec::new(),
            pending_content: Vec::new(),
            type_names: HashMap::new(),
            properties: Vec::new(),
            members: HashMap::new(),
            text_syntaxes: HashMap::new(),
            well_known: WellKnownTypes {
                object: placeholder,
                string: placeholder,
                boolean: placeholder,
                int32: placeholder,
                double: placeholder,
                null: placeholder,
            },
        };

        let system = builder.add_assembly(SYSTEM_NAMESPACE);
        let ns = TypeNamespace::new(system, SYSTEM_NAMESPACE);
        builder.register_namespace(XAML_NAMESPACE, &ns);

        // The language namespace never collides with itself.
        let mut add = |def: TypeDef| builder.insert_type(def);
        let object = add(TypeDef::object(&ns, "Object").with_factory(Factory::Default));
        let mut primitive = HashMap::new();
        for kind in PrimitiveKind::ALL {
            let idx = add(TypeDef::primitive(&ns, kind.xaml_name(), kind).with_base(object));
            primitive.insert(kind, idx);
        }
        let null = add(TypeDef::extension(&ns, "Null", ExtensionKind::Null).with_base(object));

        builder.well_known = WellKnownTypes {
            object,
            string: primitive[&PrimitiveKind::String],
            boolean: primitive[&PrimitiveKind::Boolean],
            int32: primitive[&PrimitiveKind::Int32],
            double: primitive[&PrimitiveKind::Double],
            null,
        };
        builder
    }

    /// Types every schema carries.
    pub fn well_known(&self) -> WellKnownTypes {
        self.well_known
    }

    /// Register a new assembly.
    pub fn add_assembly(&mut self, name: impl Into<String>) -> AssemblyToken {
        self.assemblies.push(name.into());
        AssemblyToken((self.assemblies.len() - 1) as u32)
    }

    /// Map an xmlns URI (alias) to a type namespace. A URI may map to several.
    pub fn register_namespace(&mut self, uri: impl Into<String>, namespace: &TypeNamespace) {
        let uri = uri.into();
        trace!(uri = %uri, namespace = %namespace, "register xmlns");
        let entry = self.xmlns.entry(uri).or_default();
        if !entry.contains(namespace) {
            entry.push(namespace.clone());
        }
    }

    /// Register a type. Its base, if any, must already be registered.
    pub fn add_type(&mut self, def: TypeDef) -> Result<TypeIndex, SchemaError> {
        let taken = self
            .type_names
            .get(&def.namespace)
            .is_some_and(|names| names.contains_key(&def.name));
        if taken {
            let name = if def.namespace.name.is_empty() {
                def.name
            } else {
                format!("{}.{}", def.namespace.name, def.name)
            };
            return Err(SchemaError::DuplicateType { name });
        }
        Ok(self.insert_type(def))
    }

    fn insert_type(&mut self, def: TypeDef) -> TypeIndex {
        let index = TypeIndex(self.types.len() as u32);
        let base = def.base.map(|b| &self.types[b.slot()]);
        let collection = def
            .collection
            .or_else(|| base.and_then(|b| b.collection.clone()));
        let inherited_content = base.and_then(|b| b.content_property);

        if let Some(name) = def.content_property {
            self.pending_content.push((index, name));
        }
        self.type_names
            .entry(def.namespace.clone())
            .or_default()
            .insert(def.name.clone(), index);
        self.types.push(TypeDescriptor {
            index,
            name: def.name,
            namespace: def.namespace,
            base: def.base,
            kind: def.kind,
            factory: def.factory,
            content_property: inherited_content,
            collection,
            text_syntax: def.text_syntax,
        });
        index
    }

    /// Declare a member on `owner`.
    pub fn add_property(
        &mut self,
        owner: TypeIndex,
        def: PropertyDef,
    ) -> Result<PropertyIndex, SchemaError> {
        let members = self.members.entry(owner).or_default();
        if members.contains_key(&def.name) {
            return Err(SchemaError::DuplicateProperty {
                ty: self.types[owner.slot()].full_name(),
                name: def.name,
            });
        }
        let index = PropertyIndex(self.properties.len() as u32);
        members.insert(def.name.clone(), index);
        self.properties.push(PropertyDescriptor {
            index,
            name: def.name,
            declaring_type: owner,
            value_type: def.value_type,
            attached: def.attached,
            indexable: def.indexable,
            default_value: def.default_value,
            setter: def.setter,
            deferred: def.deferred,
        });
        Ok(index)
    }

    /// Register a named converter for complex literal syntaxes.
    pub fn add_text_syntax<F>(&mut self, name: impl Into<String>, convert: F)
    where
        F: Fn(&str) -> Result<Scalar, String> + Send + Sync + 'static,
    {
        self.text_syntaxes.insert(name.into(), Arc::new(convert));
    }

    /// Register `StaticResource`, `ThemeResource`, `TemplateBinding` and
    /// `Binding` in `namespace`, with their positional members.
    pub fn register_builtin_extensions(
        &mut self,
        namespace: &TypeNamespace,
    ) -> Result<(), SchemaError> {
        let WellKnownTypes { object, string, .. } = self.well_known;
        for (name, kind, positional) in [
            ("StaticResource", ExtensionKind::StaticResource, "ResourceKey"),
            ("ThemeResource", ExtensionKind::ThemeResource, "ResourceKey"),
            ("TemplateBinding", ExtensionKind::TemplateBinding, "Property"),
            ("Binding", ExtensionKind::Binding, "Path"),
        ] {
            let ty = self.add_type(
                TypeDef::extension(namespace, name, kind)
                    .with_base(object)
                    .with_content_property(positional),
            )?;
            self.add_property(ty, PropertyDef::new(positional, string).not_indexable())?;
            if kind == ExtensionKind::Binding {
                for extra in ["ElementName", "Mode", "Converter", "ConverterParameter"] {
                    self.add_property(ty, PropertyDef::new(extra, object).not_indexable())?;
                }
            }
        }
        Ok(())
    }

    /// Freeze the schema.
    pub fn build(mut self) -> Result<Arc<SchemaContext>, SchemaError> {
        for (ty, name) in std::mem::take(&mut self.pending_content) {
            let found = find_member(&self.types, &self.members, ty, &name);
            match found {
                Some(prop) => self.types[ty.slot()].content_property = Some(prop),
                None => {
                    return Err(SchemaError::MissingContentProperty {
                        ty: self.types[ty.slot()].full_name(),
                        name,
                    });
                }
            }
        }
        // Content properties declared on a base after a derived type was added.
        for slot in 0..self.types.len() {
            if self.types[slot].content_property.is_none() {
                let mut base = self.types[slot].base;
                while let Some(b) = base {
                    if let Some(prop) = self.types[b.slot()].content_property {
                        self.types[slot].content_property = Some(prop);
                        break;
                    }
                    base = self.types[b.slot()].base;
                }
            }
        }
        for ty in &self.types {
            if let Some(name) = &ty.text_syntax
                && !self.text_syntaxes.contains_key(name)
            {
                return Err(SchemaError::UnknownTextSyntax { name: name.clone() });
            }
        }

        debug!(
            types = self.types.len(),
            properties = self.properties.len(),
            namespaces = self.xmlns.len(),
            "schema frozen"
        );

        Ok(Arc::new(SchemaContext {
            assemblies: self.assemblies,
            xmlns: self.xmlns,
            types: self.types,
            type_names: self.type_names,
            properties: self.properties,
            members: self.members,
            text_syntaxes: self.text_syntaxes,
            well_known: self.well_known,
            type_cache: RwLock::new(HashMap::new()),
            member_cache: RwLock::new(HashMap::new()),
            qualified_cache: RwLock::new(HashMap::new()),
        }))
    }
}

fn find_member(
    types: &[TypeDescriptor],
    members: &HashMap<TypeIndex, HashMap<String, PropertyIndex>>,
    ty: TypeIndex,
    name: &str,
) -> Option<PropertyIndex> {
    let mut cursor = Some(ty);
    while let Some(current) = cursor {
        if let Some(prop) = members.get(&current).and_then(|m| m.get(name)) {
            return Some(*prop);
        }
        cursor = types[current.slot()].base;
    }
    None
}

/// The frozen schema.
///
/// Resolution results, including misses, are cached for the lifetime of the
/// context. The context is `Send + Sync`; the caches tolerate concurrent
/// readers resolving the same names.
pub struct SchemaContext {
    assemblies: Vec<String>,
    xmlns: HashMap<String, Vec<TypeNamespace>>,
    types: Vec<TypeDescriptor>,
    type_names: HashMap<TypeNamespace, HashMap<String, TypeIndex>>,
    properties: Vec<PropertyDescriptor>,
    members: HashMap<TypeIndex, HashMap<String, PropertyIndex>>,
    text_syntaxes: HashMap<String, TextSyntax>,
    well_known: WellKnownTypes,
    type_cache: RwLock<HashMap<(String, String), Option<TypeIndex>>>,
    member_cache: RwLock<HashMap<(TypeIndex, String), Option<PropertyIndex>>>,
    qualified_cache: RwLock<HashMap<String, Option<PropertyIndex>>>,
}

impl fmt::Debug for SchemaContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaContext")
            .field("assemblies", &self.assemblies)
            .field("types", &self.types.len())
            .field("properties", &self.properties.len())
            .field("xmlns", &self.xmlns.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl SchemaContext {
    /// Types every schema carries.
    pub fn well_known(&self) -> WellKnownTypes {
        self.well_known
    }

    /// Name of a registered assembly.
    pub fn assembly_name(&self, token: AssemblyToken) -> Option<&str> {
        self.assemblies.get(token.0 as usize).map(String::as_str)
    }

    /// Descriptor for a type index handed out by this schema.
    pub fn type_descriptor(&self, ty: TypeIndex) -> &TypeDescriptor {
        &self.types[ty.slot()]
    }

    /// Descriptor for a property index handed out by this schema.
    pub fn property(&self, prop: PropertyIndex) -> &PropertyDescriptor {
        &self.properties[prop.slot()]
    }

    /// `Owner.Name` form of a property, for diagnostics.
    pub fn property_name(&self, prop: PropertyIndex) -> String {
        let p = self.property(prop);
        format!("{}.{}", self.types[p.declaring_type.slot()].name, p.name)
    }

    /// Whether `uri` names a known xmlns (registered or a valid `using:`).
    pub fn is_known_namespace(&self, uri: &str) -> bool {
        !self.type_namespaces(uri).is_empty()
    }

    fn type_namespaces(&self, uri: &str) -> Vec<&TypeNamespace> {
        if let Some(list) = self.xmlns.get(uri) {
            return list.iter().collect();
        }
        match crack_using_xmlns(uri) {
            Some(code_ns) => self
                .type_names
                .keys()
                .filter(|ns| ns.name == code_ns)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Resolve `(namespaceUri, localName)` to a type.
    pub fn resolve_type(&self, uri: &str, name: &str) -> Result<&TypeDescriptor, SchemaError> {
        let key = (uri.to_owned(), name.to_owned());
        let cached = self.type_cache.read().ok().and_then(|c| c.get(&key).copied());
        let found = match cached {
            Some(hit) => hit,
            None => {
                let found = self.type_namespaces(uri).into_iter().find_map(|ns| {
                    self.type_names
                        .get(ns)
                        .and_then(|names| names.get(name))
                        .copied()
                });
                trace!(uri, name, found = ?found, "resolve type");
                if let Ok(mut cache) = self.type_cache.write() {
                    cache.insert(key, found);
                }
                found
            }
        };
        match found {
            Some(ty) => Ok(self.type_descriptor(ty)),
            None if !self.is_known_namespace(uri) => Err(SchemaError::UnknownNamespace {
                uri: uri.to_owned(),
            }),
            None => Err(SchemaError::UnknownType {
                uri: uri.to_owned(),
                name: name.to_owned(),
            }),
        }
    }

    /// Resolve a member by name on `ty` or any of its bases.
    pub fn resolve_property(
        &self,
        ty: TypeIndex,
        name: &str,
    ) -> Result<&PropertyDescriptor, SchemaError> {
        let key = (ty, name.to_owned());
        let cached = self
            .member_cache
            .read()
            .ok()
            .and_then(|c| c.get(&key).copied());
        let found = match cached {
            Some(hit) => hit,
            None => {
                let found = find_member(&self.types, &self.members, ty, name);
                trace!(ty = %ty, name, found = ?found, "resolve member");
                if let Ok(mut cache) = self.member_cache.write() {
                    cache.insert(key, found);
                }
                found
            }
        };
        found
            .map(|p| self.property(p))
            .ok_or_else(|| SchemaError::UnknownProperty {
                ty: self.type_descriptor(ty).full_name(),
                name: name.to_owned(),
            })
    }

    /// Resolve `Owner.Name` as used on an instance of `target`.
    ///
    /// The owner is looked up in `uri`. The member must either be attached or
    /// be declared on a type `target` derives from.
    pub fn resolve_attached_property(
        &self,
        target: TypeIndex,
        uri: &str,
        owner: &str,
        name: &str,
    ) -> Result<&PropertyDescriptor, SchemaError> {
        let owner = self.resolve_type(uri, owner)?;
        let prop = self.resolve_property(owner.index, name)?;
        if prop.attached || self.is_assignable(target, owner.index) {
            Ok(prop)
        } else {
            Err(SchemaError::PropertyNotOnType {
                property: format!("{}.{}", owner.name, name),
                ty: self.type_descriptor(target).full_name(),
            })
        }
    }

    /// Resolve the fully qualified form `[uri]Type.Property`.
    pub fn resolve_qualified_property(
        &self,
        qualified: &str,
    ) -> Result<&PropertyDescriptor, SchemaError> {
        let cached = self
            .qualified_cache
            .read()
            .ok()
            .and_then(|c| c.get(qualified).copied());
        // Misses are recomputed so the caller gets the precise error.
        if let Some(Some(hit)) = cached {
            return Ok(self.property(hit));
        }

        let (uri, ty, name) =
            split_qualified(qualified).ok_or_else(|| SchemaError::InvalidQualifiedName {
                text: qualified.to_owned(),
            })?;
        let result = self
            .resolve_type(uri, ty)
            .and_then(|t| self.resolve_property(t.index, name));
        if let Ok(mut cache) = self.qualified_cache.write() {
            cache.insert(qualified.to_owned(), result.as_ref().ok().map(|p| p.index));
        }
        result
    }

    /// Whether a value of type `value` may be stored where `target` is expected.
    pub fn is_assignable(&self, value: TypeIndex, target: TypeIndex) -> bool {
        if target == self.well_known.object {
            return true;
        }
        let mut cursor = Some(value);
        while let Some(current) = cursor {
            if current == target {
                return true;
            }
            cursor = self.types[current.slot()].base;
        }
        false
    }

    /// Content property of `ty`, inherited from bases.
    pub fn content_property(&self, ty: TypeIndex) -> Option<&PropertyDescriptor> {
        self.type_descriptor(ty)
            .content_property
            .map(|p| self.property(p))
    }

    /// Collection-add capability of `ty`, inherited from bases.
    pub fn collection_info(&self, ty: TypeIndex) -> Option<&CollectionInfo> {
        self.type_descriptor(ty).collection.as_ref()
    }

    /// Whether literals convert into `ty`.
    pub fn can_convert_text(&self, ty: TypeIndex) -> bool {
        ty == self.well_known.object || self.type_descriptor(ty).has_text_conversion()
    }

    /// Convert a literal to `ty` through its declared conversion.
    pub fn convert_text(&self, ty: TypeIndex, text: &str) -> Result<Scalar, ConversionError> {
        let desc = self.type_descriptor(ty);
        let fail = |reason: String| ConversionError {
            target: desc.full_name(),
            text: text.to_owned(),
            reason,
        };
        if let Some(syntax) = &desc.text_syntax {
            let convert = self
                .text_syntaxes
                .get(syntax)
                .ok_or_else(|| fail(format!("text syntax '{syntax}' missing")))?;
            return convert(text).map_err(fail);
        }
        match &desc.kind {
            TypeKind::Primitive(kind) => kind.parse(text).map_err(fail),
            TypeKind::Enum(def) => def
                .parse(text)
                .map(|value| Scalar::Enum { ty, value })
                .map_err(fail),
            _ if ty == self.well_known.object => Ok(Scalar::String(text.to_owned())),
            _ => Err(fail("type has no text conversion".to_owned())),
        }
    }

    /// Render a scalar the way it would be written in markup.
    pub fn format_scalar(&self, value: &Scalar) -> String {
        match value {
            Scalar::Enum { ty, value } => match &self.type_descriptor(*ty).kind {
                TypeKind::Enum(def) => def
                    .name_of(*value)
                    .map(str::to_owned)
                    .unwrap_or_else(|| value.to_string()),
                _ => value.to_string(),
            },
            other => other.to_string(),
        }
    }
}

/// Split `[uri]Type.Property`.
fn split_qualified(text: &str) -> Option<(&str, &str, &str)> {
    let rest = text.strip_prefix('[')?;
    let (uri, member) = rest.split_once(']')?;
    let (ty, name) = member.rsplit_once('.')?;
    if uri.is_empty() || ty.is_empty() || name.is_empty() {
        return None;
    }
    Some((uri, ty, name))
}
