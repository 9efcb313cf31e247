//! The constructed object graph.
//!
//! Objects live in an arena and refer to each other by [`ObjectId`]. Values
//! owned by another graph (realized deferred elements, resources captured into
//! a saved context) are referenced through an [`ElementRef`], which pairs the
//! owning graph with an id.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use xaml_schema::{PropertyIndex, Scalar, TypeIndex};

use crate::event::SourcePosition;
use crate::saved::{DeferredElementCreator, TemplateContent};

/// Index of an object in its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, facet::Facet)]
pub struct ObjectId(pub u32);

impl ObjectId {
    fn slot(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A property value, collection item or resource.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Explicit null, or the placeholder for a faulted subtree.
    Null,
    /// A converted literal.
    Scalar(Scalar),
    /// An object in the same graph.
    Object(ObjectId),
    /// An object owned by another graph.
    Element(ElementRef),
    /// A binding-like expression evaluated later by the runtime.
    Expression(Expression),
    /// Recorded content constructed on demand.
    Template(TemplateRef),
}

impl Value {
    /// A string scalar.
    pub fn string(s: impl Into<String>) -> Self {
        Value::Scalar(Scalar::String(s.into()))
    }

    /// The object id, if this is an object of the same graph.
    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            Value::Object(id) => Some(*id),
            _ => None,
        }
    }

    /// The scalar, if this is a literal.
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Value::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Returns true for `Value::Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// Expressions produced by markup extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    /// `{Binding}`; `ElementName` is resolved by the runtime.
    Binding {
        /// Property path.
        path: Option<String>,
        /// Source element name.
        element_name: Option<String>,
        /// Binding mode, unparsed.
        mode: Option<String>,
    },
    /// `{TemplateBinding}` to a property of the templated parent.
    TemplateBinding {
        /// Source property name.
        property: String,
    },
}

/// A reference to an object owned by another graph.
#[derive(Clone)]
pub struct ElementRef {
    graph: Arc<ObjectGraph>,
    id: ObjectId,
}

impl ElementRef {
    /// Pair a graph with one of its objects.
    pub fn new(graph: Arc<ObjectGraph>, id: ObjectId) -> Self {
        Self { graph, id }
    }

    /// The owning graph.
    pub fn graph(&self) -> &Arc<ObjectGraph> {
        &self.graph
    }

    /// The object's id in the owning graph.
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// The referenced object.
    pub fn node(&self) -> &ObjectNode {
        self.graph.node(self.id)
    }
}

impl PartialEq for ElementRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.graph, &other.graph) && self.id == other.id
    }
}

impl fmt::Debug for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementRef")
            .field("graph", &Arc::as_ptr(&self.graph))
            .field("id", &self.id)
            .finish()
    }
}

/// Shared handle to recorded template content.
#[derive(Clone)]
pub struct TemplateRef(pub Arc<TemplateContent>);

impl PartialEq for TemplateRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for TemplateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TemplateRef({} events)", self.0.events().len())
    }
}

/// A collection item.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    /// The item value.
    pub value: Value,
    /// Its `x:Key`, for keyed collections.
    pub key: Option<String>,
}

/// One constructed object.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectNode {
    /// Its type; `None` only for the default node.
    pub ty: Option<TypeIndex>,
    /// Property assignments in assignment order.
    pub properties: Vec<(PropertyIndex, Value)>,
    /// Collection items in insertion order; keyed for dictionaries.
    pub items: Vec<Item>,
    /// `x:Name`, if any.
    pub name: Option<String>,
    /// `x:Uid`, if any.
    pub uid: Option<String>,
    /// Where the object element started.
    pub position: Option<SourcePosition>,
}

impl ObjectNode {
    /// Value assigned to `property`, if any.
    pub fn get(&self, property: PropertyIndex) -> Option<&Value> {
        self.properties
            .iter()
            .find(|(p, _)| *p == property)
            .map(|(_, v)| v)
    }

    /// Item stored under `key`.
    pub fn entry(&self, key: &str) -> Option<&Value> {
        self.items
            .iter()
            .find(|item| item.key.as_deref() == Some(key))
            .map(|item| &item.value)
    }
}

/// A `{TemplateBinding}` recorded against the object that received it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateBindingRecord {
    /// Object holding the binding.
    pub target: ObjectId,
    /// Property holding the binding.
    pub property: PropertyIndex,
    /// Templated-parent property it reads.
    pub source: String,
}

/// A `{ThemeResource}` assignment, kept so the value can be refreshed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThemeReference {
    /// Object holding the value.
    pub target: ObjectId,
    /// Property holding the value.
    pub property: PropertyIndex,
    /// Resource key.
    pub key: String,
}

/// Where a deferred element would have been attached.
#[derive(Clone)]
pub struct DeferredPlaceholder {
    /// Object that declared the element.
    pub parent: Option<ObjectId>,
    /// Member the element was written in; `None` for implicit content.
    pub property: Option<PropertyIndex>,
    /// Names registered for the element.
    pub names: Vec<String>,
    /// Creator that realizes it.
    pub creator: Arc<DeferredElementCreator>,
}

impl fmt::Debug for DeferredPlaceholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredPlaceholder")
            .field("parent", &self.parent)
            .field("property", &self.property)
            .field("names", &self.names)
            .finish_non_exhaustive()
    }
}

/// Property storage collaborator.
pub trait PropertySystem {
    /// Current value of `property` on `object`.
    fn get_value(&self, object: ObjectId, property: PropertyIndex) -> Option<&Value>;
    /// Assign `property`, replacing any previous value.
    fn set_value(&mut self, object: ObjectId, property: PropertyIndex, value: Value);
    /// Remove a local value, returning it.
    fn clear_value(&mut self, object: ObjectId, property: PropertyIndex) -> Option<Value>;
}

/// An arena of constructed objects.
#[derive(Debug, Clone, Default)]
pub struct ObjectGraph {
    nodes: Vec<ObjectNode>,
    template_bindings: Vec<TemplateBindingRecord>,
    theme_references: Vec<ThemeReference>,
    deferred: Vec<DeferredPlaceholder>,
}

impl ObjectGraph {
    /// An empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an object of type `ty`.
    pub fn add(&mut self, ty: TypeIndex, position: Option<SourcePosition>) -> ObjectId {
        let id = ObjectId(self.nodes.len() as u32);
        self.nodes.push(ObjectNode {
            ty: Some(ty),
            position,
            ..ObjectNode::default()
        });
        id
    }

    /// Number of objects.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if no object was allocated.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The object with the given id.
    pub fn node(&self, id: ObjectId) -> &ObjectNode {
        &self.nodes[id.slot()]
    }

    pub(crate) fn node_mut(&mut self, id: ObjectId) -> &mut ObjectNode {
        &mut self.nodes[id.slot()]
    }

    /// All objects with their ids, in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &ObjectNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (ObjectId(i as u32), node))
    }

    /// First object carrying `x:Name="name"`.
    pub fn find_by_name(&self, name: &str) -> Option<ObjectId> {
        self.iter()
            .find(|(_, node)| node.name.as_deref() == Some(name))
            .map(|(id, _)| id)
    }

    /// Append a collection item.
    pub fn add_item(&mut self, collection: ObjectId, item: Item) {
        self.node_mut(collection).items.push(item);
    }

    /// Recorded `{TemplateBinding}`s.
    pub fn template_bindings(&self) -> &[TemplateBindingRecord] {
        &self.template_bindings
    }

    /// Recorded `{ThemeResource}` assignments.
    pub fn theme_references(&self) -> &[ThemeReference] {
        &self.theme_references
    }

    /// Elements whose construction was deferred.
    pub fn deferred_elements(&self) -> &[DeferredPlaceholder] {
        &self.deferred
    }

    pub(crate) fn record_template_binding(&mut self, record: TemplateBindingRecord) {
        self.template_bindings.push(record);
    }

    pub(crate) fn record_theme_reference(&mut self, reference: ThemeReference) {
        self.theme_references.push(reference);
    }

    pub(crate) fn record_deferred(&mut self, placeholder: DeferredPlaceholder) {
        self.deferred.push(placeholder);
    }

    /// Copy the subgraph reachable from `root` into a graph of its own.
    ///
    /// Returns the new graph and the id `root` maps to in it.
    pub fn extract(&self, root: ObjectId) -> (ObjectGraph, ObjectId) {
        let mut out = ObjectGraph::new();
        let mut remap = HashMap::new();
        let new_root = self.copy_into(root, &mut out, &mut remap);
        (out, new_root)
    }

    fn copy_into(
        &self,
        id: ObjectId,
        out: &mut ObjectGraph,
        remap: &mut HashMap<ObjectId, ObjectId>,
    ) -> ObjectId {
        if let Some(done) = remap.get(&id) {
            return *done;
        }
        let new_id = ObjectId(out.nodes.len() as u32);
        remap.insert(id, new_id);
        out.nodes.push(ObjectNode::default());

        let node = self.node(id);
        let mut copy = ObjectNode {
            ty: node.ty,
            properties: Vec::with_capacity(node.properties.len()),
            items: Vec::with_capacity(node.items.len()),
            name: node.name.clone(),
            uid: node.uid.clone(),
            position: node.position,
        };
        for (prop, value) in &node.properties {
            let value = self.copy_value(value, out, remap);
            copy.properties.push((*prop, value));
        }
        for item in &node.items {
            let value = self.copy_value(&item.value, out, remap);
            copy.items.push(Item {
                value,
                key: item.key.clone(),
            });
        }
        out.nodes[new_id.slot()] = copy;
        new_id
    }

    fn copy_value(
        &self,
        value: &Value,
        out: &mut ObjectGraph,
        remap: &mut HashMap<ObjectId, ObjectId>,
    ) -> Value {
        match value {
            Value::Object(child) => Value::Object(self.copy_into(*child, out, remap)),
            other => other.clone(),
        }
    }

    /// Structural equality of two subtrees: types, names, property values,
    /// items and keys, recursing through objects of either graph.
    pub fn same_shape(&self, id: ObjectId, other: &ObjectGraph, other_id: ObjectId) -> bool {
        let (a, b) = (self.node(id), other.node(other_id));
        a.ty == b.ty
            && a.name == b.name
            && a.uid == b.uid
            && a.properties.len() == b.properties.len()
            && a.items.len() == b.items.len()
            && a.properties
                .iter()
                .zip(&b.properties)
                .all(|((pa, va), (pb, vb))| pa == pb && self.same_value(va, other, vb))
            && a.items
                .iter()
                .zip(&b.items)
                .all(|(ia, ib)| ia.key == ib.key && self.same_value(&ia.value, other, &ib.value))
    }

    fn same_value(&self, a: &Value, other: &ObjectGraph, b: &Value) -> bool {
        match (a, b) {
            (Value::Object(x), Value::Object(y)) => self.same_shape(*x, other, *y),
            (Value::Element(x), Value::Element(y)) => {
                x.graph().same_shape(x.id(), y.graph(), y.id())
            }
            (Value::Template(x), Value::Template(y)) => x.0.events() == y.0.events(),
            (Value::Scalar(Scalar::Float(x)), Value::Scalar(Scalar::Float(y))) => {
                x == y || (x.is_nan() && y.is_nan())
            }
            _ => a == b,
        }
    }
}

impl PropertySystem for ObjectGraph {
    fn get_value(&self, object: ObjectId, property: PropertyIndex) -> Option<&Value> {
        self.node(object).get(property)
    }

    fn set_value(&mut self, object: ObjectId, property: PropertyIndex, value: Value) {
        let node = self.node_mut(object);
        match node.properties.iter_mut().find(|(p, _)| *p == property) {
            Some((_, slot)) => *slot = value,
            None => node.properties.push((property, value)),
        }
    }

    fn clear_value(&mut self, object: ObjectId, property: PropertyIndex) -> Option<Value> {
        let node = self.node_mut(object);
        let at = node.properties.iter().position(|(p, _)| *p == property)?;
        Some(node.properties.remove(at).1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facet_testhelpers::test;

    #[test]
    fn property_system_round_trip() {
        let mut g = ObjectGraph::new();
        let a = g.add(TypeIndex(1), None);
        let (p, q) = (PropertyIndex(0), PropertyIndex(1));
        g.set_value(a, p, Value::string("one"));
        g.set_value(a, q, Value::Null);
        g.set_value(a, p, Value::string("two"));
        assert_eq!(g.get_value(a, p), Some(&Value::string("two")));
        assert_eq!(g.node(a).properties[0].0, p);
        assert_eq!(g.clear_value(a, p), Some(Value::string("two")));
        assert_eq!(g.get_value(a, p), None);
        assert_eq!(g.clear_value(a, p), None);
    }

    #[test]
    fn extract_copies_reachable_objects_only() {
        let mut g = ObjectGraph::new();
        let unrelated = g.add(TypeIndex(9), None);
        let root = g.add(TypeIndex(1), None);
        let child = g.add(TypeIndex(2), None);
        g.set_value(root, PropertyIndex(0), Value::Object(child));
        g.add_item(root, Item { value: Value::Object(child), key: None });
        g.node_mut(child).name = Some("kid".into());

        let (copy, new_root) = g.extract(root);
        assert_eq!(copy.len(), 2);
        assert!(g.same_shape(root, &copy, new_root));
        assert!(!g.same_shape(unrelated, &copy, new_root));
        assert!(copy.find_by_name("kid").is_some());
    }
}
