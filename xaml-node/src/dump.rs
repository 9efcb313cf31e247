//! Render constructed object graphs as element trees.

use xaml_schema::{SYSTEM_NAMESPACE, Scalar, SchemaContext, TypeIndex};
use xaml_writer::{Expression, ObjectGraph, ObjectId, ObjectTree, Value};

use crate::{Attribute, Element};

/// Render `tree` as markup-shaped elements.
///
/// Scalar, null and expression values become attributes; object values
/// become property elements (`Type.Member`); collection items become child
/// elements carrying `x:Key` when keyed. Recorded templates render as
/// `<x:Template Events="n"/>` and unloaded deferred elements as
/// `<x:Deferred Names="..."/>` under their parent.
pub fn to_element(tree: &ObjectTree, schema: &SchemaContext) -> Element {
    Dumper { schema }.value(&tree.graph, &tree.root)
}

struct Dumper<'s> {
    schema: &'s SchemaContext,
}

impl Dumper<'_> {
    fn value(&self, graph: &ObjectGraph, value: &Value) -> Element {
        match value {
            Value::Object(id) => self.object(graph, *id),
            Value::Element(element) => self.object(element.graph(), element.id()),
            Value::Scalar(scalar) => self.scalar(scalar),
            Value::Null => Element::new("x:Null"),
            Value::Expression(expr) => Element::new("x:Expression").with_text(expression_text(expr)),
            Value::Template(template) => {
                Element::new("x:Template").with_attr("Events", template.0.events().len().to_string())
            }
        }
    }

    fn type_tag(&self, ty: TypeIndex) -> String {
        let desc = self.schema.type_descriptor(ty);
        if desc.namespace.name == SYSTEM_NAMESPACE {
            format!("x:{}", desc.name)
        } else {
            desc.name.clone()
        }
    }

    fn scalar(&self, scalar: &Scalar) -> Element {
        let wk = self.schema.well_known();
        let tag = match scalar {
            Scalar::Bool(_) => self.type_tag(wk.boolean),
            Scalar::Int(_) => self.type_tag(wk.int32),
            Scalar::Float(_) => self.type_tag(wk.double),
            Scalar::Enum { ty, .. } => self.type_tag(*ty),
            Scalar::Char(_) | Scalar::String(_) | Scalar::Composite(_) => self.type_tag(wk.string),
        };
        Element::new(tag).with_text(self.schema.format_scalar(scalar))
    }

    fn attribute_text(&self, value: &Value) -> Option<String> {
        match value {
            Value::Scalar(scalar) => Some(self.schema.format_scalar(scalar)),
            Value::Null => Some("{x:Null}".to_owned()),
            Value::Expression(expr) => Some(expression_text(expr)),
            _ => None,
        }
    }

    fn object(&self, graph: &ObjectGraph, id: ObjectId) -> Element {
        let node = graph.node(id);
        let tag = node.ty.map_or_else(|| "x:Object".to_owned(), |ty| self.type_tag(ty));
        let mut element = Element::new(tag.clone());
        if let Some(name) = &node.name {
            element.set_attr("x:Name", name);
        }
        if let Some(uid) = &node.uid {
            element.set_attr("x:Uid", uid);
        }

        for (prop, value) in &node.properties {
            let desc = self.schema.property(*prop);
            let member = if desc.attached {
                self.schema.property_name(*prop)
            } else {
                desc.name.clone()
            };
            match self.attribute_text(value) {
                Some(text) => element.set_attr(member, text),
                None => {
                    let property_tag = if desc.attached {
                        member
                    } else {
                        format!("{tag}.{member}")
                    };
                    element = element
                        .with_child(Element::new(property_tag).with_child(self.value(graph, value)));
                }
            }
        }

        for item in &node.items {
            let mut child = self.value(graph, &item.value);
            if let Some(key) = &item.key {
                child.attrs.insert(
                    0,
                    Attribute {
                        name: "x:Key".to_owned(),
                        value: key.clone(),
                    },
                );
            }
            element = element.with_child(child);
        }

        for placeholder in graph
            .deferred_elements()
            .iter()
            .filter(|p| p.parent == Some(id))
        {
            element = element
                .with_child(Element::new("x:Deferred").with_attr("Names", placeholder.names.join(" ")));
        }
        element
    }
}

/// Markup-extension form of an expression.
fn expression_text(expr: &Expression) -> String {
    match expr {
        Expression::Binding {
            path,
            element_name,
            mode,
        } => {
            let mut parts = Vec::new();
            if let Some(path) = path {
                parts.push(path.clone());
            }
            if let Some(name) = element_name {
                parts.push(format!("ElementName={name}"));
            }
            if let Some(mode) = mode {
                parts.push(format!("Mode={mode}"));
            }
            if parts.is_empty() {
                "{Binding}".to_owned()
            } else {
                format!("{{Binding {}}}", parts.join(", "))
            }
        }
        Expression::TemplateBinding { property } => format!("{{TemplateBinding {property}}}"),
    }
}
