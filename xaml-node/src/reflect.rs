//! Render any `Facet` value as an element, for diagnostics dumps.

use facet_core::{Def, Facet, StructKind};
use facet_reflect::{HasFields as _, Peek};
use xaml_writer::XamlError;

use crate::{Content, Element};

/// Render a reflected value: scalar fields become attributes, nested
/// structs and lists become child elements, `None` fields are omitted.
pub fn reflect_element<T>(value: &T) -> Element
where
    T: Facet<'static>,
{
    let peek = Peek::new(value);
    let mut element = Element::new(peek.shape().type_identifier);
    fill(&mut element, peek);
    element
}

/// One `<XamlError .../>` child per diagnostic, in report order.
pub fn diagnostics(errors: &[XamlError]) -> Element {
    errors
        .iter()
        .fold(Element::new("Diagnostics"), |root, error| {
            root.with_child(reflect_element(error))
        })
}

fn fill(element: &mut Element, value: Peek<'_, '_>) {
    let Some(value) = unwrap_option(value) else {
        return;
    };
    if let Some(text) = scalar_text(value) {
        element.children.push(Content::Text(text));
        return;
    }
    if let Ok(struct_) = value.into_struct() {
        for (field, field_value) in struct_.fields_for_serialize() {
            let Some(field_value) = unwrap_option(field_value) else {
                continue;
            };
            let name = field.effective_name();
            match scalar_text(field_value) {
                Some(text) => element.set_attr(name, text),
                None => {
                    let mut child = Element::new(name);
                    fill(&mut child, field_value);
                    element.children.push(Content::Element(child));
                }
            }
        }
        return;
    }
    if let Ok(list) = value.into_list_like() {
        for item in list.iter() {
            let mut child = Element::new(item.shape().type_identifier);
            fill(&mut child, item);
            element.children.push(Content::Element(child));
        }
    }
}

/// `None` for an empty option, the inner value for `Some`, else `value`.
fn unwrap_option<'mem, 'facet>(value: Peek<'mem, 'facet>) -> Option<Peek<'mem, 'facet>> {
    match value.shape().def {
        Def::Option(_) => value.into_option().ok()?.value(),
        _ => Some(value),
    }
}

fn scalar_text(value: Peek<'_, '_>) -> Option<String> {
    if let Ok(enum_) = value.into_enum()
        && let Ok(variant) = enum_.active_variant()
        && variant.data.kind == StructKind::Unit
    {
        return Some(variant.name.to_owned());
    }
    if matches!(value.shape().def, Def::Scalar) && value.shape().vtable.has_display() {
        return Some(value.to_string());
    }
    None
}
