//! Node events consumed by the object writer.

use std::borrow::Cow;
use std::fmt;

/// Events emitted by a XAML tokenizer.
///
/// Every object is bracketed by `StartObject`/`EndObject`, every member by
/// `StartMember`/`EndMember`. Values and nested objects inside an object but
/// outside any member are implicit content.
///
/// ```text
/// Namespace { prefix: "", uri: "urn:ui" }
/// StartObject { namespace: "urn:ui", name: "StackPanel" }
///   StartMember(Width)
///     Value(Text("120"))
///   EndMember
///   StartObject { namespace: "urn:ui", name: "Button" }
///   EndObject
/// EndObject
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum XamlEvent<'a> {
    /// An xmlns declaration, attached to the next object.
    Namespace {
        /// The prefix; empty for the default namespace.
        prefix: Cow<'a, str>,
        /// The namespace URI.
        uri: Cow<'a, str>,
    },

    /// Start of an object element.
    StartObject {
        /// Namespace URI the type name is resolved in.
        namespace: Cow<'a, str>,
        /// Local type name.
        name: Cow<'a, str>,
    },

    /// Start of a member of the current object.
    StartMember(MemberName<'a>),

    /// A literal or markup extension value.
    Value(XamlValue<'a>),

    /// End of the current member.
    EndMember,

    /// End of the current object.
    EndObject,
}

impl<'a> XamlEvent<'a> {
    /// Shorthand for a `StartObject` event.
    pub fn start_object(namespace: impl Into<Cow<'a, str>>, name: impl Into<Cow<'a, str>>) -> Self {
        XamlEvent::StartObject {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Shorthand for a `StartMember` event on the current object's type.
    pub fn start_member(name: impl Into<Cow<'a, str>>) -> Self {
        XamlEvent::StartMember(MemberName::local(name))
    }

    /// Shorthand for a literal `Value` event.
    pub fn text(text: impl Into<Cow<'a, str>>) -> Self {
        XamlEvent::Value(XamlValue::Text(text.into()))
    }

    /// Shorthand for a markup extension `Value` event.
    pub fn extension(text: impl Into<Cow<'a, str>>) -> Self {
        XamlEvent::Value(XamlValue::Extension(text.into()))
    }

    /// Detach from the input buffer.
    pub fn into_owned(self) -> XamlEvent<'static> {
        match self {
            XamlEvent::Namespace { prefix, uri } => XamlEvent::Namespace {
                prefix: Cow::Owned(prefix.into_owned()),
                uri: Cow::Owned(uri.into_owned()),
            },
            XamlEvent::StartObject { namespace, name } => XamlEvent::StartObject {
                namespace: Cow::Owned(namespace.into_owned()),
                name: Cow::Owned(name.into_owned()),
            },
            XamlEvent::StartMember(member) => XamlEvent::StartMember(member.into_owned()),
            XamlEvent::Value(value) => XamlEvent::Value(value.into_owned()),
            XamlEvent::EndMember => XamlEvent::EndMember,
            XamlEvent::EndObject => XamlEvent::EndObject,
        }
    }

    /// Returns true for `StartObject` and `StartMember`.
    pub fn opens_scope(&self) -> bool {
        matches!(self, XamlEvent::StartObject { .. } | XamlEvent::StartMember(_))
    }

    /// Returns true for `EndObject` and `EndMember`.
    pub fn closes_scope(&self) -> bool {
        matches!(self, XamlEvent::EndObject | XamlEvent::EndMember)
    }
}

/// The name of a member as it appears in markup.
///
/// `name` is either a plain member name (`Width`), an owner-qualified name
/// (`Grid.Row`) or a fully qualified name (`[urn:ui]Grid.Row`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberName<'a> {
    /// Namespace URI of the member, when written with a prefix.
    pub namespace: Option<Cow<'a, str>>,
    /// The member name.
    pub name: Cow<'a, str>,
}

impl<'a> MemberName<'a> {
    /// A member without a namespace.
    pub fn local(name: impl Into<Cow<'a, str>>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }

    /// A member written with a namespace prefix.
    pub fn qualified(namespace: impl Into<Cow<'a, str>>, name: impl Into<Cow<'a, str>>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    /// Detach from the input buffer.
    pub fn into_owned(self) -> MemberName<'static> {
        MemberName {
            namespace: self.namespace.map(|ns| Cow::Owned(ns.into_owned())),
            name: Cow::Owned(self.name.into_owned()),
        }
    }
}

impl fmt::Display for MemberName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Payload of a `Value` event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum XamlValue<'a> {
    /// A literal, converted through the target type.
    Text(Cow<'a, str>),
    /// A markup extension expression, braces included.
    Extension(Cow<'a, str>),
}

impl<'a> XamlValue<'a> {
    /// Classify an attribute value.
    ///
    /// `{...}` is an extension. A leading `{}` escapes the rest as a literal.
    pub fn from_attribute(text: impl Into<Cow<'a, str>>) -> Self {
        let text = text.into();
        if text.starts_with("{}") {
            return XamlValue::Text(match text {
                Cow::Borrowed(s) => Cow::Borrowed(&s[2..]),
                Cow::Owned(s) => Cow::Owned(s[2..].to_owned()),
            });
        }
        if text.trim_start().starts_with('{') {
            XamlValue::Extension(text)
        } else {
            XamlValue::Text(text)
        }
    }

    /// The raw text of the value.
    pub fn as_str(&self) -> &str {
        match self {
            XamlValue::Text(s) | XamlValue::Extension(s) => s,
        }
    }

    /// Detach from the input buffer.
    pub fn into_owned(self) -> XamlValue<'static> {
        match self {
            XamlValue::Text(s) => XamlValue::Text(Cow::Owned(s.into_owned())),
            XamlValue::Extension(s) => XamlValue::Extension(Cow::Owned(s.into_owned())),
        }
    }
}

/// Approximate location of an event in the markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, facet::Facet)]
pub struct SourcePosition {
    /// One-based line.
    pub line: u32,
    /// One-based column.
    pub column: u32,
}

impl SourcePosition {
    /// Create a position.
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// An event detached from its input, with the position it was read at.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordedEvent {
    /// The event.
    pub event: XamlEvent<'static>,
    /// Where it was read.
    pub position: Option<SourcePosition>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use facet_testhelpers::test;

    #[test]
    fn attribute_classification() {
        assert_eq!(
            XamlValue::from_attribute("{StaticResource Brush}"),
            XamlValue::Extension("{StaticResource Brush}".into())
        );
        assert_eq!(XamlValue::from_attribute("Red"), XamlValue::Text("Red".into()));
        assert_eq!(
            XamlValue::from_attribute("{}{literal}"),
            XamlValue::Text("{literal}".into())
        );
        assert_eq!(
            XamlValue::from_attribute(String::from("{}x")),
            XamlValue::Text("x".into())
        );
    }

    #[test]
    fn owned_events_compare_equal() {
        let text = String::from("Button");
        let borrowed = XamlEvent::start_object("urn:ui", text.as_str());
        let owned = borrowed.clone().into_owned();
        drop(text);
        assert_eq!(owned, XamlEvent::start_object("urn:ui", "Button"));
        assert!(owned.opens_scope());
        assert!(XamlEvent::EndMember.closes_scope());
    }
}
