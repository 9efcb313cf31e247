//! Raw markup element trees for [`xaml_writer`].
//!
//! An [`Element`] is markup without a schema: a tag, attributes in document
//! order and child content. [`ElementEventSource`] walks such a tree and emits
//! the node events an [`ObjectWriter`](xaml_writer::ObjectWriter) consumes;
//! [`to_element`] renders a constructed object graph back into a tree so
//! tests can compare structure as text.

mod dump;
mod reflect;
mod source;

pub use dump::to_element;
pub use reflect::{diagnostics, reflect_element};
pub use source::{ElementEventSource, ElementSourceError, from_element};

/// One attribute of an element, `name="value"`.
#[derive(Debug, Clone, PartialEq, Eq, facet::Facet)]
pub struct Attribute {
    /// Attribute name, possibly prefixed (`x:Name`).
    pub name: String,
    /// Raw attribute text.
    pub value: String,
}

/// Content that can appear inside an element - either child elements or text.
#[derive(Debug, Clone, PartialEq, Eq, facet::Facet)]
#[repr(u8)]
pub enum Content {
    /// Text content.
    Text(String),
    /// A child element.
    Element(Element),
}

impl Content {
    /// Returns `Some(&str)` if this is text content.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text(t) => Some(t),
            _ => None,
        }
    }

    /// Returns `Some(&Element)` if this is an element.
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Content::Element(e) => Some(e),
            _ => None,
        }
    }
}

/// A markup element with any tag, attributes and children.
#[derive(Debug, Clone, PartialEq, Eq, Default, facet::Facet)]
pub struct Element {
    /// The tag, possibly prefixed (`x:String`) or a property element
    /// (`Page.Resources`).
    pub tag: String,

    /// Attributes in document order.
    pub attrs: Vec<Attribute>,

    /// Child content (elements and text).
    #[facet(recursive_type)]
    pub children: Vec<Content>,
}

impl Element {
    /// Create a new element with just a tag name.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Add an attribute, replacing an existing one of the same name.
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Set an attribute in place.
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let (name, value) = (name.into(), value.into());
        match self.attrs.iter_mut().find(|a| a.name == name) {
            Some(attr) => attr.value = value,
            None => self.attrs.push(Attribute { name, value }),
        }
    }

    /// Add a child element.
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Content::Element(child));
        self
    }

    /// Add text content.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Content::Text(text.into()));
        self
    }

    /// Get an attribute value by name.
    pub fn get_attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Iterate over child elements (skipping text nodes).
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|c| c.as_element())
    }

    /// The first child element with the given tag.
    pub fn child(&self, tag: &str) -> Option<&Element> {
        self.child_elements().find(|e| e.tag == tag)
    }

    /// Get the combined text content (concatenated from all text children).
    pub fn text_content(&self) -> String {
        let mut result = String::new();
        for child in &self.children {
            match child {
                Content::Text(t) => result.push_str(t),
                Content::Element(e) => result.push_str(&e.text_content()),
            }
        }
        result
    }

    /// Render as indented markup, one element per line.
    ///
    /// An element whose only child is text stays on one line; empty elements
    /// self-close.
    pub fn to_markup(&self) -> String {
        let mut out = String::new();
        self.write_markup(&mut out, 0);
        out
    }

    fn write_markup(&self, out: &mut String, depth: usize) {
        indent(out, depth);
        out.push('<');
        out.push_str(&self.tag);
        for attr in &self.attrs {
            out.push(' ');
            out.push_str(&attr.name);
            out.push_str("=\"");
            out.push_str(&escape(&attr.value));
            out.push('"');
        }
        match self.children.as_slice() {
            [] => out.push_str("/>\n"),
            [Content::Text(text)] => {
                out.push('>');
                out.push_str(&escape(text));
                close_tag(out, &self.tag);
            }
            children => {
                out.push_str(">\n");
                for child in children {
                    match child {
                        Content::Text(text) => {
                            indent(out, depth + 1);
                            out.push_str(&escape(text));
                            out.push('\n');
                        }
                        Content::Element(e) => e.write_markup(out, depth + 1),
                    }
                }
                indent(out, depth);
                close_tag(out, &self.tag);
            }
        }
    }
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}

fn close_tag(out: &mut String, tag: &str) {
    out.push_str("</");
    out.push_str(tag);
    out.push_str(">\n");
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

impl From<Element> for Content {
    fn from(e: Element) -> Self {
        Content::Element(e)
    }
}

impl From<String> for Content {
    fn from(s: String) -> Self {
        Content::Text(s)
    }
}

impl From<&str> for Content {
    fn from(s: &str) -> Self {
        Content::Text(s.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facet_testhelpers::test;
    use indoc::indoc;

    #[test]
    fn element_builder_api() {
        let elem = Element::new("Panel")
            .with_attr("Width", "10")
            .with_child(Element::new("TextBlock").with_text("hello world"));

        assert_eq!(elem.tag, "Panel");
        assert_eq!(elem.get_attr("Width"), Some("10"));
        assert_eq!(elem.children.len(), 1);

        let child = elem.child("TextBlock").unwrap();
        assert_eq!(child.text_content(), "hello world");
    }

    #[test]
    fn attributes_keep_order_and_replace_in_place() {
        let elem = Element::new("Border")
            .with_attr("x:Name", "b")
            .with_attr("Width", "1")
            .with_attr("x:Name", "c");
        let names: Vec<_> = elem.attrs.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["x:Name", "Width"]);
        assert_eq!(elem.get_attr("x:Name"), Some("c"));
    }

    #[test]
    fn mixed_text_content() {
        let elem = Element::new("TextBlock")
            .with_text("Hello ")
            .with_child(Element::new("Run").with_text("world"))
            .with_text("!");
        assert_eq!(elem.children[0].as_text(), Some("Hello "));
        assert_eq!(elem.children[1].as_element().unwrap().tag, "Run");
        assert_eq!(elem.text_content(), "Hello world!");
    }

    #[test]
    fn markup_rendering() {
        let elem = Element::new("Panel")
            .with_attr("Tag", "a \"quoted\" <value>")
            .with_child(Element::new("TextBlock").with_text("one & two"))
            .with_child(Element::new("Border"))
            .with_text("tail");
        assert_eq!(
            elem.to_markup(),
            indoc! {r#"
                <Panel Tag="a &quot;quoted&quot; &lt;value&gt;">
                  <TextBlock>one &amp; two</TextBlock>
                  <Border/>
                  tail
                </Panel>
            "#}
        );
    }
}
