//! Event source walking an [`Element`] tree.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use xaml_schema::{SchemaContext, XAML_NAMESPACE, XML_NAMESPACE};
use xaml_writer::{
    ConstructError, Construction, MemberName, WriterSettings, XamlEvent, XamlEventSource,
    XamlValue, construct,
};

use crate::{Content, Element};

/// Markup that cannot be turned into node events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementSourceError {
    /// A prefix used on a tag or attribute has no `xmlns` declaration in scope.
    UndeclaredPrefix {
        /// The prefix (empty for the default namespace).
        prefix: String,
        /// The tag or attribute that used it.
        name: String,
    },
    /// A property element (`Type.Member`) outside an object element.
    MisplacedPropertyElement {
        /// The property element's tag.
        tag: String,
    },
    /// A property element carrying attributes.
    PropertyElementAttributes {
        /// The property element's tag.
        tag: String,
    },
}

impl fmt::Display for ElementSourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementSourceError::UndeclaredPrefix { prefix, name } if prefix.is_empty() => {
                write!(f, "no default xmlns is declared for '{name}'")
            }
            ElementSourceError::UndeclaredPrefix { prefix, name } => {
                write!(f, "xmlns prefix '{prefix}' used by '{name}' is not declared")
            }
            ElementSourceError::MisplacedPropertyElement { tag } => {
                write!(f, "property element '{tag}' must be a child of an object element")
            }
            ElementSourceError::PropertyElementAttributes { tag } => {
                write!(f, "property element '{tag}' cannot have attributes")
            }
        }
    }
}

impl std::error::Error for ElementSourceError {}

/// Construct an object graph from an element tree.
pub fn from_element(
    element: &Element,
    schema: Arc<SchemaContext>,
    settings: WriterSettings,
) -> Result<Construction, ConstructError<ElementSourceError>> {
    let mut source = ElementEventSource::new(element);
    construct(&mut source, schema, settings)
}

/// Walks an element tree and emits node events.
///
/// `xmlns` attributes become `Namespace` events ahead of their element.
/// Directive attributes (`x:` and `xml:` prefixed) are emitted before the
/// element's other attributes, and tags of the form `Type.Member` become
/// property elements.
pub struct ElementEventSource<'a> {
    root: Option<&'a Element>,
    stack: Vec<Frame<'a>>,
    queue: VecDeque<XamlEvent<'a>>,
}

struct Frame<'a> {
    element: &'a Element,
    kind: FrameKind,
    child_idx: usize,
    /// Prefixes declared on this element.
    prefixes: Vec<(&'a str, &'a str)>,
}

#[derive(Clone, Copy, PartialEq)]
enum FrameKind {
    Object,
    Property,
}

impl<'a> ElementEventSource<'a> {
    /// Walk `root` and its descendants.
    pub fn new(root: &'a Element) -> Self {
        Self {
            root: Some(root),
            stack: Vec::new(),
            queue: VecDeque::new(),
        }
    }

    fn lookup(&self, prefix: &str, name: &str) -> Result<&'a str, ElementSourceError> {
        if prefix == "xml" {
            return Ok(XML_NAMESPACE);
        }
        self.stack
            .iter()
            .rev()
            .flat_map(|f| f.prefixes.iter().rev())
            .find(|(p, _)| *p == prefix)
            .map(|(_, uri)| *uri)
            .ok_or_else(|| ElementSourceError::UndeclaredPrefix {
                prefix: prefix.to_owned(),
                name: name.to_owned(),
            })
    }

    fn member_name(&self, name: &'a str) -> Result<MemberName<'a>, ElementSourceError> {
        Ok(match name.split_once(':') {
            Some((prefix, local)) => MemberName::qualified(self.lookup(prefix, name)?, local),
            None => MemberName::local(name),
        })
    }

    fn open(&mut self, element: &'a Element) -> Result<(), ElementSourceError> {
        let (prefix, local) = split_tag(&element.tag);
        if local.contains('.') {
            return self.open_property(element);
        }

        let prefixes: Vec<_> = element
            .attrs
            .iter()
            .filter_map(|a| xmlns_prefix(&a.name).map(|p| (p, a.value.as_str())))
            .collect();
        for (prefix, uri) in &prefixes {
            self.queue.push_back(XamlEvent::Namespace {
                prefix: (*prefix).into(),
                uri: (*uri).into(),
            });
        }
        self.stack.push(Frame {
            element,
            kind: FrameKind::Object,
            child_idx: 0,
            prefixes,
        });

        let namespace = self.lookup(prefix, &element.tag)?;
        self.queue
            .push_back(XamlEvent::start_object(namespace, local));

        let (directives, members): (Vec<_>, Vec<_>) = element
            .attrs
            .iter()
            .filter(|a| xmlns_prefix(&a.name).is_none())
            .partition(|a| {
                a.name
                    .split_once(':')
                    .and_then(|(p, _)| self.lookup(p, &a.name).ok())
                    .is_some_and(|uri| uri == XAML_NAMESPACE || uri == XML_NAMESPACE)
            });
        for attr in directives.into_iter().chain(members) {
            let member = self.member_name(&attr.name)?;
            self.queue.push_back(XamlEvent::StartMember(member));
            self.queue
                .push_back(XamlEvent::Value(XamlValue::from_attribute(attr.value.as_str())));
            self.queue.push_back(XamlEvent::EndMember);
        }
        Ok(())
    }

    fn open_property(&mut self, element: &'a Element) -> Result<(), ElementSourceError> {
        let in_object = self
            .stack
            .last()
            .is_some_and(|f| f.kind == FrameKind::Object);
        if !in_object {
            return Err(ElementSourceError::MisplacedPropertyElement {
                tag: element.tag.clone(),
            });
        }
        if !element.attrs.is_empty() {
            return Err(ElementSourceError::PropertyElementAttributes {
                tag: element.tag.clone(),
            });
        }
        let member = self.member_name(&element.tag)?;
        self.queue.push_back(XamlEvent::StartMember(member));
        self.stack.push(Frame {
            element,
            kind: FrameKind::Property,
            child_idx: 0,
            prefixes: Vec::new(),
        });
        Ok(())
    }
}

impl<'a> XamlEventSource<'a> for ElementEventSource<'a> {
    type Error = ElementSourceError;

    fn next_event(&mut self) -> Result<Option<XamlEvent<'a>>, Self::Error> {
        loop {
            if let Some(event) = self.queue.pop_front() {
                return Ok(Some(event));
            }
            if let Some(root) = self.root.take() {
                self.open(root)?;
                continue;
            }
            let Some(frame) = self.stack.last_mut() else {
                return Ok(None);
            };
            let element: &'a Element = frame.element;
            let child = element.children.get(frame.child_idx);
            frame.child_idx += 1;
            let kind = frame.kind;
            match child {
                Some(Content::Text(text)) => self.queue.push_back(XamlEvent::text(text.as_str())),
                Some(Content::Element(e)) => self.open(e)?,
                None => {
                    self.stack.pop();
                    self.queue.push_back(match kind {
                        FrameKind::Object => XamlEvent::EndObject,
                        FrameKind::Property => XamlEvent::EndMember,
                    });
                }
            }
        }
    }
}

/// `(prefix, local)`; the prefix is empty for unprefixed names.
fn split_tag(tag: &str) -> (&str, &str) {
    tag.split_once(':').unwrap_or(("", tag))
}

/// The declared prefix of an `xmlns` attribute.
fn xmlns_prefix(name: &str) -> Option<&str> {
    match name {
        "xmlns" => Some(""),
        _ => name.strip_prefix("xmlns:"),
    }
}
