//! The writer stack: one construction frame per open object element.

use xaml_schema::{Directive, PropertyIndex, TypeIndex};

use crate::error::{FatalError, XamlError};
use crate::event::{RecordedEvent, SourcePosition};
use crate::extension::ExtensionCall;
use crate::graph::{Item, ObjectId, Value};

/// What a frame is building.
#[derive(Debug, Clone, PartialEq)]
pub enum Instance {
    /// Not created yet; directives may still redirect construction.
    Pending,
    /// An object in the graph under construction.
    Object(ObjectId),
    /// A primitive-factory type collecting its initialization text.
    Text(String),
    /// A markup extension element collecting its arguments.
    Extension(ExtensionCall),
    /// A frame restored from a saved context; it receives nothing.
    Captured,
    /// Creation failed or the type was unknown.
    Faulted,
}

/// Where values of the open member go.
#[derive(Debug, Clone, PartialEq)]
pub enum MemberTarget {
    /// A resolved property.
    Property(PropertyIndex),
    /// A writer directive.
    Directive(Directive),
    /// A language member the writer accepts and ignores (`x:Class`, ...).
    Ignored(String),
    /// An argument of a markup extension element.
    ExtensionArg(String),
}

/// Whether the open member takes one value or accumulates items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberMode {
    /// One value, assigned at `EndMember`.
    Scalar,
    /// Items, assigned as one collection at `EndMember`.
    Collection,
}

/// The member currently being populated on a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveMember {
    /// Destination.
    pub target: MemberTarget,
    /// Scalar or collection.
    pub mode: MemberMode,
    /// Opened by implicit content rather than by `StartMember`.
    pub implicit: bool,
    /// Scalar mode: the value waiting for assignment.
    pub held: Option<Value>,
    /// Collection mode: accumulated items, in input order.
    pub items: Vec<Item>,
    /// Collection mode: an explicit collection object written as the value.
    pub explicit_collection: Option<Value>,
}

impl ActiveMember {
    /// A member opened for `target`.
    pub fn new(target: MemberTarget, mode: MemberMode, implicit: bool) -> Self {
        Self {
            target,
            mode,
            implicit,
            held: None,
            items: Vec::new(),
            explicit_collection: None,
        }
    }

    /// The property, if the target is one.
    pub fn property(&self) -> Option<PropertyIndex> {
        match self.target {
            MemberTarget::Property(p) => Some(p),
            _ => None,
        }
    }
}

/// One open object element.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Resolved type; `None` when resolution failed.
    pub ty: Option<TypeIndex>,
    /// Namespace URI the type was resolved in.
    pub xmlns: String,
    /// The object under construction.
    pub instance: Instance,
    /// The open member, if any.
    pub member: Option<ActiveMember>,
    /// Whitespace in text content is significant.
    pub preserve_space: bool,
    /// The content property was written as an explicit member.
    pub content_explicit: bool,
    /// Implicit content was assigned to the content property.
    pub content_implicit: bool,
    /// Properties assigned so far.
    pub assigned: Vec<PropertyIndex>,
    /// `x:Name`
    pub name: Option<String>,
    /// `x:Key`
    pub key: Option<String>,
    /// `x:Uid`
    pub uid: Option<String>,
    /// xmlns declarations attached to this element.
    pub namespaces: Vec<(String, String)>,
    /// Where the element started.
    pub position: Option<SourcePosition>,
    /// Events received while the instance is pending.
    pub pending: Vec<RecordedEvent>,
}

impl Frame {
    fn new(ty: Option<TypeIndex>, xmlns: String, preserve_space: bool) -> Self {
        Self {
            ty,
            xmlns,
            instance: Instance::Pending,
            member: None,
            preserve_space,
            content_explicit: false,
            content_implicit: false,
            assigned: Vec::new(),
            name: None,
            key: None,
            uid: None,
            namespaces: Vec::new(),
            position: None,
            pending: Vec::new(),
        }
    }

    /// The object id, once created.
    pub fn object(&self) -> Option<ObjectId> {
        match self.instance {
            Instance::Object(id) => Some(id),
            _ => None,
        }
    }

    /// Returns true if the frame is being skipped.
    pub fn is_faulted(&self) -> bool {
        matches!(self.instance, Instance::Faulted)
    }

    /// A copy that keeps the resolution context (type, xmlns, namespace
    /// prefixes, space preservation) and drops everything tied to the graph.
    pub fn captured(&self) -> Frame {
        Frame {
            instance: Instance::Captured,
            namespaces: self.namespaces.clone(),
            position: self.position,
            ..Frame::new(self.ty, self.xmlns.clone(), self.preserve_space)
        }
    }
}

/// Stack of construction frames.
#[derive(Debug, Clone, Default)]
pub struct WriterStack {
    frames: Vec<Frame>,
    root_preserve_space: bool,
}

impl WriterStack {
    /// An empty stack whose first frame gets `preserve_space`.
    pub fn new(preserve_space: bool) -> Self {
        Self {
            frames: Vec::new(),
            root_preserve_space: preserve_space,
        }
    }

    /// Restore a captured frame sequence.
    pub fn from_snapshot(frames: Vec<Frame>, preserve_space: bool) -> Self {
        Self {
            frames,
            root_preserve_space: preserve_space,
        }
    }

    /// Push a frame for `ty`, inheriting space preservation from the top.
    pub fn push(&mut self, ty: Option<TypeIndex>, xmlns: impl Into<String>) -> &mut Frame {
        let preserve = self
            .frames
            .last()
            .map_or(self.root_preserve_space, |f| f.preserve_space);
        self.frames.push(Frame::new(ty, xmlns.into(), preserve));
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    /// Pop the top frame. Popping an empty stack is an internal defect.
    pub fn pop(&mut self) -> Result<Frame, FatalError> {
        self.frames
            .pop()
            .ok_or_else(|| FatalError(XamlError::stack("pop on an empty writer stack")))
    }

    /// The top frame.
    pub fn top(&self) -> Option<&Frame> {
        self.frames.last()
    }

    /// The top frame, mutably.
    pub fn top_mut(&mut self) -> Option<&mut Frame> {
        self.frames.last_mut()
    }

    /// Number of frames.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Frames from the bottom up.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Copy the frame sequence for a saved context, leaving the stack intact.
    pub fn snapshot(&self) -> Vec<Frame> {
        self.frames.iter().map(Frame::captured).collect()
    }

    /// Resolve an xmlns prefix, innermost declaration first.
    pub fn lookup_prefix(&self, prefix: &str) -> Option<&str> {
        self.frames.iter().rev().find_map(|frame| {
            frame
                .namespaces
                .iter()
                .rev()
                .find(|(p, _)| p == prefix)
                .map(|(_, uri)| uri.as_str())
        })
    }
}
