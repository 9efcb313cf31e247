//! The object writer: a streaming interpreter from node events to an object graph.
//!
//! # Event Contract
//!
//! Events must nest: every `StartObject` is closed by an `EndObject`, every
//! `StartMember` by an `EndMember`, and members only open directly inside
//! objects. A violation is a [`FatalError`] and ends the session.
//!
//! Everything else is recoverable. Unknown types, failed activations, bad
//! literals and unresolved extensions are recorded as [`XamlError`]s, the
//! faulted subtree is replaced by `Value::Null`, and construction continues
//! with its siblings. If the faulted subtree is the root, the document fails.
//!
//! # Instance Creation
//!
//! An instance is created at its first non-directive member, its first
//! implicit content, or its `EndObject`, whichever comes first. Directives
//! (`x:Name`, `x:Key`, `x:Load`, `xml:space`, ...) never force creation, so
//! `x:Load="False"` can still turn the element into a deferred one.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::mem;
use std::sync::Arc;

use xaml_schema::{
    Directive, Factory, PropertyDescriptor, PropertyIndex, SchemaContext, SchemaError,
    Setter, TypeIndex, TypeKind, XAML_NAMESPACE, XML_NAMESPACE,
};

use crate::error::{ConstructError, ErrorKind, FatalError, XamlError};
use crate::event::{MemberName, RecordedEvent, SourcePosition, XamlEvent, XamlValue};
use crate::extension::{self, Evaluated, ExtensionCall, ExtensionHost, ExtensionTarget};
use crate::graph::{
    DeferredPlaceholder, ElementRef, Expression, Item, ObjectGraph, ObjectId, PropertySystem,
    TemplateBindingRecord, TemplateRef, ThemeReference, Value,
};
use crate::namescope::NameScope;
use crate::saved::{DeferredElementCreator, SavedContext, TemplateContent, harvest_names, hash_events};
use crate::settings::{MarkupExtensionProvider, WriterSettings};
use crate::source::XamlEventSource;
use crate::stack::{ActiveMember, Frame, Instance, MemberMode, MemberTarget, WriterStack};
use crate::tracing_macros::{debug, trace, trace_span};

/// Where the writer is in the event grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    /// Nothing written yet.
    Idle,
    /// Namespaces seen; an object must follow.
    ExpectObject,
    /// Inside an object, before any member closed.
    InObject,
    /// A member closed; another member or the end of the object follows.
    ExpectMember,
    /// Inside a member that holds a value or accumulates items.
    InMember(MemberMode),
    /// A scalar member opened and waits for its value.
    ExpectValue,
    /// The root object is complete.
    ObjectComplete,
    /// The root faulted or a fatal error occurred.
    Faulted,
}

/// A constructed document.
#[derive(Debug)]
pub struct ObjectTree {
    /// All constructed objects.
    pub graph: ObjectGraph,
    /// The root value, usually `Value::Object`.
    pub root: Value,
    /// The scope holding the document's names.
    pub name_scope: Arc<NameScope>,
}

impl ObjectTree {
    /// The root object id, if the root is an object.
    pub fn root_object(&self) -> Option<ObjectId> {
        self.root.as_object()
    }
}

/// Result of a construction session.
#[derive(Debug)]
pub enum Construction {
    /// Every subtree constructed.
    Complete(ObjectTree),
    /// Some non-root subtrees faulted.
    Partial(ObjectTree, Vec<XamlError>),
    /// The root faulted or the session aborted.
    Failed(Vec<XamlError>),
}

impl Construction {
    /// The tree, unless construction failed.
    pub fn tree(&self) -> Option<&ObjectTree> {
        match self {
            Construction::Complete(tree) | Construction::Partial(tree, _) => Some(tree),
            Construction::Failed(_) => None,
        }
    }

    /// Take the tree, unless construction failed.
    pub fn into_tree(self) -> Option<ObjectTree> {
        match self {
            Construction::Complete(tree) | Construction::Partial(tree, _) => Some(tree),
            Construction::Failed(_) => None,
        }
    }

    /// Diagnostics, empty on complete success.
    pub fn errors(&self) -> &[XamlError] {
        match self {
            Construction::Complete(_) => &[],
            Construction::Partial(_, errors) | Construction::Failed(errors) => errors,
        }
    }

    /// Returns true on complete success.
    pub fn is_complete(&self) -> bool {
        matches!(self, Construction::Complete(_))
    }
}

/// Construct an object graph from every event of `source`.
pub fn construct<'de, S>(
    source: &mut S,
    schema: Arc<SchemaContext>,
    settings: WriterSettings,
) -> Result<Construction, ConstructError<S::Error>>
where
    S: XamlEventSource<'de>,
{
    trace_span!("construct");
    let mut writer = ObjectWriter::new(schema, settings);
    while let Some(event) = source.next_event().map_err(ConstructError::Source)? {
        writer.set_position(source.current_position());
        writer.write(event)?;
    }
    Ok(writer.finish())
}

/// Resolve a member name as written on an object of type `ty`.
///
/// `[uri]Owner.Name` is fully qualified; `Owner.Name` resolves `Owner` in the
/// member's namespace, or in `xmlns` (the namespace of the object element).
pub(crate) fn resolve_member<'s>(
    schema: &'s SchemaContext,
    ty: TypeIndex,
    xmlns: &str,
    member: &MemberName<'_>,
) -> Result<&'s PropertyDescriptor, SchemaError> {
    let name = member.name.as_ref();
    if name.starts_with('[') {
        let prop = schema.resolve_qualified_property(name)?;
        if prop.attached || schema.is_assignable(ty, prop.declaring_type) {
            return Ok(prop);
        }
        return Err(SchemaError::PropertyNotOnType {
            property: schema.property_name(prop.index),
            ty: schema.type_descriptor(ty).full_name(),
        });
    }
    match name.split_once('.') {
        Some((owner, prop)) => {
            let uri = member.namespace.as_deref().unwrap_or(xmlns);
            schema.resolve_attached_property(ty, uri, owner, prop)
        }
        None => schema.resolve_property(ty, name),
    }
}

/// A member in the XAML or XML language namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MemberKind {
    Directive(Directive),
    /// `x:Class` and friends: accepted, not interpreted.
    Unknown,
}

/// Language members: directives, or `None` for an ordinary member.
pub(crate) fn member_kind(member: &MemberName<'_>) -> Option<MemberKind> {
    let ns = member.namespace.as_deref()?;
    if ns != XAML_NAMESPACE && ns != XML_NAMESPACE {
        return None;
    }
    Some(match Directive::lookup(ns, &member.name) {
        Some(d) => MemberKind::Directive(d),
        None => MemberKind::Unknown,
    })
}

fn is_blank(text: &str) -> bool {
    text.chars().all(char::is_whitespace)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, Copy)]
enum SkipEnd {
    Object,
    Member,
}

/// Events of a faulted object or member being discarded.
#[derive(Debug)]
struct Skip {
    depth: usize,
    until: SkipEnd,
}

#[derive(Debug)]
enum RecordingPurpose {
    Template {
        owner: ObjectId,
        property: PropertyIndex,
        implicit: bool,
        frames: Vec<Frame>,
    },
    Element {
        parent: Option<ObjectId>,
        property: Option<PropertyIndex>,
        frames: Vec<Frame>,
    },
}

/// Events captured instead of constructed.
#[derive(Debug)]
struct Recording {
    depth: usize,
    events: Vec<RecordedEvent>,
    purpose: RecordingPurpose,
    skip_directive: bool,
}

enum RecordStep {
    Continue,
    Finish,
    FinishThen(XamlEvent<'static>),
}

/// A `{StaticResource}` whose key did not exist yet.
#[derive(Debug)]
struct PendingResource {
    key: String,
    theme: bool,
    expression: String,
    target: ObjectId,
    property: PropertyIndex,
    position: Option<SourcePosition>,
}

enum ImplicitTarget {
    Member,
    Template(PropertyIndex),
    Items,
    Rejected,
}

/// Attributes of a completed child handed to its parent.
struct Delivered {
    key: Option<String>,
    name: Option<String>,
    faulted: bool,
}

/// Builds an object graph from node events.
pub struct ObjectWriter {
    schema: Arc<SchemaContext>,
    settings: WriterSettings,
    stack: WriterStack,
    base_depth: usize,
    graph: ObjectGraph,
    state: WriterState,
    errors: Vec<XamlError>,
    position: Option<SourcePosition>,
    queued_namespaces: Vec<(String, String, Option<SourcePosition>)>,
    skip: Option<Skip>,
    recording: Option<Recording>,
    name_scope: Arc<NameScope>,
    seal_scope: bool,
    resources: HashMap<String, Value>,
    inherited_resources: Arc<HashMap<String, Value>>,
    resource_snapshot: Option<Arc<HashMap<String, Value>>>,
    pending_resources: Vec<PendingResource>,
    root: Option<Value>,
    root_faulted: bool,
    fatal: Option<FatalError>,
    hasher: DefaultHasher,
}

impl std::fmt::Debug for ObjectWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectWriter")
            .field("state", &self.state)
            .field("depth", &self.stack.depth())
            .field("base_depth", &self.base_depth)
            .field("objects", &self.graph.len())
            .field("errors", &self.errors.len())
            .finish_non_exhaustive()
    }
}

impl ExtensionHost for ObjectWriter {
    fn schema(&self) -> &SchemaContext {
        &self.schema
    }

    fn namespace_for_prefix(&self, prefix: &str) -> Option<String> {
        self.stack
            .lookup_prefix(prefix)
            .map(str::to_owned)
            .or_else(|| {
                self.queued_namespaces
                    .iter()
                    .rev()
                    .find(|(p, _, _)| p == prefix)
                    .map(|(_, uri, _)| uri.clone())
            })
    }

    fn lookup_resource(&self, key: &str) -> Option<Value> {
        self.resources
            .get(key)
            .or_else(|| self.inherited_resources.get(key))
            .cloned()
            .or_else(|| self.settings.resources.as_ref()?.resolve(key))
    }

    fn provider(&self, ty: TypeIndex) -> Option<Arc<dyn MarkupExtensionProvider>> {
        self.settings.extensions.get(&ty).cloned()
    }
}

impl ObjectWriter {
    /// A writer for a new document.
    pub fn new(schema: Arc<SchemaContext>, settings: WriterSettings) -> Self {
        let (name_scope, seal_scope) = match &settings.name_scope {
            Some(scope) => (Arc::clone(scope), false),
            None => (Arc::new(NameScope::new()), true),
        };
        Self {
            stack: WriterStack::new(settings.preserve_whitespace),
            schema,
            settings,
            base_depth: 0,
            graph: ObjectGraph::new(),
            state: WriterState::Idle,
            errors: Vec::new(),
            position: None,
            queued_namespaces: Vec::new(),
            skip: None,
            recording: None,
            name_scope,
            seal_scope,
            resources: HashMap::new(),
            inherited_resources: Arc::new(HashMap::new()),
            resource_snapshot: None,
            pending_resources: Vec::new(),
            root: None,
            root_faulted: false,
            fatal: None,
            hasher: DefaultHasher::new(),
        }
    }

    /// A writer that resumes construction from a saved context.
    ///
    /// The captured frames become inert ancestors: they supply namespace
    /// prefixes, space preservation and resources, and the first object
    /// completed on top of them becomes the result root.
    pub fn resume(saved: &SavedContext, name_scope: Arc<NameScope>) -> Self {
        let mut settings = saved.settings().clone();
        settings.name_scope = None;
        let preserve = saved
            .frames()
            .last()
            .map_or(settings.preserve_whitespace, |f| f.preserve_space);
        let mut writer = Self::new(Arc::clone(saved.schema()), settings);
        writer.stack = WriterStack::from_snapshot(saved.frames().to_vec(), preserve);
        writer.base_depth = writer.stack.depth();
        writer.name_scope = name_scope;
        writer.seal_scope = true;
        writer.inherited_resources = Arc::clone(saved.resources());
        writer.state = WriterState::ExpectObject;
        writer
    }

    pub(crate) fn replay(mut self, events: &[RecordedEvent]) -> Result<Construction, FatalError> {
        trace_span!("replay", events = events.len());
        for recorded in events {
            self.set_position(recorded.position);
            self.write(recorded.event.clone())?;
        }
        Ok(self.finish())
    }

    /// Current state.
    pub fn state(&self) -> WriterState {
        self.state
    }

    /// Number of open frames, captured ancestors included.
    pub fn depth(&self) -> usize {
        self.stack.depth()
    }

    /// The writer stack.
    pub fn stack(&self) -> &WriterStack {
        &self.stack
    }

    /// The graph built so far.
    pub fn graph(&self) -> &ObjectGraph {
        &self.graph
    }

    /// Diagnostics recorded so far.
    pub fn errors(&self) -> &[XamlError] {
        &self.errors
    }

    /// The scope names are registered in.
    pub fn name_scope(&self) -> &Arc<NameScope> {
        &self.name_scope
    }

    /// Position attached to diagnostics for the next event.
    pub fn set_position(&mut self, position: Option<SourcePosition>) {
        self.position = position;
    }

    /// Snapshot the current construction context.
    ///
    /// The live writer is not modified; the saved context can later resume
    /// construction of content that belongs at the current depth.
    pub fn capture(&self) -> SavedContext {
        let resources = match &self.resource_snapshot {
            Some(snapshot) => Arc::clone(snapshot),
            None => Arc::new(self.build_resource_snapshot()),
        };
        let hash = self
            .settings
            .markup_hash
            .unwrap_or_else(|| self.hasher.clone().finish());
        SavedContext::capture(&self.stack, &self.schema, &self.settings, resources, hash)
    }

    /// Process one event.
    pub fn write(&mut self, event: XamlEvent<'_>) -> Result<(), FatalError> {
        if let Some(fatal) = &self.fatal {
            return Err(fatal.clone());
        }
        event.hash(&mut self.hasher);
        let result = self.dispatch(event);
        if let Err(fatal) = &result {
            debug!(error = %fatal, "writer aborted");
            self.fatal = Some(fatal.clone());
            self.state = WriterState::Faulted;
        }
        result
    }

    fn dispatch(&mut self, event: XamlEvent<'_>) -> Result<(), FatalError> {
        if self.recording.is_some() {
            return self.record(event);
        }
        if self.skip.is_some() {
            return self.skip_event(&event);
        }

        let buffering = matches!(
            event,
            XamlEvent::StartMember(_) | XamlEvent::Value(_) | XamlEvent::EndMember
        ) && self.stack.depth() > self.base_depth
            && self
                .stack
                .top()
                .is_some_and(|f| f.instance == Instance::Pending);
        if buffering {
            let recorded = RecordedEvent {
                event: event.clone().into_owned(),
                position: self.position,
            };
            if let Some(frame) = self.stack.top_mut() {
                frame.pending.push(recorded);
            }
        }

        match event {
            XamlEvent::Namespace { prefix, uri } => {
                trace!(prefix = %prefix, uri = %uri, "namespace");
                self.queued_namespaces
                    .push((prefix.into_owned(), uri.into_owned(), self.position));
                if self.stack.depth() == self.base_depth {
                    self.state = WriterState::ExpectObject;
                }
                Ok(())
            }
            XamlEvent::StartObject { namespace, name } => self.start_object(&namespace, &name),
            XamlEvent::StartMember(member) => self.start_member(&member),
            XamlEvent::Value(value) => self.value(&value),
            XamlEvent::EndMember => self.end_member(),
            XamlEvent::EndObject => self.end_object(),
        }
    }

    fn report(&mut self, error: XamlError) {
        let error = error.at(self.position);
        trace!(error = %error, "recoverable error");
        self.errors.push(error);
    }

    fn fatal(&self, message: &str) -> FatalError {
        FatalError(XamlError::stack(message).at(self.position))
    }

    fn is_root_frame(&self) -> bool {
        self.stack.depth() == self.base_depth + 1
    }

    fn top(&self) -> Result<&Frame, FatalError> {
        if self.stack.depth() <= self.base_depth {
            return Err(self.fatal("no open object element"));
        }
        self.stack
            .top()
            .ok_or_else(|| self.fatal("no open object element"))
    }

    fn top_mut(&mut self) -> Result<&mut Frame, FatalError> {
        if self.stack.depth() <= self.base_depth {
            return Err(self.fatal("no open object element"));
        }
        let position = self.position;
        self.stack
            .top_mut()
            .ok_or_else(|| FatalError(XamlError::stack("no open object element").at(position)))
    }

    // ---------------------------------------------------------------------
    // Skipping and recording
    // ---------------------------------------------------------------------

    /// Start discarding the rest of the top frame, including `current`.
    fn fault_top(&mut self, current: &XamlEvent<'_>) -> Result<(), FatalError> {
        self.skip = Some(Skip {
            depth: 0,
            until: SkipEnd::Object,
        });
        self.skip_event(current)
    }

    fn skip_event(&mut self, event: &XamlEvent<'_>) -> Result<(), FatalError> {
        let Some(skip) = self.skip.as_mut() else {
            return Ok(());
        };
        match event {
            XamlEvent::StartObject { .. } | XamlEvent::StartMember(_) => skip.depth += 1,
            XamlEvent::EndObject | XamlEvent::EndMember if skip.depth > 0 => skip.depth -= 1,
            XamlEvent::EndMember => match skip.until {
                SkipEnd::Member => {
                    self.skip = None;
                    self.state = WriterState::ExpectMember;
                }
                SkipEnd::Object => return Err(self.fatal("EndMember closes a skipped element")),
            },
            XamlEvent::EndObject => match skip.until {
                SkipEnd::Object => {
                    self.skip = None;
                    return self.end_object();
                }
                SkipEnd::Member => return Err(self.fatal("EndObject inside a skipped member")),
            },
            XamlEvent::Namespace { .. } | XamlEvent::Value(_) => {}
        }
        Ok(())
    }

    fn record(&mut self, event: XamlEvent<'_>) -> Result<(), FatalError> {
        let position = self.position;
        let unbalanced =
            || FatalError(XamlError::stack("unbalanced events in recorded content").at(position));
        let Some(rec) = self.recording.as_mut() else {
            return Ok(());
        };
        let (element, implicit) = match rec.purpose {
            RecordingPurpose::Element { .. } => (true, false),
            RecordingPurpose::Template { implicit, .. } => (false, implicit),
        };
        let event = event.into_owned();
        let step = match &event {
            XamlEvent::StartMember(_) if rec.depth == 0 && implicit => {
                RecordStep::FinishThen(event.clone())
            }
            XamlEvent::StartObject { .. } | XamlEvent::StartMember(_) => {
                rec.depth += 1;
                RecordStep::Continue
            }
            XamlEvent::EndMember if rec.depth == 0 => {
                if element && rec.skip_directive {
                    rec.skip_directive = false;
                    return Ok(());
                } else if element || implicit {
                    return Err(unbalanced());
                }
                RecordStep::Finish
            }
            XamlEvent::EndObject if rec.depth == 0 => {
                if implicit {
                    RecordStep::FinishThen(event.clone())
                } else if element {
                    rec.events.push(RecordedEvent {
                        event: event.clone(),
                        position,
                    });
                    RecordStep::Finish
                } else {
                    return Err(unbalanced());
                }
            }
            XamlEvent::EndMember | XamlEvent::EndObject => {
                rec.depth -= 1;
                RecordStep::Continue
            }
            XamlEvent::Namespace { .. } | XamlEvent::Value(_) => RecordStep::Continue,
        };

        match step {
            RecordStep::Continue => {
                rec.events.push(RecordedEvent { event, position });
                Ok(())
            }
            RecordStep::Finish => self.finish_recording(),
            RecordStep::FinishThen(next) => {
                self.finish_recording()?;
                self.dispatch(next)
            }
        }
    }

    fn begin_template(
        &mut self,
        owner: ObjectId,
        property: PropertyIndex,
        first: Option<RecordedEvent>,
    ) {
        trace!(property = %property, implicit = first.is_some(), "recording deferred content");
        let frames = self.stack.snapshot();
        let implicit = first.is_some();
        self.recording = Some(Recording {
            depth: usize::from(matches!(
                first,
                Some(RecordedEvent {
                    event: XamlEvent::StartObject { .. },
                    ..
                })
            )),
            events: first.into_iter().collect(),
            purpose: RecordingPurpose::Template {
                owner,
                property,
                implicit,
                frames,
            },
            skip_directive: false,
        });
    }

    fn finish_recording(&mut self) -> Result<(), FatalError> {
        let Some(rec) = self.recording.take() else {
            return Ok(());
        };
        let resources = self.resource_snapshot();
        let hash = self
            .settings
            .markup_hash
            .unwrap_or_else(|| hash_events(&rec.events));
        match rec.purpose {
            RecordingPurpose::Template {
                owner,
                property,
                implicit,
                frames,
            } => {
                let saved = SavedContext::from_frames(frames, &self.schema, &self.settings, resources, hash);
                let content = TemplateContent::new(saved, rec.events);
                self.graph
                    .set_value(owner, property, Value::Template(TemplateRef(Arc::new(content))));
                if !implicit {
                    self.top_mut()?.member = None;
                    self.state = WriterState::ExpectMember;
                }
            }
            RecordingPurpose::Element {
                parent,
                property,
                frames,
            } => {
                let names = harvest_names(&self.schema, &rec.events);
                let position = rec.events.first().and_then(|e| e.position);
                if names.is_empty() {
                    self.report(
                        XamlError::assignment("a deferred element must declare x:Name")
                            .at(position),
                    );
                } else {
                    debug!(names = ?names, "deferred element recorded");
                    let saved = SavedContext::from_frames(frames, &self.schema, &self.settings, resources, hash);
                    let creator = Arc::new(DeferredElementCreator::new(saved, rec.events));
                    for name in &names {
                        if let Err(dup) = self.name_scope.register_deferred(name, Arc::clone(&creator)) {
                            self.report(XamlError::assignment(dup.to_string()).with_name(name.clone()));
                        }
                    }
                    self.graph.record_deferred(DeferredPlaceholder {
                        parent,
                        property,
                        names,
                        creator,
                    });
                }
                self.state = self.parent_state();
            }
        }
        Ok(())
    }

    fn parent_state(&self) -> WriterState {
        if self.stack.depth() <= self.base_depth {
            return WriterState::ObjectComplete;
        }
        match self.stack.top().and_then(|f| f.member.as_ref()) {
            Some(m) if !m.implicit => WriterState::InMember(m.mode),
            _ => WriterState::InObject,
        }
    }

    // ---------------------------------------------------------------------
    // Resources
    // ---------------------------------------------------------------------

    fn build_resource_snapshot(&self) -> HashMap<String, Value> {
        let mut snapshot = (*self.inherited_resources).clone();
        for (key, value) in &self.resources {
            let value = match value {
                Value::Object(id) => {
                    let (graph, root) = self.graph.extract(*id);
                    Value::Element(ElementRef::new(Arc::new(graph), root))
                }
                other => other.clone(),
            };
            snapshot.insert(key.clone(), value);
        }
        snapshot
    }

    fn resource_snapshot(&mut self) -> Arc<HashMap<String, Value>> {
        if let Some(snapshot) = &self.resource_snapshot {
            return Arc::clone(snapshot);
        }
        let snapshot = Arc::new(self.build_resource_snapshot());
        self.resource_snapshot = Some(Arc::clone(&snapshot));
        snapshot
    }

    fn register_resource(&mut self, key: String, value: Value) {
        trace!(key = %key, "local resource");
        self.resource_snapshot = None;
        self.resources.insert(key.clone(), value);
        self.retry_pending(|p| p.key == key);
    }

    /// Retry matching pending references once; failures become errors.
    fn retry_pending(&mut self, mut select: impl FnMut(&PendingResource) -> bool) {
        let (ready, waiting): (Vec<_>, Vec<_>) = mem::take(&mut self.pending_resources)
            .into_iter()
            .partition(|p| select(p));
        self.pending_resources = waiting;
        for pending in ready {
            match self.lookup_resource(&pending.key) {
                Some(value) => {
                    trace!(key = %pending.key, "pending resource resolved");
                    if pending.theme {
                        self.graph.record_theme_reference(ThemeReference {
                            target: pending.target,
                            property: pending.property,
                            key: pending.key.clone(),
                        });
                    }
                    self.graph.set_value(pending.target, pending.property, value);
                }
                None => {
                    let error = XamlError::new(
                        ErrorKind::ExtensionEvaluation,
                        format!(
                            "resource '{}' referenced by {} was never found",
                            pending.key, pending.expression
                        ),
                    )
                    .with_name(pending.key)
                    .at(pending.position);
                    self.errors.push(error);
                }
            }
        }
    }

    // ---------------------------------------------------------------------
    // StartObject
    // ---------------------------------------------------------------------

    fn start_object(&mut self, namespace: &str, name: &str) -> Result<(), FatalError> {
        let event = XamlEvent::start_object(namespace, name);

        if self.stack.depth() == self.base_depth {
            if self.root.is_some() {
                self.report(
                    XamlError::assignment("only one root element is allowed").with_name(name),
                );
                return self.push_faulted(namespace);
            }
        } else {
            let parent = self.top()?;
            if parent.member.is_none() {
                if parent.instance == Instance::Pending && !self.ensure_instance()? {
                    return self.fault_top(&event);
                }
                if let Some(owner) = self.top()?.object() {
                    match self.implicit_target()? {
                        ImplicitTarget::Template(property) => {
                            let first = RecordedEvent {
                                event: event.into_owned(),
                                position: self.position,
                            };
                            self.begin_template(owner, property, Some(first));
                            return Ok(());
                        }
                        ImplicitTarget::Rejected => {
                            return self.push_faulted(namespace);
                        }
                        ImplicitTarget::Member | ImplicitTarget::Items => {}
                    }
                }
            }
        }

        let schema = Arc::clone(&self.schema);
        let namespaces = mem::take(&mut self.queued_namespaces);
        let position = self.position;
        match schema.resolve_type(namespace, name) {
            Ok(desc) => {
                #[cfg(feature = "tracing")]
                {
                    use owo_colors::OwoColorize;
                    let ns = desc.namespace.name.as_str();
                    trace!(depth = self.stack.depth(), "start object {}.{}", ns.dimmed(), desc.name.cyan());
                }
                let mut pending: Vec<RecordedEvent> = namespaces
                    .iter()
                    .map(|(prefix, uri, pos)| RecordedEvent {
                        event: XamlEvent::Namespace {
                            prefix: prefix.clone().into(),
                            uri: uri.clone().into(),
                        },
                        position: *pos,
                    })
                    .collect();
                pending.push(RecordedEvent {
                    event: event.into_owned(),
                    position,
                });
                let frame = self.stack.push(Some(desc.index), namespace);
                frame.namespaces = namespaces.into_iter().map(|(p, u, _)| (p, u)).collect();
                frame.position = position;
                frame.pending = pending;
                self.state = WriterState::InObject;
                Ok(())
            }
            Err(err) => {
                self.report(XamlError::schema(err, name));
                self.push_faulted(namespace)
            }
        }
    }

    /// Push a frame for an element that will not be constructed and skip its content.
    fn push_faulted(&mut self, namespace: &str) -> Result<(), FatalError> {
        self.queued_namespaces.clear();
        let root = self.stack.depth() == self.base_depth;
        let position = self.position;
        let frame = self.stack.push(None, namespace);
        frame.instance = Instance::Faulted;
        frame.position = position;
        if root && self.root.is_none() {
            self.root_faulted = true;
        }
        self.skip = Some(Skip {
            depth: 0,
            until: SkipEnd::Object,
        });
        Ok(())
    }

    /// Create the top frame's instance if it is still pending.
    ///
    /// Returns false if creation failed; the frame is then faulted.
    fn ensure_instance(&mut self) -> Result<bool, FatalError> {
        let schema = Arc::clone(&self.schema);
        let root = self.is_root_frame();
        let frame = self.top()?;
        match frame.instance {
            Instance::Pending => {}
            Instance::Faulted => return Ok(false),
            _ => return Ok(true),
        }
        let Some(ty) = frame.ty else {
            return Ok(false);
        };
        let desc = schema.type_descriptor(ty);
        let created = match (&desc.kind, &desc.factory) {
            (TypeKind::MarkupExtension(kind), _) => Ok(Instance::Extension(ExtensionCall::new(ty, *kind))),
            (_, Factory::Primitive) => Ok(Instance::Text(String::new())),
            _ if desc.text_syntax.is_some() && desc.content_property.is_none() => {
                Ok(Instance::Text(String::new()))
            }
            (_, Factory::Abstract) => Err(format!("type '{}' cannot be instantiated", desc.name)),
            (_, Factory::Activate(runtime)) => match &self.settings.activator {
                Some(activator) => activator
                    .activate(desc, runtime)
                    .map(|()| Instance::Pending)
                    .map_err(|e| format!("activating '{runtime}' failed: {e}")),
                None => Err(format!("no activator available for '{runtime}'")),
            },
            (_, Factory::Default) => Ok(Instance::Pending),
        };

        match created {
            Ok(instance) => {
                let position = frame.position;
                let uid = frame.uid.clone();
                let instance = match instance {
                    Instance::Pending => {
                        let id = self.graph.add(ty, position);
                        self.graph.node_mut(id).uid = uid;
                        trace!(id = %id, ty = %desc.name, "instance created");
                        Instance::Object(id)
                    }
                    other => other,
                };
                let frame = self.top_mut()?;
                frame.instance = instance;
                frame.pending.clear();
                Ok(true)
            }
            Err(message) => {
                self.report(XamlError::new(ErrorKind::Activation, message).with_name(desc.name.clone()));
                self.top_mut()?.instance = Instance::Faulted;
                if root {
                    self.root_faulted = true;
                }
                Ok(false)
            }
        }
    }

    /// Pick (and open) the destination of implicit content on the top frame.
    fn implicit_target(&mut self) -> Result<ImplicitTarget, FatalError> {
        let schema = Arc::clone(&self.schema);
        let frame = self.top()?;
        if let Some(member) = &frame.member {
            if member.implicit {
                return Ok(ImplicitTarget::Member);
            }
        }
        let Some(ty) = frame.ty else {
            return Ok(ImplicitTarget::Rejected);
        };
        if let Some(content) = schema.content_property(ty) {
            if frame.content_explicit {
                let name = schema.property_name(content.index);
                self.report(
                    XamlError::assignment("content was already set through an explicit member")
                        .with_name(name),
                );
                return Ok(ImplicitTarget::Rejected);
            }
            if content.deferred {
                return Ok(ImplicitTarget::Template(content.index));
            }
            let mode = self.member_mode(content);
            let frame = self.top_mut()?;
            frame.member = Some(ActiveMember::new(
                MemberTarget::Property(content.index),
                mode,
                true,
            ));
            frame.content_implicit = true;
            if !frame.assigned.contains(&content.index) {
                frame.assigned.push(content.index);
            }
            return Ok(ImplicitTarget::Member);
        }
        if schema.collection_info(ty).is_some() {
            return Ok(ImplicitTarget::Items);
        }
        let name = schema.type_descriptor(ty).name.clone();
        self.report(XamlError::assignment("type has no content property and is not a collection").with_name(name));
        Ok(ImplicitTarget::Rejected)
    }

    fn member_mode(&self, prop: &PropertyDescriptor) -> MemberMode {
        if prop.setter == Setter::AddOnly || self.schema.collection_info(prop.value_type).is_some() {
            MemberMode::Collection
        } else {
            MemberMode::Scalar
        }
    }

    // ---------------------------------------------------------------------
    // StartMember
    // ---------------------------------------------------------------------

    fn start_member(&mut self, member: &MemberName<'_>) -> Result<(), FatalError> {
        let schema = Arc::clone(&self.schema);
        let frame = self.top()?;
        if let Some(open) = &frame.member {
            if !open.implicit {
                return Err(self.fatal("StartMember inside an open member"));
            }
            self.close_member()?;
        }
        if matches!(self.top()?.instance, Instance::Captured) {
            return Err(self.fatal("StartMember on a captured frame"));
        }

        if let Some(kind) = member_kind(member) {
            let target = match kind {
                MemberKind::Directive(d) => MemberTarget::Directive(d),
                MemberKind::Unknown => MemberTarget::Ignored(member.name.to_string()),
            };
            trace!(member = %member.name, "directive");
            self.top_mut()?.member = Some(ActiveMember::new(target, MemberMode::Scalar, false));
            self.state = WriterState::ExpectValue;
            return Ok(());
        }

        if !self.ensure_instance()? {
            return self.fault_top(&XamlEvent::StartMember(member.clone()));
        }

        let frame = self.top()?;
        let Some(ty) = frame.ty else {
            return Err(self.fatal("member on an untyped frame"));
        };
        let resolved = resolve_member(&schema, ty, &frame.xmlns, member);
        let prop = match resolved {
            Ok(prop) => prop,
            Err(err) => {
                self.report(XamlError::schema(err, member.name.to_string()));
                return self.skip_member();
            }
        };

        let is_extension = matches!(frame.instance, Instance::Extension(_));
        let owner = frame.object();
        if is_extension {
            let target = MemberTarget::ExtensionArg(prop.name.clone());
            self.top_mut()?.member = Some(ActiveMember::new(target, MemberMode::Scalar, false));
            self.state = WriterState::ExpectValue;
            return Ok(());
        }
        let Some(owner) = owner else {
            let name = schema.property_name(prop.index);
            self.report(XamlError::assignment("this element cannot have members").with_name(name));
            return self.skip_member();
        };

        let name = schema.property_name(prop.index);
        if prop.setter == Setter::ReadOnly {
            self.report(XamlError::assignment("property is read-only").with_name(name));
            return self.skip_member();
        }

        let is_content = schema.content_property(ty).map(|p| p.index) == Some(prop.index);
        let check_duplicates = self.settings.check_duplicate_properties;
        let frame = self.top_mut()?;
        if is_content {
            frame.content_explicit = true;
            if frame.content_implicit {
                // Explicit content replaces what implicit content assigned.
                frame.content_implicit = false;
                frame.assigned.retain(|p| *p != prop.index);
                // An implicitly created collection is emptied and reused.
                let implicit_collection = self
                    .graph
                    .get_value(owner, prop.index)
                    .and_then(Value::as_object)
                    .filter(|id| {
                        self.graph
                            .node(*id)
                            .ty
                            .is_some_and(|t| schema.collection_info(t).is_some())
                    });
                match implicit_collection {
                    Some(id) => self.graph.node_mut(id).items.clear(),
                    None => {
                        self.graph.clear_value(owner, prop.index);
                    }
                }
            }
        }
        let frame = self.top_mut()?;
        if check_duplicates && frame.assigned.contains(&prop.index) {
            self.report(XamlError::assignment("property is set more than once").with_name(name));
            return self.skip_member();
        }
        frame.assigned.push(prop.index);

        trace!(member = %name, deferred = prop.deferred, "start member");
        if prop.deferred {
            frame.member = Some(ActiveMember::new(
                MemberTarget::Property(prop.index),
                MemberMode::Scalar,
                false,
            ));
            self.state = WriterState::InMember(MemberMode::Scalar);
            self.begin_template(owner, prop.index, None);
            return Ok(());
        }

        let mode = self.member_mode(prop);
        self.top_mut()?.member = Some(ActiveMember::new(MemberTarget::Property(prop.index), mode, false));
        self.state = match mode {
            MemberMode::Collection => WriterState::InMember(MemberMode::Collection),
            MemberMode::Scalar => WriterState::ExpectValue,
        };
        Ok(())
    }

    fn skip_member(&mut self) -> Result<(), FatalError> {
        self.skip = Some(Skip {
            depth: 0,
            until: SkipEnd::Member,
        });
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Value
    // ---------------------------------------------------------------------

    fn value(&mut self, value: &XamlValue<'_>) -> Result<(), FatalError> {
        if self.stack.depth() <= self.base_depth {
            if !is_blank(value.as_str()) {
                self.report(XamlError::assignment("text outside of the root element"));
            }
            return Ok(());
        }
        let frame = self.top()?;
        let Some(member) = &frame.member else {
            return self.implicit_value(value);
        };
        match member.target.clone() {
            MemberTarget::Directive(d) => self.directive_value(d, value),
            MemberTarget::Ignored(_) => Ok(()),
            MemberTarget::ExtensionArg(name) => {
                let arg = match value {
                    XamlValue::Text(text) => Value::string(text.as_ref()),
                    XamlValue::Extension(expr) => match extension::evaluate(&*self, expr, None) {
                        Ok(Evaluated::Ready(v) | Evaluated::Theme { value: v, .. }) => v,
                        Ok(Evaluated::Deferred { key, .. }) => {
                            self.report(
                                XamlError::new(
                                    ErrorKind::ExtensionEvaluation,
                                    format!("resource '{key}' is not available"),
                                )
                                .with_name(name),
                            );
                            return Ok(());
                        }
                        Err(e) => {
                            self.report(e);
                            return Ok(());
                        }
                    },
                };
                self.place(arg)
            }
            MemberTarget::Property(prop) => self.member_value(prop, value),
        }
    }

    fn directive_value(&mut self, directive: Directive, value: &XamlValue<'_>) -> Result<(), FatalError> {
        let XamlValue::Text(text) = value else {
            self.report(
                XamlError::assignment("directive values must be literals")
                    .with_name(directive.markup_name()),
            );
            return Ok(());
        };
        let text = text.trim();
        trace!(directive = directive.markup_name(), value = text, "directive value");
        let frame = self.top_mut()?;
        match directive {
            Directive::Name => frame.name = Some(text.to_owned()),
            Directive::Key => frame.key = Some(text.to_owned()),
            Directive::Uid => {
                frame.uid = Some(text.to_owned());
                if let Some(id) = frame.object() {
                    self.graph.node_mut(id).uid = Some(text.to_owned());
                }
            }
            Directive::Space => frame.preserve_space = text == "preserve",
            Directive::Load => {
                if text.eq_ignore_ascii_case("false") {
                    return self.defer_element();
                }
            }
            Directive::DeferLoadStrategy => {
                if text.eq_ignore_ascii_case("lazy") {
                    return self.defer_element();
                }
            }
        }
        Ok(())
    }

    /// Turn the top frame into a recorded, deferred element.
    fn defer_element(&mut self) -> Result<(), FatalError> {
        if self.top()?.instance != Instance::Pending {
            trace!("x:Load after instance creation ignored");
            return Ok(());
        }
        if self.is_root_frame() {
            self.report(XamlError::assignment("the root element cannot be deferred"));
            return Ok(());
        }
        let frame = self.stack.pop()?;
        let mut events = frame.pending;
        while matches!(events.last().map(|e| &e.event), Some(XamlEvent::Value(_))) {
            events.pop();
        }
        if matches!(events.last().map(|e| &e.event), Some(XamlEvent::StartMember(_))) {
            events.pop();
        }
        let parent = self.stack.top().and_then(Frame::object);
        let property = self
            .stack
            .top()
            .and_then(|f| f.member.as_ref())
            .and_then(ActiveMember::property);
        debug!(depth = self.stack.depth(), "deferring element");
        self.recording = Some(Recording {
            depth: 0,
            events,
            purpose: RecordingPurpose::Element {
                parent,
                property,
                frames: self.stack.snapshot(),
            },
            skip_directive: true,
        });
        Ok(())
    }

    fn implicit_value(&mut self, value: &XamlValue<'_>) -> Result<(), FatalError> {
        let preserve = self.top()?.preserve_space;
        if let XamlValue::Text(text) = value {
            if is_blank(text) && !preserve {
                return Ok(());
            }
        }
        if !self.ensure_instance()? {
            return self.fault_top(&XamlEvent::Value(value.clone()));
        }
        let frame = self.top_mut()?;
        match &mut frame.instance {
            Instance::Text(buffer) => {
                match value {
                    XamlValue::Text(text) => buffer.push_str(text),
                    XamlValue::Extension(_) => self.report(XamlError::assignment(
                        "initialization text cannot be a markup extension",
                    )),
                }
                return Ok(());
            }
            Instance::Extension(call) => {
                call.positional.push(Value::string(value.as_str()));
                return Ok(());
            }
            Instance::Object(_) => {}
            _ => return Ok(()),
        }
        let Some(owner) = frame.object() else {
            return Ok(());
        };
        match self.implicit_target()? {
            ImplicitTarget::Member => {
                let Some(prop) = self.top()?.member.as_ref().and_then(ActiveMember::property) else {
                    return Ok(());
                };
                self.member_value(prop, value)
            }
            ImplicitTarget::Template(prop) => {
                let first = RecordedEvent {
                    event: XamlEvent::Value(value.clone().into_owned()),
                    position: self.position,
                };
                self.begin_template(owner, prop, Some(first));
                Ok(())
            }
            ImplicitTarget::Items => {
                let text = if preserve { value.as_str().to_owned() } else { collapse_whitespace(value.as_str()) };
                self.add_items_from_text(owner, &text)
            }
            ImplicitTarget::Rejected => Ok(()),
        }
    }

    /// Text content of a collection object: each part becomes an item.
    fn add_items_from_text(&mut self, owner: ObjectId, text: &str) -> Result<(), FatalError> {
        let schema = Arc::clone(&self.schema);
        let Some(ty) = self.graph.node(owner).ty else {
            return Ok(());
        };
        let item_type = schema.collection_info(ty).and_then(|c| c.item_type);
        match self.convert_items(item_type, text) {
            Ok(values) => {
                for value in values {
                    self.graph.add_item(owner, Item { value, key: None });
                }
            }
            Err(e) => self.report(e),
        }
        Ok(())
    }

    fn convert_items(&self, item_type: Option<TypeIndex>, text: &str) -> Result<Vec<Value>, XamlError> {
        let schema = &self.schema;
        let Some(item_type) = item_type.filter(|t| schema.type_descriptor(*t).has_text_conversion()) else {
            return Ok(vec![Value::string(text)]);
        };
        let name = schema.type_descriptor(item_type).name.clone();
        text.split(|c: char| c == ',' || c.is_whitespace())
            .filter(|part| !part.is_empty())
            .map(|part| {
                schema
                    .convert_text(item_type, part)
                    .map(Value::Scalar)
                    .map_err(|e| XamlError::conversion(e, name.clone()))
            })
            .collect()
    }

    fn member_value(&mut self, prop: PropertyIndex, value: &XamlValue<'_>) -> Result<(), FatalError> {
        let schema = Arc::clone(&self.schema);
        let desc = schema.property(prop);
        let frame = self.top()?;
        let Some(member) = &frame.member else {
            return Ok(());
        };
        let (mode, implicit) = (member.mode, member.implicit);
        let preserve = frame.preserve_space;
        let has_value = member.held.is_some();
        let Some(owner) = frame.object() else {
            return Ok(());
        };
        let name = schema.property_name(prop);

        match value {
            XamlValue::Text(text) => {
                let text: String = if implicit && !preserve {
                    collapse_whitespace(text)
                } else {
                    text.to_string()
                };
                match mode {
                    MemberMode::Collection => {
                        if is_blank(&text) && !preserve {
                            return Ok(());
                        }
                        let item_type = schema
                            .collection_info(desc.value_type)
                            .and_then(|c| c.item_type);
                        match self.convert_items(item_type, &text) {
                            Ok(values) => {
                                for v in values {
                                    self.place(v)?;
                                }
                            }
                            Err(e) => self.report(e),
                        }
                        self.state = WriterState::InMember(MemberMode::Collection);
                    }
                    MemberMode::Scalar => {
                        if is_blank(&text) && !preserve {
                            return Ok(());
                        }
                        if has_value {
                            if !is_blank(&text) {
                                self.report(XamlError::assignment("member already has a value").with_name(name));
                            }
                            return Ok(());
                        }
                        if !schema.can_convert_text(desc.value_type) {
                            let target = schema.type_descriptor(desc.value_type).name.clone();
                            self.report(
                                XamlError::new(
                                    ErrorKind::ValueConversion,
                                    format!("'{target}' cannot be created from text"),
                                )
                                .with_name(name),
                            );
                            return Ok(());
                        }
                        match schema.convert_text(desc.value_type, &text) {
                            Ok(scalar) => self.place(Value::Scalar(scalar))?,
                            Err(e) => self.report(XamlError::conversion(e, name)),
                        }
                        self.state = WriterState::InMember(MemberMode::Scalar);
                    }
                }
            }
            XamlValue::Extension(expr) => {
                let target = ExtensionTarget {
                    object: Some(owner),
                    owner_type: self.graph.node(owner).ty,
                    property: Some(prop),
                };
                match extension::evaluate(&*self, expr, Some(&target)) {
                    Ok(Evaluated::Ready(v)) => self.place(v)?,
                    Ok(Evaluated::Theme { key, value }) => {
                        if mode == MemberMode::Scalar {
                            self.graph.record_theme_reference(ThemeReference {
                                target: owner,
                                property: prop,
                                key,
                            });
                        }
                        self.place(value)?;
                    }
                    Ok(Evaluated::Deferred { key, theme }) if mode == MemberMode::Scalar => {
                        trace!(key = %key, "resource pending");
                        self.pending_resources.push(PendingResource {
                            key,
                            theme,
                            expression: expr.to_string(),
                            target: owner,
                            property: prop,
                            position: self.position,
                        });
                    }
                    Ok(Evaluated::Deferred { key, .. }) => self.report(
                        XamlError::new(
                            ErrorKind::ExtensionEvaluation,
                            format!("resource '{key}' is not available for a collection item"),
                        )
                        .with_name(key),
                    ),
                    Err(e) => self.report(e),
                }
                self.state = WriterState::InMember(mode);
            }
        }
        Ok(())
    }

    /// Put a value into the open member of the top frame.
    fn place(&mut self, value: Value) -> Result<(), FatalError> {
        let schema = Arc::clone(&self.schema);
        let frame = self.top_mut()?;
        let Some(member) = frame.member.as_mut() else {
            return Ok(());
        };
        match member.mode {
            MemberMode::Collection => member.items.push(Item { value, key: None }),
            MemberMode::Scalar if member.held.is_some() => {
                let name = match &member.target {
                    MemberTarget::Property(p) => schema.property_name(*p),
                    MemberTarget::ExtensionArg(n) | MemberTarget::Ignored(n) => n.clone(),
                    MemberTarget::Directive(d) => d.markup_name().to_owned(),
                };
                self.report(XamlError::assignment("member already has a value").with_name(name));
            }
            MemberMode::Scalar => member.held = Some(value),
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // EndMember
    // ---------------------------------------------------------------------

    fn end_member(&mut self) -> Result<(), FatalError> {
        match &self.top()?.member {
            Some(m) if !m.implicit => {}
            _ => return Err(self.fatal("EndMember without a matching StartMember")),
        }
        self.close_member()?;
        self.state = WriterState::ExpectMember;
        Ok(())
    }

    /// Assign the open member of the top frame and close it.
    fn close_member(&mut self) -> Result<(), FatalError> {
        let schema = Arc::clone(&self.schema);
        let frame = self.top_mut()?;
        let Some(member) = frame.member.take() else {
            return Ok(());
        };
        let owner = frame.object();
        let prop = match member.target {
            MemberTarget::Property(prop) => prop,
            MemberTarget::ExtensionArg(name) => {
                if let (Instance::Extension(call), Some(v)) = (&mut frame.instance, member.held) {
                    call.named.push((name, v));
                }
                return Ok(());
            }
            MemberTarget::Directive(_) | MemberTarget::Ignored(_) => return Ok(()),
        };
        let Some(owner) = owner else {
            return Ok(());
        };
        let desc = schema.property(prop);

        match member.mode {
            MemberMode::Scalar => {
                if let Some(value) = member.held {
                    self.graph.set_value(owner, prop, value);
                }
            }
            MemberMode::Collection => {
                let existing = match member.explicit_collection {
                    Some(Value::Object(id)) => {
                        self.graph.set_value(owner, prop, Value::Object(id));
                        Some(id)
                    }
                    Some(other) => {
                        self.graph.set_value(owner, prop, other);
                        None
                    }
                    None => self
                        .graph
                        .get_value(owner, prop)
                        .and_then(Value::as_object)
                        .filter(|id| {
                            self.graph
                                .node(*id)
                                .ty
                                .is_some_and(|t| schema.collection_info(t).is_some())
                        }),
                };
                let collection = match existing {
                    Some(id) => id,
                    None if member.items.is_empty() && member.implicit => return Ok(()),
                    None => {
                        let id = self.graph.add(desc.value_type, self.position);
                        self.graph.set_value(owner, prop, Value::Object(id));
                        id
                    }
                };
                // Dictionaries police keys instead, at delivery.
                let reject_duplicates = self
                    .graph
                    .node(collection)
                    .ty
                    .and_then(|t| schema.collection_info(t))
                    .is_some_and(|c| !c.allows_duplicates && !c.keyed);
                for item in member.items {
                    let node = self.graph.node(collection);
                    if reject_duplicates && node.items.iter().any(|i| i.value == item.value) {
                        self.report(
                            XamlError::assignment("collection does not accept duplicate items")
                                .with_name(schema.property_name(prop)),
                        );
                        continue;
                    }
                    self.graph.add_item(collection, item);
                }
                trace!(member = %desc.name, items = self.graph.node(collection).items.len(), "collection assigned");
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // EndObject
    // ---------------------------------------------------------------------

    fn end_object(&mut self) -> Result<(), FatalError> {
        let frame = self.top()?;
        match &frame.member {
            Some(m) if m.implicit => self.close_member()?,
            Some(_) => return Err(self.fatal("EndObject inside an open member")),
            None => {}
        }
        let faulted = self.top()?.is_faulted();
        if !faulted {
            self.ensure_instance()?;
        }
        let root_id = self
            .stack
            .frames()
            .get(self.base_depth)
            .and_then(Frame::object);
        let parent_target = self.stack.frames().len().checked_sub(2).and_then(|i| {
            let parent = &self.stack.frames()[i];
            let prop = parent.member.as_ref().and_then(ActiveMember::property)?;
            Some((parent.object(), prop))
        });
        let is_root = self.is_root_frame();
        let frame = self.stack.pop()?;
        let schema = Arc::clone(&self.schema);

        let mut failed = false;
        let produced: Option<Value> = match frame.instance {
            Instance::Object(id) => {
                self.finalize(id, &frame, root_id.unwrap_or(id));
                Some(Value::Object(id))
            }
            Instance::Text(text) => {
                let ty = frame.ty.unwrap_or(schema.well_known().string);
                let text = if frame.preserve_space { text } else { collapse_whitespace(&text) };
                match schema.convert_text(ty, &text) {
                    Ok(scalar) => Some(Value::Scalar(scalar)),
                    Err(e) => {
                        let name = schema.type_descriptor(ty).name.clone();
                        self.report(XamlError::conversion(e, name));
                        failed = true;
                        Some(Value::Null)
                    }
                }
            }
            Instance::Extension(call) => {
                let target = parent_target.map(|(object, property)| ExtensionTarget {
                    object,
                    owner_type: object.and_then(|o| self.graph.node(o).ty),
                    property: Some(property),
                });
                match extension::provide(&*self, &call, target.as_ref()) {
                    Ok(Evaluated::Ready(v)) => Some(v),
                    Ok(Evaluated::Theme { key, value }) => {
                        if let Some((Some(object), property)) = parent_target {
                            self.graph.record_theme_reference(ThemeReference {
                                target: object,
                                property,
                                key,
                            });
                        }
                        Some(value)
                    }
                    Ok(Evaluated::Deferred { key, theme }) => match parent_target {
                        Some((Some(object), property))
                            if self
                                .stack
                                .top()
                                .and_then(|f| f.member.as_ref())
                                .is_some_and(|m| m.mode == MemberMode::Scalar) =>
                        {
                            let expression = schema.type_descriptor(call.ty).name.clone();
                            self.pending_resources.push(PendingResource {
                                key,
                                theme,
                                expression,
                                target: object,
                                property,
                                position: frame.position,
                            });
                            None
                        }
                        _ => {
                            self.report(
                                XamlError::new(
                                    ErrorKind::ExtensionEvaluation,
                                    format!("resource '{key}' is not available"),
                                )
                                .with_name(key)
                                .at(frame.position),
                            );
                            failed = true;
                            Some(Value::Null)
                        }
                    },
                    Err(e) => {
                        self.report(e.at(frame.position));
                        failed = true;
                        Some(Value::Null)
                    }
                }
            }
            Instance::Faulted | Instance::Pending => {
                failed = true;
                Some(Value::Null)
            }
            Instance::Captured => return Err(self.fatal("EndObject closes a captured frame")),
        };

        if is_root {
            if self.root.is_none() {
                if failed {
                    self.root_faulted = true;
                }
                self.root = produced.or(Some(Value::Null));
            }
            self.state = if self.root_faulted {
                WriterState::Faulted
            } else {
                WriterState::ObjectComplete
            };
            return Ok(());
        }

        if let Some(value) = produced {
            self.deliver(
                value,
                Delivered {
                    key: frame.key,
                    name: frame.name,
                    faulted: failed,
                },
            )?;
        }
        self.state = self.parent_state();
        Ok(())
    }

    /// Record names, uids and template bindings, then notify listeners.
    fn finalize(&mut self, id: ObjectId, frame: &Frame, root: ObjectId) {
        let node = self.graph.node_mut(id);
        node.uid = frame.uid.clone();
        let bindings: Vec<_> = node
            .properties
            .iter()
            .filter_map(|(prop, value)| match value {
                Value::Expression(Expression::TemplateBinding { property }) => Some(TemplateBindingRecord {
                    target: id,
                    property: *prop,
                    source: property.clone(),
                }),
                _ => None,
            })
            .collect();
        for binding in bindings {
            self.graph.record_template_binding(binding);
        }
        if let Some(name) = &frame.name {
            self.graph.node_mut(id).name = Some(name.clone());
            if let Err(dup) = self.name_scope.register(name, id) {
                self.report(XamlError::assignment(dup.to_string()).with_name(name.clone()));
            }
        }
        if let Some(callbacks) = &self.settings.callbacks {
            callbacks.on_object_created(&self.graph, root, id);
        }
    }

    /// Hand a completed child to the top frame.
    fn deliver(&mut self, value: Value, meta: Delivered) -> Result<(), FatalError> {
        let schema = Arc::clone(&self.schema);
        let frame = self.top_mut()?;
        if frame.member.is_none() {
            if meta.faulted {
                // Already reported; there is no member to hold the placeholder.
                return Ok(());
            }
            match &mut frame.instance {
                Instance::Object(_) => {}
                Instance::Extension(call) => {
                    call.positional.push(value);
                    return Ok(());
                }
                Instance::Text(_) => {
                    self.report(XamlError::assignment("initialization text cannot contain elements"));
                    return Ok(());
                }
                _ => return Ok(()),
            }
            let Some(owner) = frame.object() else {
                return Ok(());
            };
            match self.implicit_target()? {
                ImplicitTarget::Member => {}
                ImplicitTarget::Items => {
                    let keyed = self
                        .graph
                        .node(owner)
                        .ty
                        .and_then(|t| schema.collection_info(t))
                        .is_some_and(|c| c.keyed);
                    if let Some(item) = self.keyed_item(value, meta, keyed, owner_items(&self.graph, owner)) {
                        self.graph.add_item(owner, item);
                    }
                    return Ok(());
                }
                ImplicitTarget::Template(_) | ImplicitTarget::Rejected => return Ok(()),
            }
        }

        let frame = self.top()?;
        let Some(member) = &frame.member else {
            return Ok(());
        };
        match member.target.clone() {
            MemberTarget::Directive(d) => {
                match value {
                    Value::Scalar(s) => {
                        let text = schema.format_scalar(&s);
                        return self.directive_value(d, &XamlValue::Text(text.into()));
                    }
                    _ => self.report(
                        XamlError::assignment("directive values must be literals").with_name(d.markup_name()),
                    ),
                }
                Ok(())
            }
            MemberTarget::Ignored(_) => Ok(()),
            MemberTarget::ExtensionArg(_) => self.place(value),
            MemberTarget::Property(prop) => {
                let desc = schema.property(prop);
                let name = schema.property_name(prop);
                let value_ty = value.as_object().and_then(|id| self.graph.node(id).ty);
                match member.mode {
                    MemberMode::Scalar => {
                        if let Some(vt) = value_ty {
                            if !schema.is_assignable(vt, desc.value_type) {
                                let (from, to) = (
                                    schema.type_descriptor(vt).name.clone(),
                                    schema.type_descriptor(desc.value_type).name.clone(),
                                );
                                self.report(
                                    XamlError::new(
                                        ErrorKind::ValueConversion,
                                        format!("'{from}' is not assignable to '{to}'"),
                                    )
                                    .with_name(name),
                                );
                                return Ok(());
                            }
                        }
                        self.place(value)
                    }
                    MemberMode::Collection => {
                        let explicit = member.items.is_empty()
                            && member.explicit_collection.is_none()
                            && value_ty.is_some_and(|vt| {
                                schema.collection_info(vt).is_some() && schema.is_assignable(vt, desc.value_type)
                            });
                        if explicit {
                            if let Some(m) = self.top_mut()?.member.as_mut() {
                                m.explicit_collection = Some(value);
                            }
                            return Ok(());
                        }
                        let keyed = schema.collection_info(desc.value_type).is_some_and(|c| c.keyed);
                        let existing: Vec<String> = member.items.iter().filter_map(|i| i.key.clone()).collect();
                        if let Some(item) = self.keyed_item(value, meta, keyed, existing) {
                            if let Some(m) = self.top_mut()?.member.as_mut() {
                                m.items.push(item);
                            }
                        }
                        Ok(())
                    }
                }
            }
        }
    }

    /// Build a collection item, enforcing and registering keys for dictionaries.
    fn keyed_item(&mut self, value: Value, meta: Delivered, keyed: bool, existing: Vec<String>) -> Option<Item> {
        if !keyed {
            return Some(Item { value, key: None });
        }
        let Some(key) = meta.key.or(meta.name) else {
            self.report(XamlError::assignment("dictionary items need an x:Key"));
            return None;
        };
        if existing.contains(&key) {
            self.report(XamlError::assignment("duplicate dictionary key").with_name(key));
            return None;
        }
        self.register_resource(key.clone(), value.clone());
        Some(Item { value, key: Some(key) })
    }

    /// Finish the session.
    pub fn finish(mut self) -> Construction {
        if let Some(fatal) = self.fatal.take() {
            self.errors.push(fatal.0);
            return Construction::Failed(self.errors);
        }
        if self.recording.is_some() || self.stack.depth() > self.base_depth {
            let open = self.stack.depth() - self.base_depth;
            self.report(XamlError::stack(format!("document ended with {open} open element(s)")));
            return Construction::Failed(self.errors);
        }

        self.retry_pending(|_| true);
        if self.seal_scope {
            self.name_scope.seal();
        }
        debug!(
            objects = self.graph.len(),
            errors = self.errors.len(),
            "construction finished"
        );

        let root = match self.root.take() {
            Some(root) if !self.root_faulted => root,
            Some(_) => return Construction::Failed(self.errors),
            None => {
                self.report(XamlError::assignment("document has no root element"));
                return Construction::Failed(self.errors);
            }
        };
        let tree = ObjectTree {
            graph: self.graph,
            root,
            name_scope: self.name_scope,
        };
        if self.errors.is_empty() {
            Construction::Complete(tree)
        } else {
            Construction::Partial(tree, self.errors)
        }
    }
}

fn owner_items(graph: &ObjectGraph, owner: ObjectId) -> Vec<String> {
    graph
        .node(owner)
        .items
        .iter()
        .filter_map(|i| i.key.clone())
        .collect()
}
