//! Saved construction contexts and the deferred content built from them.
//!
//! Templates and `x:Load="False"` elements are not constructed in place.
//! Their events are recorded together with a [`SavedContext`], a snapshot of
//! the writer stack and resources at the point of deferral. Replaying the
//! events through a writer resumed from that context produces the same
//! shape as inline construction would have.

use std::collections::HashMap;
use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use xaml_schema::{Directive, SchemaContext, TypeIndex};

use crate::error::{FatalError, XamlError};
use crate::event::{RecordedEvent, XamlEvent};
use crate::graph::{ElementRef, Value};
use crate::namescope::{NameLookup, NameScope};
use crate::settings::WriterSettings;
use crate::stack::{Frame, WriterStack};
use crate::tracing_macros::{debug, trace};
use crate::writer::{Construction, MemberKind, ObjectTree, ObjectWriter, member_kind, resolve_member};

/// Content hash of a recorded event sequence.
pub fn hash_events(events: &[RecordedEvent]) -> u64 {
    let mut hasher = DefaultHasher::new();
    for recorded in events {
        recorded.event.hash(&mut hasher);
    }
    hasher.finish()
}

/// A snapshot of construction state sufficient to resume later.
#[derive(Clone)]
pub struct SavedContext {
    schema: Arc<SchemaContext>,
    frames: Vec<Frame>,
    base_uri: Option<String>,
    resource_uri: Option<String>,
    markup_hash: u64,
    resources: Arc<HashMap<String, Value>>,
    settings: WriterSettings,
}

impl fmt::Debug for SavedContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SavedContext")
            .field("depth", &self.frames.len())
            .field("base_uri", &self.base_uri)
            .field("resource_uri", &self.resource_uri)
            .field("markup_hash", &self.markup_hash)
            .field("resources", &self.resources.len())
            .finish_non_exhaustive()
    }
}

impl SavedContext {
    /// Snapshot `stack` without disturbing it.
    pub fn capture(
        stack: &WriterStack,
        schema: &Arc<SchemaContext>,
        settings: &WriterSettings,
        resources: Arc<HashMap<String, Value>>,
        markup_hash: u64,
    ) -> Self {
        Self::from_frames(stack.snapshot(), schema, settings, resources, markup_hash)
    }

    pub(crate) fn from_frames(
        frames: Vec<Frame>,
        schema: &Arc<SchemaContext>,
        settings: &WriterSettings,
        resources: Arc<HashMap<String, Value>>,
        markup_hash: u64,
    ) -> Self {
        let mut settings = settings.clone();
        settings.name_scope = None;
        Self {
            schema: Arc::clone(schema),
            frames,
            base_uri: settings.base_uri.clone(),
            resource_uri: settings.resource_uri.clone(),
            markup_hash,
            resources,
            settings,
        }
    }

    /// The schema the context was captured with.
    pub fn schema(&self) -> &Arc<SchemaContext> {
        &self.schema
    }

    /// Captured frames, bottom up.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Number of captured frames.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Base URI at capture time.
    pub fn base_uri(&self) -> Option<&str> {
        self.base_uri.as_deref()
    }

    /// Resource URI at capture time.
    pub fn resource_uri(&self) -> Option<&str> {
        self.resource_uri.as_deref()
    }

    /// Content hash of the markup the context belongs to.
    pub fn markup_hash(&self) -> u64 {
        self.markup_hash
    }

    /// Resources visible at capture time.
    pub fn resources(&self) -> &Arc<HashMap<String, Value>> {
        &self.resources
    }

    pub(crate) fn settings(&self) -> &WriterSettings {
        &self.settings
    }

    fn replay(&self, events: &[RecordedEvent], scope: Arc<NameScope>) -> Construction {
        match ObjectWriter::resume(self, scope).replay(events) {
            Ok(construction) => construction,
            Err(FatalError(error)) => Construction::Failed(vec![error]),
        }
    }
}

/// Recorded content of a deferred property, such as a template.
pub struct TemplateContent {
    saved: SavedContext,
    events: Vec<RecordedEvent>,
}

impl fmt::Debug for TemplateContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateContent")
            .field("events", &self.events.len())
            .field("saved", &self.saved)
            .finish()
    }
}

impl TemplateContent {
    pub(crate) fn new(saved: SavedContext, events: Vec<RecordedEvent>) -> Self {
        Self { saved, events }
    }

    /// The recorded events.
    pub fn events(&self) -> &[RecordedEvent] {
        &self.events
    }

    /// The context the events are replayed in.
    pub fn saved(&self) -> &SavedContext {
        &self.saved
    }

    /// Construct a fresh instance of the content.
    ///
    /// Every call builds a new graph with its own name scope.
    pub fn load_content(&self) -> Construction {
        trace!(events = self.events.len(), "loading template content");
        self.saved.replay(&self.events, Arc::new(NameScope::new()))
    }
}

/// A realized deferred element.
#[derive(Debug)]
struct Realized {
    root: ElementRef,
    scope: Arc<NameScope>,
    errors: Vec<XamlError>,
}

/// Realizes an `x:Load="False"` element on first demand.
pub struct DeferredElementCreator {
    saved: SavedContext,
    events: Vec<RecordedEvent>,
    realized: OnceLock<Result<Realized, Vec<XamlError>>>,
    in_progress: AtomicBool,
}

impl fmt::Debug for DeferredElementCreator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredElementCreator")
            .field("events", &self.events.len())
            .field("realized", &self.is_realized())
            .finish()
    }
}

impl DeferredElementCreator {
    pub(crate) fn new(saved: SavedContext, events: Vec<RecordedEvent>) -> Self {
        Self {
            saved,
            events,
            realized: OnceLock::new(),
            in_progress: AtomicBool::new(false),
        }
    }

    /// The recorded events.
    pub fn events(&self) -> &[RecordedEvent] {
        &self.events
    }

    /// The context the events are replayed in.
    pub fn saved(&self) -> &SavedContext {
        &self.saved
    }

    /// Whether the element has been realized (successfully or not).
    pub fn is_realized(&self) -> bool {
        self.realized.get().is_some()
    }

    /// Diagnostics from realization; empty before it happens.
    pub fn errors(&self) -> &[XamlError] {
        match self.realized.get() {
            Some(Ok(realized)) => &realized.errors,
            Some(Err(errors)) => errors,
            None => &[],
        }
    }

    /// Realize the element, or return it if already realized.
    ///
    /// Returns the element and whether the caller should retry later. A
    /// retry is requested only while another caller is realizing; once
    /// realization finished every call returns the same element.
    pub fn try_get_or_create_element(&self) -> (Option<ElementRef>, bool) {
        if let Some(done) = self.realized.get() {
            return Self::outcome(done);
        }
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            trace!("deferred element is being realized elsewhere");
            return (None, true);
        }
        if self.realized.get().is_none() {
            let result = self.realize();
            // We hold the flag, so nobody else can have set it.
            let _ = self.realized.set(result);
        }
        self.in_progress.store(false, Ordering::Release);
        match self.realized.get() {
            Some(done) => Self::outcome(done),
            None => (None, true),
        }
    }

    fn outcome(done: &Result<Realized, Vec<XamlError>>) -> (Option<ElementRef>, bool) {
        match done {
            Ok(realized) => (Some(realized.root.clone()), false),
            Err(_) => (None, false),
        }
    }

    fn realize(&self) -> Result<Realized, Vec<XamlError>> {
        debug!(events = self.events.len(), "realizing deferred element");
        let scope = Arc::new(NameScope::new());
        let (tree, errors) = match self.saved.replay(&self.events, Arc::clone(&scope)) {
            Construction::Complete(tree) => (tree, Vec::new()),
            Construction::Partial(tree, errors) => (tree, errors),
            Construction::Failed(errors) => return Err(errors),
        };
        let ObjectTree { graph, root, .. } = tree;
        match root {
            Value::Object(id) => Ok(Realized {
                root: ElementRef::new(Arc::new(graph), id),
                scope,
                errors,
            }),
            _ => Err(vec![XamlError::assignment(
                "deferred element did not produce an object",
            )]),
        }
    }

    /// Find `name` inside the element, realizing it first.
    pub(crate) fn find(&self, name: &str) -> NameLookup {
        let (root, retry) = self.try_get_or_create_element();
        let Some(root) = root else {
            return if retry {
                NameLookup::Pending
            } else {
                NameLookup::NotFound
            };
        };
        let Some(Ok(realized)) = self.realized.get() else {
            return NameLookup::NotFound;
        };
        match realized.scope.find_name(name) {
            NameLookup::Document(id) => NameLookup::Element(ElementRef::new(Arc::clone(root.graph()), id)),
            NameLookup::Pending => NameLookup::NotFound,
            other => other,
        }
    }
}

/// Names declared by a recorded element, outside of any deferred content.
///
/// Names inside templates belong to each template instance, not to the
/// scope the element is registered in.
pub(crate) fn harvest_names(schema: &SchemaContext, events: &[RecordedEvent]) -> Vec<String> {
    enum Scope {
        Object {
            ty: Option<TypeIndex>,
            xmlns: String,
            deferred: bool,
        },
        Member {
            name: bool,
            deferred: bool,
        },
    }

    let mut names = Vec::new();
    let mut stack: Vec<Scope> = Vec::new();
    for recorded in events {
        match &recorded.event {
            XamlEvent::Namespace { .. } => {}
            XamlEvent::StartObject { namespace, name } => {
                let deferred = match stack.last() {
                    Some(Scope::Member { deferred, .. }) => *deferred,
                    Some(Scope::Object { ty, deferred, .. }) => {
                        *deferred
                            || ty
                                .and_then(|t| schema.content_property(t))
                                .is_some_and(|p| p.deferred)
                    }
                    None => false,
                };
                let ty = schema.resolve_type(namespace, name).ok().map(|d| d.index);
                stack.push(Scope::Object {
                    ty,
                    xmlns: namespace.to_string(),
                    deferred,
                });
            }
            XamlEvent::StartMember(member) => {
                let Some(Scope::Object { ty, xmlns, deferred }) = stack.last() else {
                    stack.push(Scope::Member {
                        name: false,
                        deferred: true,
                    });
                    continue;
                };
                let scope = match member_kind(member) {
                    Some(MemberKind::Directive(Directive::Name)) => Scope::Member {
                        name: true,
                        deferred: *deferred,
                    },
                    Some(_) => Scope::Member {
                        name: false,
                        deferred: *deferred,
                    },
                    None => {
                        let prop_deferred = ty
                            .and_then(|t| resolve_member(schema, t, xmlns, member).ok())
                            .is_some_and(|p| p.deferred);
                        Scope::Member {
                            name: false,
                            deferred: *deferred || prop_deferred,
                        }
                    }
                };
                stack.push(scope);
            }
            XamlEvent::Value(value) => {
                if let Some(Scope::Member {
                    name: true,
                    deferred: false,
                }) = stack.last()
                {
                    names.push(value.as_str().trim().to_owned());
                }
            }
            XamlEvent::EndMember | XamlEvent::EndObject => {
                stack.pop();
            }
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::MemberName;
    use facet_testhelpers::test;
    use xaml_schema::{PropertyDef, SchemaBuilder, TypeDef, TypeNamespace, XAML_NAMESPACE};

    const UI: &str = "urn:ui";

    fn schema() -> Arc<SchemaContext> {
        let mut b = SchemaBuilder::new();
        let asm = b.add_assembly("Ui");
        let ns = TypeNamespace::new(asm, "Ui");
        b.register_namespace(UI, &ns);
        let known = b.well_known();
        let panel = b
            .add_type(TypeDef::object(&ns, "Panel").with_content_property("Child"))
            .unwrap();
        b.add_property(panel, PropertyDef::new("Child", known.object))
            .unwrap();
        b.add_property(panel, PropertyDef::new("Template", known.object).deferred())
            .unwrap();
        b.build().unwrap()
    }

    fn ev(event: XamlEvent<'static>) -> RecordedEvent {
        RecordedEvent {
            event,
            position: None,
        }
    }

    fn name(value: &'static str) -> Vec<RecordedEvent> {
        vec![
            ev(XamlEvent::StartMember(MemberName::qualified(XAML_NAMESPACE, "Name"))),
            ev(XamlEvent::text(value)),
            ev(XamlEvent::EndMember),
        ]
    }

    #[test]
    fn names_inside_templates_are_not_harvested() {
        let schema = schema();
        let mut events = vec![ev(XamlEvent::start_object(UI, "Panel"))];
        events.extend(name("outer"));
        events.push(ev(XamlEvent::start_member("Template")));
        events.push(ev(XamlEvent::start_object(UI, "Panel")));
        events.extend(name("templated"));
        events.push(ev(XamlEvent::EndObject));
        events.push(ev(XamlEvent::EndMember));
        events.push(ev(XamlEvent::start_object(UI, "Panel")));
        events.extend(name("inner"));
        events.push(ev(XamlEvent::EndObject));
        events.push(ev(XamlEvent::EndObject));

        assert_eq!(harvest_names(&schema, &events), vec!["outer", "inner"]);
    }

    #[test]
    fn hashes_follow_content() {
        let a = vec![ev(XamlEvent::start_object(UI, "Panel")), ev(XamlEvent::EndObject)];
        let b = vec![ev(XamlEvent::start_object(UI, "Other")), ev(XamlEvent::EndObject)];
        assert_eq!(hash_events(&a), hash_events(&a.clone()));
        assert_ne!(hash_events(&a), hash_events(&b));
    }
}
