//! Writer configuration and the collaborators it carries.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use xaml_schema::{SchemaContext, TypeDescriptor, TypeIndex};

use crate::extension::{ExtensionCall, ExtensionTarget};
use crate::graph::{ObjectGraph, ObjectId, Value};
use crate::namescope::NameScope;

/// Resolves resource keys that are not declared in the document.
pub trait ResourceResolver: Send + Sync {
    /// Value for `key`, if the resource exists.
    fn resolve(&self, key: &str) -> Option<Value>;
}

impl<F> ResourceResolver for F
where
    F: Fn(&str) -> Option<Value> + Send + Sync,
{
    fn resolve(&self, key: &str) -> Option<Value> {
        self(key)
    }
}

/// Activates types whose factory names a runtime class.
pub trait Activator: Send + Sync {
    /// Create an instance of `ty` through `runtime_name`.
    fn activate(&self, ty: &TypeDescriptor, runtime_name: &str) -> Result<(), String>;
}

/// Provides values for host-defined markup extensions.
pub trait MarkupExtensionProvider: Send + Sync {
    /// Evaluate one use of the extension.
    fn provide_value(
        &self,
        schema: &SchemaContext,
        call: &ExtensionCall,
        target: Option<&ExtensionTarget>,
    ) -> Result<Value, String>;
}

/// Notified as objects complete.
pub trait ObjectWriterCallbacks: Send + Sync {
    /// `instance` finished construction; `root` is the document root.
    fn on_object_created(&self, graph: &ObjectGraph, root: ObjectId, instance: ObjectId);
}

/// Options for constructing an object graph.
#[derive(Clone)]
pub struct WriterSettings {
    /// Base URI recorded into saved contexts.
    pub base_uri: Option<String>,
    /// Resource URI recorded into saved contexts.
    pub resource_uri: Option<String>,
    /// Space preservation of the root frame.
    pub preserve_whitespace: bool,
    /// Report a second assignment to the same property of one object.
    pub check_duplicate_properties: bool,
    /// Fallback resource lookup.
    pub resources: Option<Arc<dyn ResourceResolver>>,
    /// Activation for named-factory types.
    pub activator: Option<Arc<dyn Activator>>,
    /// Providers for custom extensions, by extension type.
    pub extensions: HashMap<TypeIndex, Arc<dyn MarkupExtensionProvider>>,
    /// Completion notifications.
    pub callbacks: Option<Arc<dyn ObjectWriterCallbacks>>,
    /// Scope that receives `x:Name` registrations; a fresh one when absent.
    pub name_scope: Option<Arc<NameScope>>,
    /// Content hash of the compiled markup; derived from events when absent.
    pub markup_hash: Option<u64>,
}

impl WriterSettings {
    /// Default settings: no collaborators, duplicate checks on.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the base URI.
    pub fn base_uri(mut self, uri: impl Into<String>) -> Self {
        self.base_uri = Some(uri.into());
        self
    }

    /// Set the resource URI.
    pub fn resource_uri(mut self, uri: impl Into<String>) -> Self {
        self.resource_uri = Some(uri.into());
        self
    }

    /// Preserve whitespace in text content from the root down.
    pub fn preserve_whitespace(mut self, preserve: bool) -> Self {
        self.preserve_whitespace = preserve;
        self
    }

    /// Toggle duplicate property detection.
    pub fn check_duplicate_properties(mut self, check: bool) -> Self {
        self.check_duplicate_properties = check;
        self
    }

    /// Install a fallback resource resolver.
    pub fn resources(mut self, resolver: Arc<dyn ResourceResolver>) -> Self {
        self.resources = Some(resolver);
        self
    }

    /// Install an activator.
    pub fn activator(mut self, activator: Arc<dyn Activator>) -> Self {
        self.activator = Some(activator);
        self
    }

    /// Register a provider for a custom extension type.
    pub fn extension(mut self, ty: TypeIndex, provider: Arc<dyn MarkupExtensionProvider>) -> Self {
        self.extensions.insert(ty, provider);
        self
    }

    /// Install completion callbacks.
    pub fn callbacks(mut self, callbacks: Arc<dyn ObjectWriterCallbacks>) -> Self {
        self.callbacks = Some(callbacks);
        self
    }

    /// Register names into an existing scope.
    pub fn name_scope(mut self, scope: Arc<NameScope>) -> Self {
        self.name_scope = Some(scope);
        self
    }

    /// Record a precomputed markup hash.
    pub fn markup_hash(mut self, hash: u64) -> Self {
        self.markup_hash = Some(hash);
        self
    }
}

impl Default for WriterSettings {
    fn default() -> Self {
        Self {
            base_uri: None,
            resource_uri: None,
            preserve_whitespace: false,
            check_duplicate_properties: true,
            resources: None,
            activator: None,
            extensions: HashMap::new(),
            callbacks: None,
            name_scope: None,
            markup_hash: None,
        }
    }
}

impl fmt::Debug for WriterSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriterSettings")
            .field("base_uri", &self.base_uri)
            .field("resource_uri", &self.resource_uri)
            .field("preserve_whitespace", &self.preserve_whitespace)
            .field("check_duplicate_properties", &self.check_duplicate_properties)
            .field("resources", &self.resources.is_some())
            .field("activator", &self.activator.is_some())
            .field("extensions", &self.extensions.len())
            .field("callbacks", &self.callbacks.is_some())
            .field("markup_hash", &self.markup_hash)
            .finish_non_exhaustive()
    }
}
