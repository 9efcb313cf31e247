//! The shared name scope.
//!
//! Inserts are append-only. A name may be registered before its element
//! exists: such entries point at a [`DeferredElementCreator`] and are realized
//! on first lookup. The lock is never held while a creator replays, so a
//! replay may itself look names up in the scope.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::graph::{ElementRef, ObjectId};
use crate::saved::DeferredElementCreator;
use crate::tracing_macros::trace;

#[derive(Clone)]
enum NameEntry {
    Document(ObjectId),
    Deferred(Arc<DeferredElementCreator>),
}

/// Result of a name lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum NameLookup {
    /// An object of the graph this scope was built with.
    Document(ObjectId),
    /// An object realized from a deferred creator.
    Element(ElementRef),
    /// Not resolvable yet; ask again later.
    Pending,
    /// The name does not exist and never will.
    NotFound,
}

impl NameLookup {
    /// Returns true if the lookup should be retried later.
    pub fn should_retry(&self) -> bool {
        matches!(self, NameLookup::Pending)
    }
}

/// A second registration of an existing name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateName(pub String);

impl fmt::Display for DuplicateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "name '{}' is already declared in this scope", self.0)
    }
}

impl std::error::Error for DuplicateName {}

/// Maps declared names to elements.
#[derive(Default)]
pub struct NameScope {
    entries: Mutex<HashMap<String, NameEntry>>,
    sealed: AtomicBool,
}

impl fmt::Debug for NameScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NameScope")
            .field("names", &self.names())
            .field("sealed", &self.is_sealed())
            .finish()
    }
}

impl NameScope {
    /// An empty, open scope.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, NameEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, name: &str, entry: NameEntry) -> Result<(), DuplicateName> {
        let mut entries = self.lock();
        if entries.contains_key(name) {
            return Err(DuplicateName(name.to_owned()));
        }
        entries.insert(name.to_owned(), entry);
        Ok(())
    }

    /// Bind `name` to a constructed object.
    pub fn register(&self, name: &str, id: ObjectId) -> Result<(), DuplicateName> {
        trace!(name, id = %id, "register name");
        self.insert(name, NameEntry::Document(id))
    }

    /// Bind `name` to an element that a creator will realize on demand.
    pub fn register_deferred(
        &self,
        name: &str,
        creator: Arc<DeferredElementCreator>,
    ) -> Result<(), DuplicateName> {
        trace!(name, "register deferred name");
        self.insert(name, NameEntry::Deferred(creator))
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    /// All registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Mark the declaring document complete: missing names stop being pending.
    pub fn seal(&self) {
        self.sealed.store(true, Ordering::Release);
    }

    /// Whether the declaring document is complete.
    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    /// Look a name up, realizing deferred elements as needed.
    pub fn find_name(&self, name: &str) -> NameLookup {
        let entry = self.lock().get(name).cloned();
        match entry {
            Some(NameEntry::Document(id)) => NameLookup::Document(id),
            Some(NameEntry::Deferred(creator)) => creator.find(name),
            None if self.is_sealed() => NameLookup::NotFound,
            None => NameLookup::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facet_testhelpers::test;

    #[test]
    fn append_only() {
        let scope = NameScope::new();
        scope.register("a", ObjectId(0)).unwrap();
        assert_eq!(
            scope.register("a", ObjectId(1)),
            Err(DuplicateName("a".into()))
        );
        assert_eq!(scope.find_name("a"), NameLookup::Document(ObjectId(0)));
    }

    #[test]
    fn missing_names_are_pending_until_sealed() {
        let scope = NameScope::new();
        assert!(scope.find_name("later").should_retry());
        scope.register("later", ObjectId(3)).unwrap();
        assert_eq!(scope.find_name("later"), NameLookup::Document(ObjectId(3)));
        scope.seal();
        assert_eq!(scope.find_name("never"), NameLookup::NotFound);
    }
}
