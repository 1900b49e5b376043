//! Reconciliation between engine-side objects and local handles.
//!
//! Results appear in the engine as a side effect of running commands; there
//! is no push notification. Each tracked collection (experiments, fits,
//! tests) therefore re-enumerates the engine objects of its class on
//! `refresh()`, diffs them against the local accessor-to-handle map, and
//! notifies listeners of what changed. Updates have no event of their own;
//! they always appear as a remove plus an add.
//!
//! Event order within one refresh is: all additions first, then all
//! removals. Observers that need a consistent combined view should treat
//! the whole refresh as one logical step.

use crate::error::RanovaError;
use crate::r_engine::REngine;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    Added(String),
    Removed(String),
}

pub trait RegistryListener: Send + Sync {
    fn on_event(&self, event: &RegistryEvent);
}

pub type ListenerId = usize;

/// What one refresh changed, by accessor expression.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct RefreshOutcome {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

type Factory<T> = Box<dyn Fn(Arc<dyn REngine>, String) -> T + Send + Sync>;

/// Tracks every top-level engine object of one class.
///
/// The map is only replaced wholesale under the write lock; readers always
/// see either the pre-refresh or post-refresh map, never a partially
/// mutated one.
pub struct ObjectRegistry<T> {
    engine: Arc<dyn REngine>,
    class_tag: String,
    make: Factory<T>,
    items: RwLock<HashMap<String, Arc<T>>>,
    listeners: Mutex<Vec<(ListenerId, Arc<dyn RegistryListener>)>>,
    next_listener_id: Mutex<ListenerId>,
}

impl<T> ObjectRegistry<T> {
    pub fn new(
        engine: Arc<dyn REngine>,
        class_tag: impl Into<String>,
        make: impl Fn(Arc<dyn REngine>, String) -> T + Send + Sync + 'static,
    ) -> Self {
        Self {
            engine,
            class_tag: class_tag.into(),
            make: Box::new(make),
            items: RwLock::new(HashMap::new()),
            listeners: Mutex::new(Vec::new()),
            next_listener_id: Mutex::new(0),
        }
    }

    pub fn class_tag(&self) -> &str {
        &self.class_tag
    }

    pub fn add_listener(&self, listener: Arc<dyn RegistryListener>) -> ListenerId {
        let mut next = self.next_listener_id.lock().unwrap();
        let id = *next;
        *next += 1;
        self.listeners.lock().unwrap().push((id, listener));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) {
        self.listeners
            .lock()
            .unwrap()
            .retain(|(listener_id, _)| *listener_id != id);
    }

    fn notify(&self, event: &RegistryEvent) {
        let listeners = self.listeners.lock().unwrap().clone();
        for (_, listener) in listeners {
            listener.on_event(event);
        }
    }

    /// Re-enumerate the engine and reconcile the local map. Existing
    /// handles for surviving accessors are kept, not rebuilt.
    pub fn refresh(&self) -> Result<RefreshOutcome, RanovaError> {
        let remote = self.engine.objects_with_class(&self.class_tag)?;

        let mut outcome = RefreshOutcome::default();
        {
            let mut items = self.items.write().unwrap();
            let mut next = HashMap::with_capacity(remote.len());
            for accessor in &remote {
                match items.remove(accessor) {
                    Some(existing) => {
                        next.insert(accessor.clone(), existing);
                    }
                    None => {
                        let handle =
                            (self.make)(Arc::clone(&self.engine), accessor.clone());
                        next.insert(accessor.clone(), Arc::new(handle));
                        outcome.added.push(accessor.clone());
                    }
                }
            }
            // Whatever is left in the old map no longer exists remotely.
            outcome.removed.extend(items.keys().cloned());
            outcome.removed.sort();
            *items = next;
        }

        for accessor in &outcome.added {
            self.notify(&RegistryEvent::Added(accessor.clone()));
        }
        for accessor in &outcome.removed {
            self.notify(&RegistryEvent::Removed(accessor.clone()));
        }
        Ok(outcome)
    }

    pub fn get(&self, accessor: &str) -> Option<Arc<T>> {
        self.items.read().unwrap().get(accessor).cloned()
    }

    pub fn contains(&self, accessor: &str) -> bool {
        self.items.read().unwrap().contains_key(accessor)
    }

    /// Snapshot of all tracked handles, safe to iterate while a refresh
    /// runs concurrently.
    pub fn items(&self) -> Vec<Arc<T>> {
        self.items.read().unwrap().values().cloned().collect()
    }

    pub fn accessors(&self) -> Vec<String> {
        let mut names: Vec<String> = self.items.read().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.items.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().unwrap().is_empty()
    }
}
