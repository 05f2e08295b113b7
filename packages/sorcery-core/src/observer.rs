//! Observer traits and the lists holding them.
//!
//! Every callback has an empty default so implementors only override the
//! events they care about. Callbacks run synchronously on the thread that
//! performed the operation.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::object::ObjectRef;

/// Process level events raised by the [`Registry`](crate::Registry).
pub trait GlobalObserver: Send + Sync {
    fn instance_created(&self, _instance: &str) {}
    fn instance_destroying(&self, _instance: &str) {}
    fn wizard_registered(&self, _backend: &str) {}
    fn wizard_unregistering(&self, _backend: &str) {}
}

/// Events of one [`Sorcery`](crate::Sorcery) instance.
pub trait InstanceObserver: Send + Sync {
    fn instance_loading(&self, _instance: &str, _reloaded: bool) {}
    fn instance_loaded(&self, _instance: &str, _reloaded: bool) {}
    fn wizard_mapped(&self, _instance: &str, _type_name: &str, _backend: &str, _args: &str) {}
    fn object_type_registered(&self, _instance: &str, _type_name: &str) {}
    fn object_type_loading(&self, _instance: &str, _type_name: &str, _reloaded: bool) {}
    fn object_type_loaded(&self, _instance: &str, _type_name: &str, _reloaded: bool) {}
}

/// Load events of one backend kind, across all instances.
pub trait WizardObserver: Send + Sync {
    fn wizard_loading(&self, _backend: &str, _type_name: &str, _reloaded: bool) {}
    fn wizard_loaded(&self, _backend: &str, _type_name: &str, _reloaded: bool) {}
}

/// Object events of one object type.
pub trait ObjectObserver: Send + Sync {
    fn created(&self, _object: &ObjectRef) {}
    fn updated(&self, _object: &ObjectRef) {}
    fn deleted(&self, _object: &ObjectRef) {}
    fn loaded(&self, _type_name: &str) {}
}

/// Copy-on-write observer list. Notification iterates a snapshot, so
/// observers may add or remove observers from inside a callback.
pub(crate) struct ObserverList<O: ?Sized> {
    observers: ArcSwap<Vec<Arc<O>>>,
}

impl<O: ?Sized> ObserverList<O> {
    pub(crate) fn new() -> Self {
        Self {
            observers: ArcSwap::from_pointee(Vec::new()),
        }
    }

    pub(crate) fn add(&self, observer: Arc<O>) {
        self.observers.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(Arc::clone(&observer));
            next
        });
    }

    /// Removes `observer` by identity. Returns `false` if it was not present.
    pub(crate) fn remove(&self, observer: &Arc<O>) -> bool {
        let mut removed = false;
        self.observers.rcu(|current| {
            let mut next = Vec::clone(current);
            let before = next.len();
            next.retain(|o| !std::ptr::addr_eq(Arc::as_ptr(o), Arc::as_ptr(observer)));
            removed = next.len() != before;
            next
        });
        removed
    }

    pub(crate) fn notify(&self, mut event: impl FnMut(&O)) {
        let snapshot = self.observers.load_full();
        for observer in snapshot.iter() {
            event(&**observer);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.observers.load().len()
    }
}

impl<O: ?Sized> Default for ObserverList<O> {
    fn default() -> Self {
        Self::new()
    }
}
