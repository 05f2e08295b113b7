//! Process wide service holding backend kinds, global observers and the
//! live instances by module name.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};

use super::memory::MemoryFactory;
use super::BackendFactory;
use crate::config::RegistryConfig;
use crate::error::{Result, SorceryError};
use crate::observer::{GlobalObserver, ObserverList, WizardObserver};
use crate::sorcery::Sorcery;

/// Registry of backend kinds and open instances.
///
/// The built-in `memory` backend is always registered.
pub struct Registry {
    config: RegistryConfig,
    factories: RwLock<HashMap<String, Arc<dyn BackendFactory>>>,
    wizard_observers: RwLock<HashMap<String, Arc<ObserverList<dyn WizardObserver>>>>,
    observers: ObserverList<dyn GlobalObserver>,
    instances: RwLock<HashMap<String, Weak<Sorcery>>>,
}

impl Registry {
    /// Creates a registry with the built-in backends.
    pub fn new(config: RegistryConfig) -> Arc<Self> {
        let registry = Self {
            config,
            factories: RwLock::new(HashMap::new()),
            wizard_observers: RwLock::new(HashMap::new()),
            observers: ObserverList::new(),
            instances: RwLock::new(HashMap::new()),
        };
        if let Err(err) = registry.register_backend(Arc::new(MemoryFactory)) {
            tracing::error!("Failed to register built-in memory backend: {}", err);
        }
        Arc::new(registry)
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Registers a backend kind under its factory name.
    ///
    /// # Returns
    /// `Err(SorceryError::BackendAlreadyRegistered)` if the name is taken.
    pub fn register_backend(&self, factory: Arc<dyn BackendFactory>) -> Result<()> {
        let name = factory.name().to_string();
        {
            let mut factories = self
                .factories
                .write()
                .map_err(|_| SorceryError::LockPoisoned)?;
            if factories.contains_key(&name) {
                return Err(SorceryError::BackendAlreadyRegistered(name));
            }
            factories.insert(name.clone(), factory);
        }
        self.wizard_observers
            .write()
            .map_err(|_| SorceryError::LockPoisoned)?
            .insert(name.clone(), Arc::new(ObserverList::new()));

        tracing::debug!("Registered backend '{}'", name);
        self.observers.notify(|o| o.wizard_registered(&name));
        Ok(())
    }

    /// Removes a backend kind. Existing mappings keep their opened backends.
    pub fn unregister_backend(&self, name: &str) -> Result<()> {
        if !self.has_backend(name) {
            return Err(SorceryError::BackendNotFound(name.to_string()));
        }
        self.observers.notify(|o| o.wizard_unregistering(name));

        self.factories
            .write()
            .map_err(|_| SorceryError::LockPoisoned)?
            .remove(name);
        self.wizard_observers
            .write()
            .map_err(|_| SorceryError::LockPoisoned)?
            .remove(name);
        tracing::debug!("Unregistered backend '{}'", name);
        Ok(())
    }

    pub fn has_backend(&self, name: &str) -> bool {
        self.factories
            .read()
            .map(|f| f.contains_key(name))
            .unwrap_or(false)
    }

    /// Registered backend names, sorted.
    pub fn backend_names(&self) -> Vec<String> {
        let mut names: Vec<String> = match self.factories.read() {
            Ok(factories) => factories.keys().cloned().collect(),
            Err(_) => return Vec::new(),
        };
        names.sort();
        names
    }

    pub(crate) fn factory(&self, name: &str) -> Result<Arc<dyn BackendFactory>> {
        let factories = self
            .factories
            .read()
            .map_err(|_| SorceryError::LockPoisoned)?;
        factories
            .get(name)
            .cloned()
            .ok_or_else(|| SorceryError::BackendNotFound(name.to_string()))
    }

    pub fn add_observer(&self, observer: Arc<dyn GlobalObserver>) {
        self.observers.add(observer);
    }

    pub fn remove_observer(&self, observer: &Arc<dyn GlobalObserver>) -> bool {
        self.observers.remove(observer)
    }

    pub(crate) fn global_observers(&self) -> &ObserverList<dyn GlobalObserver> {
        &self.observers
    }

    /// Observes loads performed by one backend kind.
    pub fn add_wizard_observer(
        &self,
        backend: &str,
        observer: Arc<dyn WizardObserver>,
    ) -> Result<()> {
        self.wizard_observer_list(backend)?.add(observer);
        Ok(())
    }

    pub fn remove_wizard_observer(
        &self,
        backend: &str,
        observer: &Arc<dyn WizardObserver>,
    ) -> Result<bool> {
        Ok(self.wizard_observer_list(backend)?.remove(observer))
    }

    pub(crate) fn wizard_observer_list(
        &self,
        backend: &str,
    ) -> Result<Arc<ObserverList<dyn WizardObserver>>> {
        self.wizard_observers
            .read()
            .map_err(|_| SorceryError::LockPoisoned)?
            .get(backend)
            .cloned()
            .ok_or_else(|| SorceryError::BackendNotFound(backend.to_string()))
    }

    /// Opens the instance for `module`, or returns the live one.
    ///
    /// # Arguments
    /// * `module` - Module (instance) name
    ///
    /// # Returns
    /// A shared handle. The instance is destroyed when the last handle drops.
    pub fn open(self: &Arc<Self>, module: &str) -> Result<Arc<Sorcery>> {
        let mut instances = self
            .instances
            .write()
            .map_err(|_| SorceryError::LockPoisoned)?;
        if let Some(existing) = instances.get(module).and_then(Weak::upgrade) {
            tracing::debug!("Reusing instance '{}'", module);
            return Ok(existing);
        }

        let sorcery = Arc::new(Sorcery::new(Arc::clone(self), module));
        instances.insert(module.to_string(), Arc::downgrade(&sorcery));
        drop(instances);

        tracing::debug!("Opened instance '{}'", module);
        self.observers.notify(|o| o.instance_created(module));
        Ok(sorcery)
    }

    /// The live instance for `module`, if any.
    pub fn retrieve_by_module_name(&self, module: &str) -> Option<Arc<Sorcery>> {
        self.instances
            .read()
            .ok()?
            .get(module)
            .and_then(Weak::upgrade)
    }

    /// Drops the bookkeeping of a destroyed instance.
    pub(crate) fn forget_instance(&self, module: &str) {
        if let Ok(mut instances) = self.instances.write() {
            if instances
                .get(module)
                .is_some_and(|weak| weak.strong_count() == 0)
            {
                instances.remove(module);
            }
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("config", &self.config)
            .field("backends", &self.backend_names())
            .field("global_observers", &self.observers.len())
            .finish()
    }
}
