//! Custom Element Registry
//!
//! `define`, `get`, `upgrade` and `whenDefined`, plus the flush coordinator:
//! definitions registered since the last flush are queued, and a single
//! scheduled flush walks the document once to catch every one of them up.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::config::{FlushCallback, FlushTrigger, RegistryConfig};
use crate::definition::{Construction, Definition, ElementClass, Lifecycle};
use crate::dom::DomAccess;
use crate::error::{DefinitionError, UpgradeError};
use crate::internals::CustomElementInternals;
use crate::name::is_valid_custom_element_name;
use crate::upgrade::TreeOptions;
use crate::when_defined::{Deferred, WhenDefined};
use crate::NodeId;

struct RegistryState {
    /// Definitions registered since the last flush, in registration order
    pending: VecDeque<Rc<Definition>>,
    flush_pending: bool,
    definition_running: bool,
    when_defined: HashMap<String, Deferred>,
    flush_callback: FlushCallback,
}

/// Custom elements registry bound to one document
pub struct CustomElementRegistry {
    this: Weak<CustomElementRegistry>,
    internals: CustomElementInternals,
    state: RefCell<RegistryState>,
}

impl CustomElementRegistry {
    /// Create the registry for `document`
    pub fn new(dom: Rc<dyn DomAccess>, document: NodeId, config: RegistryConfig) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            this: this.clone(),
            internals: CustomElementInternals::new(dom, document, config.error_reporter()),
            state: RefCell::new(RegistryState {
                pending: VecDeque::new(),
                flush_pending: false,
                definition_running: false,
                when_defined: HashMap::new(),
                flush_callback: config.flush_callback(),
            }),
        })
    }

    /// Engine core for DOM mutation glue
    pub fn internals(&self) -> &CustomElementInternals {
        &self.internals
    }

    /// Define a custom element
    pub fn define(&self, name: &str, class: Rc<dyn ElementClass>) -> Result<(), DefinitionError> {
        if !class.is_constructor() {
            return Err(DefinitionError::NotAConstructor);
        }
        if !is_valid_custom_element_name(name) {
            return Err(DefinitionError::InvalidName(name.to_string()));
        }
        if self.internals.local_name_to_definition(name).is_some() {
            return Err(DefinitionError::AlreadyDefined(name.to_string()));
        }
        if let Some(existing) = self.internals.constructor_to_definition(&class) {
            return Err(DefinitionError::ConstructorInUse(existing.local_name().to_string()));
        }

        {
            let mut state = self.state.borrow_mut();
            if state.definition_running {
                return Err(DefinitionError::Reentrant);
            }
            state.definition_running = true;
        }
        // Member lookups run user code, so no borrow is held across them.
        let lifecycle = Lifecycle::read(&*class);
        self.state.borrow_mut().definition_running = false;
        let lifecycle = lifecycle?;

        let definition = Rc::new(Definition::new(name, class, lifecycle));
        self.internals.set_definition(definition.clone());
        tracing::debug!("Defined custom element <{}>", name);

        let schedule = {
            let mut state = self.state.borrow_mut();
            state.pending.push_back(definition);
            if state.flush_pending {
                None
            } else {
                state.flush_pending = true;
                Some(state.flush_callback.clone())
            }
        };
        if let Some(flush_callback) = schedule {
            let this = self.this.clone();
            flush_callback(Box::new(move || {
                if let Some(registry) = this.upgrade() {
                    registry.flush();
                }
            }));
        }
        Ok(())
    }

    /// Constructor registered under `name`
    pub fn get(&self, name: &str) -> Option<Rc<dyn ElementClass>> {
        self.internals
            .local_name_to_definition(name)
            .map(|d| d.class().clone())
    }

    /// Full definition registered under `name`
    pub fn get_definition(&self, name: &str) -> Option<Rc<Definition>> {
        self.internals.local_name_to_definition(name)
    }

    /// Upgrade every eligible element under `root` now
    pub fn upgrade(&self, root: NodeId) -> Result<(), UpgradeError> {
        self.internals.patch_and_upgrade_tree(root, TreeOptions::default())
    }

    /// Future resolving once `name`'s catch-up pass completes
    pub fn when_defined(&self, name: &str) -> WhenDefined {
        if !is_valid_custom_element_name(name) {
            return WhenDefined::rejected(DefinitionError::InvalidName(name.to_string()));
        }

        let mut state = self.state.borrow_mut();
        if let Some(prior) = state.when_defined.get(name) {
            return prior.future();
        }

        let deferred = Deferred::new();
        let stable = self.internals.local_name_to_definition(name).is_some()
            && !state.pending.iter().any(|d| d.local_name() == name);
        if stable {
            deferred.resolve();
        }
        state.when_defined.insert(name.to_string(), deferred.clone());
        deferred.future()
    }

    /// Replace the flush scheduling strategy
    pub fn set_flush_callback(&self, callback: impl Fn(FlushTrigger) + 'static) {
        self.state.borrow_mut().flush_callback = Rc::new(callback);
    }

    /// Chain `outer` around the current strategy: `outer` decides when the
    /// current strategy sees the flush
    pub fn wrap_flush_callback(&self, outer: impl Fn(FlushTrigger) + 'static) {
        let mut state = self.state.borrow_mut();
        let inner = state.flush_callback.clone();
        state.flush_callback = Rc::new(move |flush: FlushTrigger| {
            let inner = inner.clone();
            outer(Box::new(move || inner(flush)));
        });
    }

    pub fn is_flush_pending(&self) -> bool {
        self.state.borrow().flush_pending
    }

    /// Names registered but not yet flushed, in registration order
    pub fn pending_names(&self) -> Vec<String> {
        self.state
            .borrow()
            .pending
            .iter()
            .map(|d| d.local_name().to_string())
            .collect()
    }

    /// Run the scheduled flush now. No-op when none is pending.
    pub fn flush(&self) {
        let batch: Vec<Rc<Definition>> = {
            let mut state = self.state.borrow_mut();
            if !state.flush_pending {
                return;
            }
            state.flush_pending = false;
            state.pending.iter().cloned().collect()
        };
        tracing::debug!("Flushing {} custom element definition(s)", batch.len());

        let internals = &self.internals;
        let mut buckets: HashMap<String, Vec<NodeId>> = batch
            .iter()
            .map(|d| (d.local_name().to_string(), Vec::new()))
            .collect();

        {
            let mut upgrade = |element: NodeId| -> Result<(), UpgradeError> {
                if internals.element_state(element).is_some() {
                    return Ok(());
                }
                let Some(local_name) = internals.dom().local_name(element) else {
                    return Ok(());
                };
                if let Some(bucket) = buckets.get_mut(&local_name) {
                    bucket.push(element);
                    Ok(())
                } else if internals.local_name_to_definition(&local_name).is_some() {
                    internals.upgrade_element(element)
                } else {
                    Ok(())
                }
            };
            // Imports that load after this flush use the default upgrade
            let result = internals.walk_and_upgrade(internals.document(), None, &mut upgrade, None);
            if let Err(error) = result {
                internals.report(&error);
            }
        }

        for definition in batch {
            if !self.take_pending(&definition) {
                // Already handled by a flush nested inside this one
                continue;
            }
            let name = definition.local_name();
            for element in buckets.remove(name).unwrap_or_default() {
                if let Err(error) = internals.upgrade_element(element) {
                    internals.report(&error);
                }
            }
            let deferred = self.state.borrow().when_defined.get(name).cloned();
            if let Some(deferred) = deferred {
                deferred.resolve();
            }
            tracing::debug!("Custom element <{}> caught up", name);
        }
    }

    fn take_pending(&self, definition: &Rc<Definition>) -> bool {
        let mut state = self.state.borrow_mut();
        match state.pending.iter().position(|d| Rc::ptr_eq(d, definition)) {
            Some(index) => {
                state.pending.remove(index);
                true
            }
            None => false,
        }
    }

    fn is_instance_of(&self, element: NodeId, definition: &Rc<Definition>) -> bool {
        self.internals
            .definition_of(element)
            .is_some_and(|d| Rc::ptr_eq(&d, definition))
    }

    /// Create an element as `document.createElement` would: defined names
    /// run their constructor directly, others get a patched plain element
    pub fn create_element(&self, local_name: &str) -> Result<NodeId, UpgradeError> {
        let Some(definition) = self.internals.local_name_to_definition(local_name) else {
            let element = self
                .internals
                .dom()
                .create_element(self.internals.document(), local_name);
            self.internals.patch(element);
            return Ok(element);
        };

        let result = definition
            .class()
            .construct(&Construction::new(&definition, &self.internals));
        match result {
            Ok(element) if self.is_instance_of(element, &definition) => Ok(element),
            Ok(element) => Err(UpgradeError::ConstructionMismatch {
                element,
                local_name: local_name.to_string(),
            }),
            Err(source) => Err(UpgradeError::Constructor {
                element: None,
                local_name: local_name.to_string(),
                source,
            }),
        }
    }
}

impl fmt::Debug for CustomElementRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("CustomElementRegistry")
            .field("internals", &self.internals)
            .field("pending", &state.pending.len())
            .field("flush_pending", &state.flush_pending)
            .field("when_defined", &state.when_defined.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::CustomElementClass;
    use crate::tree::DomTree;

    fn registry() -> (Rc<DomTree>, Rc<CustomElementRegistry>) {
        let tree = Rc::new(DomTree::new());
        let registry =
            CustomElementRegistry::new(tree.clone(), tree.document(), RegistryConfig::default());
        (tree, registry)
    }

    #[test]
    fn test_define() {
        let (_, registry) = registry();
        let class = CustomElementClass::new().into_class();

        assert!(registry.define("my-element", class.clone()).is_ok());
        assert!(Rc::ptr_eq(&registry.get("my-element").unwrap(), &class));

        // Duplicate
        assert_eq!(
            registry.define("my-element", CustomElementClass::new().into_class()),
            Err(DefinitionError::AlreadyDefined("my-element".into()))
        );
        // Same constructor under another name
        assert_eq!(
            registry.define("other-element", class),
            Err(DefinitionError::ConstructorInUse("my-element".into()))
        );
    }

    #[test]
    fn test_define_validation_order() {
        let (_, registry) = registry();
        assert_eq!(
            registry.define("bad", CustomElementClass::not_constructor().into_class()),
            Err(DefinitionError::NotAConstructor)
        );
        assert_eq!(
            registry.define("bad", CustomElementClass::new().into_class()),
            Err(DefinitionError::InvalidName("bad".into()))
        );
        assert!(registry.get("bad").is_none());
    }

    #[test]
    fn test_synchronous_flush_by_default() {
        let (_, registry) = registry();
        registry
            .define("x-foo", CustomElementClass::new().into_class())
            .unwrap();
        assert!(!registry.is_flush_pending());
        assert!(registry.pending_names().is_empty());
    }

    #[test]
    fn test_create_element() {
        let (tree, registry) = registry();
        registry
            .define("x-foo", CustomElementClass::new().into_class())
            .unwrap();

        let custom = registry.create_element("x-foo").unwrap();
        assert_eq!(tree.local_name(custom).as_deref(), Some("x-foo"));
        assert!(registry.internals().definition_of(custom).is_some());

        let plain = registry.create_element("x-bar").unwrap();
        assert!(registry.internals().definition_of(plain).is_none());
        assert_eq!(registry.internals().element_state(plain), None);
    }

    #[test]
    fn test_debug_output() {
        let (_, registry) = registry();
        let debug = format!("{:?}", registry);
        assert!(debug.starts_with("CustomElementRegistry"));
    }
}
