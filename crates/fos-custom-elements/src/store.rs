//! Registry store
//!
//! One-to-one indices from local name and from constructor to definition.
//! Definitions are never removed.

use std::collections::HashMap;
use std::rc::Rc;

use crate::definition::{Definition, ElementClass};

/// Constructor identity: address of the class allocation
fn constructor_key(class: &Rc<dyn ElementClass>) -> usize {
    Rc::as_ptr(class) as *const () as usize
}

#[derive(Debug, Default)]
pub(crate) struct DefinitionStore {
    by_local_name: HashMap<String, Rc<Definition>>,
    by_constructor: HashMap<usize, Rc<Definition>>,
}

impl DefinitionStore {
    /// Insert a definition. Callers check both keys are free first.
    pub(crate) fn set_definition(&mut self, definition: Rc<Definition>) {
        self.by_constructor
            .insert(constructor_key(definition.class()), definition.clone());
        self.by_local_name
            .insert(definition.local_name().to_string(), definition);
    }

    pub(crate) fn by_local_name(&self, local_name: &str) -> Option<Rc<Definition>> {
        self.by_local_name.get(local_name).cloned()
    }

    pub(crate) fn by_constructor(&self, class: &Rc<dyn ElementClass>) -> Option<Rc<Definition>> {
        self.by_constructor.get(&constructor_key(class)).cloned()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_local_name.len()
    }
}
