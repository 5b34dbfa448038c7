//! Custom element internals
//!
//! Shared engine state: the definition store, per-node side tables, element
//! patches and the error sink. The upgrade engine (`upgrade.rs`) and the
//! reaction dispatcher (`reactions.rs`) extend [`CustomElementInternals`].

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use crate::config::ErrorReporter;
use crate::definition::{Definition, ElementClass};
use crate::dom::DomAccess;
use crate::error::UpgradeError;
use crate::store::DefinitionStore;
use crate::upgrade::UpgradeFn;
use crate::walker::walk_deep_descendant_elements;
use crate::NodeId;

/// Element patch applied once per element before its first upgrade chance
pub type ElementPatch = Rc<dyn Fn(NodeId)>;

/// Upgrade state of an element. No entry means never attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementState {
    /// Construction threw or produced the wrong element; never retried
    Failed,
    /// Upgraded; the definition is attached
    Custom,
}

#[derive(Default)]
struct ElementRecord {
    state: Option<ElementState>,
    definition: Option<Rc<Definition>>,
    patched: bool,
}

#[derive(Debug, Default)]
struct DocumentRecord {
    is_import_document: bool,
    has_registry: bool,
    load_handled: bool,
}

/// Walk continuation attached to an import link that has not loaded yet
pub(crate) struct ImportContinuation {
    pub(crate) visited_imports: HashSet<NodeId>,
    /// Upgrade function of the walk that attached it
    pub(crate) upgrade: Option<UpgradeFn>,
}

/// Engine core shared by the registry and DOM mutation glue
pub struct CustomElementInternals {
    pub(crate) dom: Rc<dyn DomAccess>,
    document: NodeId,
    store: RefCell<DefinitionStore>,
    elements: RefCell<HashMap<NodeId, ElementRecord>>,
    documents: RefCell<HashMap<NodeId, DocumentRecord>>,
    patches: RefCell<Vec<ElementPatch>>,
    pub(crate) import_listeners: RefCell<HashMap<NodeId, Vec<ImportContinuation>>>,
    reporter: ErrorReporter,
}

impl CustomElementInternals {
    pub(crate) fn new(dom: Rc<dyn DomAccess>, document: NodeId, reporter: ErrorReporter) -> Self {
        let internals = Self {
            dom,
            document,
            store: RefCell::new(DefinitionStore::default()),
            elements: RefCell::new(HashMap::new()),
            documents: RefCell::new(HashMap::new()),
            patches: RefCell::new(Vec::new()),
            import_listeners: RefCell::new(HashMap::new()),
            reporter,
        };
        internals.document_record(document, |r| r.has_registry = true);
        internals
    }

    pub fn dom(&self) -> &Rc<dyn DomAccess> {
        &self.dom
    }

    /// Document the registry belongs to
    pub fn document(&self) -> NodeId {
        self.document
    }

    // ------------------------------------------------------------------
    // Definitions
    // ------------------------------------------------------------------

    pub(crate) fn set_definition(&self, definition: Rc<Definition>) {
        self.store.borrow_mut().set_definition(definition);
    }

    pub fn local_name_to_definition(&self, local_name: &str) -> Option<Rc<Definition>> {
        self.store.borrow().by_local_name(local_name)
    }

    pub fn constructor_to_definition(
        &self,
        class: &Rc<dyn ElementClass>,
    ) -> Option<Rc<Definition>> {
        self.store.borrow().by_constructor(class)
    }

    pub fn definition_count(&self) -> usize {
        self.store.borrow().len()
    }

    // ------------------------------------------------------------------
    // Element side table
    // ------------------------------------------------------------------

    pub fn element_state(&self, element: NodeId) -> Option<ElementState> {
        self.elements.borrow().get(&element).and_then(|r| r.state)
    }

    /// Definition attached to a custom element
    pub fn definition_of(&self, element: NodeId) -> Option<Rc<Definition>> {
        self.elements
            .borrow()
            .get(&element)
            .filter(|r| r.state == Some(ElementState::Custom))
            .and_then(|r| r.definition.clone())
    }

    pub(crate) fn set_failed(&self, element: NodeId) {
        let mut elements = self.elements.borrow_mut();
        let record = elements.entry(element).or_default();
        record.state = Some(ElementState::Failed);
        record.definition = None;
    }

    pub(crate) fn set_custom(&self, element: NodeId, definition: Rc<Definition>) {
        let mut elements = self.elements.borrow_mut();
        let record = elements.entry(element).or_default();
        record.state = Some(ElementState::Custom);
        record.definition = Some(definition);
    }

    /// Create a fresh custom element for a direct construction
    pub(crate) fn create_custom_element(&self, definition: &Rc<Definition>) -> NodeId {
        let element = self.dom.create_element(self.document, definition.local_name());
        self.set_custom(element, definition.clone());
        self.patch(element);
        tracing::trace!("Constructed <{}> directly as {:?}", definition.local_name(), element);
        element
    }

    /// Forget everything recorded for `node`
    ///
    /// Hosts that reuse node ids call this when a node is destroyed, so the
    /// next node under that id starts out untouched.
    pub fn node_destroyed(&self, node: NodeId) {
        self.elements.borrow_mut().remove(&node);
        self.import_listeners.borrow_mut().remove(&node);
        if node != self.document {
            self.documents.borrow_mut().remove(&node);
        }
    }

    // ------------------------------------------------------------------
    // Patches
    // ------------------------------------------------------------------

    /// Register a patch for every element the engine walks from now on
    pub fn add_patch(&self, patch: ElementPatch) {
        self.patches.borrow_mut().push(patch);
    }

    pub fn has_patches(&self) -> bool {
        !self.patches.borrow().is_empty()
    }

    pub fn is_patched(&self, element: NodeId) -> bool {
        self.elements.borrow().get(&element).is_some_and(|r| r.patched)
    }

    /// Apply the registered patches to `element` once
    pub fn patch(&self, element: NodeId) {
        {
            let mut elements = self.elements.borrow_mut();
            let record = elements.entry(element).or_default();
            if record.patched {
                return;
            }
            record.patched = true;
        }
        let patches = self.patches.borrow().clone();
        for patch in patches {
            patch(element);
        }
    }

    /// Patch every element under `root` without upgrading
    pub fn patch_tree(&self, root: NodeId) {
        if !self.has_patches() {
            return;
        }
        let mut elements = Vec::new();
        walk_deep_descendant_elements(&*self.dom, root, &mut HashSet::new(), |e| elements.push(e));
        for element in elements {
            self.patch(element);
        }
    }

    // ------------------------------------------------------------------
    // Document side table
    // ------------------------------------------------------------------

    fn document_record<R>(&self, document: NodeId, f: impl FnOnce(&mut DocumentRecord) -> R) -> R {
        f(self.documents.borrow_mut().entry(document).or_default())
    }

    pub fn has_registry(&self, document: NodeId) -> bool {
        self.documents.borrow().get(&document).is_some_and(|r| r.has_registry)
    }

    pub fn is_import_document(&self, document: NodeId) -> bool {
        self.documents
            .borrow()
            .get(&document)
            .is_some_and(|r| r.is_import_document)
    }

    pub(crate) fn mark_import_document(&self, document: NodeId) {
        self.document_record(document, |r| {
            r.is_import_document = true;
            r.has_registry = true;
        });
    }

    pub fn is_load_handled(&self, document: NodeId) -> bool {
        self.documents.borrow().get(&document).is_some_and(|r| r.load_handled)
    }

    /// Set the load-handled flag. Returns `false` if it was already set.
    pub(crate) fn set_load_handled(&self, document: NodeId) -> bool {
        self.document_record(document, |r| !std::mem::replace(&mut r.load_handled, true))
    }

    // ------------------------------------------------------------------
    // Errors
    // ------------------------------------------------------------------

    pub fn report(&self, error: &UpgradeError) {
        (self.reporter)(error);
    }

    /// Keep the first failure for the caller and report the rest
    pub(crate) fn keep_first(
        &self,
        first: &mut Option<UpgradeError>,
        result: Result<(), UpgradeError>,
    ) {
        if let Err(error) = result {
            if first.is_none() {
                *first = Some(error);
            } else {
                self.report(&error);
            }
        }
    }
}

impl fmt::Debug for CustomElementInternals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomElementInternals")
            .field("document", &self.document)
            .field("definitions", &self.definition_count())
            .field("elements", &self.elements.borrow().len())
            .field("patches", &self.patches.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::DomTree;
    use std::cell::Cell;

    fn internals() -> (Rc<DomTree>, CustomElementInternals) {
        let tree = Rc::new(DomTree::new());
        let doc = tree.document();
        let internals =
            CustomElementInternals::new(tree.clone(), doc, Rc::new(|_: &UpgradeError| {}));
        (tree, internals)
    }

    #[test]
    fn test_registry_document_marked() {
        let (tree, internals) = internals();
        assert!(internals.has_registry(tree.document()));
        assert!(!internals.is_import_document(tree.document()));
    }

    #[test]
    fn test_patch_applied_once() {
        let (tree, internals) = internals();
        let count = Rc::new(Cell::new(0));
        let counter = count.clone();
        internals.add_patch(Rc::new(move |_: NodeId| counter.set(counter.get() + 1)));

        let el = tree.create_element(tree.document(), "div");
        assert!(!internals.is_patched(el));
        internals.patch(el);
        internals.patch(el);
        assert!(internals.is_patched(el));
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_patch_tree() {
        let (tree, internals) = internals();
        let count = Rc::new(Cell::new(0));
        let counter = count.clone();
        internals.add_patch(Rc::new(move |_: NodeId| counter.set(counter.get() + 1)));

        let doc = tree.document();
        let a = tree.create_element(doc, "a");
        let b = tree.create_element(doc, "b");
        tree.append_child(doc, a);
        tree.append_child(a, b);

        internals.patch_tree(doc);
        internals.patch_tree(doc);
        assert_eq!(count.get(), 2);
        // Patching does not touch the upgrade state
        assert_eq!(internals.element_state(a), None);
    }

    #[test]
    fn test_node_destroyed_clears_records() {
        let (tree, internals) = internals();
        internals.add_patch(Rc::new(|_: NodeId| {}));
        let el = tree.create_element(tree.document(), "div");
        let import = tree.create_document(false);
        internals.patch(el);
        internals.set_failed(el);
        internals.mark_import_document(import);
        internals.set_load_handled(import);

        internals.node_destroyed(el);
        internals.node_destroyed(import);
        assert_eq!(internals.element_state(el), None);
        assert!(!internals.is_patched(el));
        assert!(!internals.is_import_document(import));
        assert!(!internals.is_load_handled(import));

        // The registry's own document keeps its registry
        internals.node_destroyed(tree.document());
        assert!(internals.has_registry(tree.document()));
    }

    #[test]
    fn test_load_handled_flag() {
        let (tree, internals) = internals();
        let import = tree.create_document(false);
        assert!(internals.set_load_handled(import));
        assert!(!internals.set_load_handled(import));
        assert!(internals.is_load_handled(import));
    }
}
