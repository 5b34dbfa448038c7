//! Upgrade engine
//!
//! Upgrading is two-phase: the engine binds the element to the definition's
//! construction stack, then the user constructor runs against that existing
//! element and hands it back through [`Construction::element`].

use std::collections::HashSet;
use std::rc::Rc;

use crate::definition::{Construction, LifecycleCallback, StackEntry};
use crate::dom::is_import_link;
use crate::error::UpgradeError;
use crate::internals::{CustomElementInternals, ImportContinuation};
use crate::walker::walk_deep_descendant_elements;
use crate::NodeId;

/// Per-element upgrade function used by tree walks
///
/// Shared so that import continuations can run it again once the import
/// document loads.
pub type UpgradeFn = Rc<dyn Fn(NodeId) -> Result<(), UpgradeError>>;

/// Options for [`CustomElementInternals::patch_and_upgrade_tree`]
#[derive(Default)]
pub struct TreeOptions<'a> {
    /// Import documents already walked; shared across re-entrant walks
    pub visited_imports: Option<&'a mut HashSet<NodeId>>,
    /// Replaces [`CustomElementInternals::upgrade_element`], here and in the
    /// walks of imports that load later
    pub upgrade: Option<UpgradeFn>,
}

impl CustomElementInternals {
    /// Upgrade `element` if a definition matches it
    ///
    /// Construction failures mark the element failed for good and are
    /// returned. Callback failures after construction leave it custom.
    pub fn upgrade_element(&self, element: NodeId) -> Result<(), UpgradeError> {
        if self.element_state(element).is_some() {
            return Ok(());
        }

        let document = self.dom.owner_document(element);
        if !self.dom.has_browsing_context(document)
            && !(self.is_import_document(document) && self.has_registry(document))
        {
            return Ok(());
        }

        let Some(local_name) = self.dom.local_name(element) else {
            return Ok(());
        };
        let Some(definition) = self.local_name_to_definition(&local_name) else {
            return Ok(());
        };

        definition.push_construction(element);
        let result = definition
            .class()
            .construct(&Construction::new(&definition, self));
        let entry = definition.pop_construction();

        let failure = match result {
            Ok(instance)
                if instance == element && entry == Some(StackEntry::AlreadyConstructed) =>
            {
                None
            }
            Ok(_) => Some(UpgradeError::ConstructionMismatch {
                element,
                local_name: local_name.clone(),
            }),
            Err(source) => Some(UpgradeError::Constructor {
                element: Some(element),
                local_name: local_name.clone(),
                source,
            }),
        };
        if let Some(error) = failure {
            self.set_failed(element);
            tracing::warn!("Upgrade of <{}> failed: {}", local_name, error);
            return Err(error);
        }

        self.set_custom(element, definition.clone());
        tracing::trace!("Upgraded <{}> {:?}", local_name, element);

        if definition.has_callback(LifecycleCallback::AttributeChanged) {
            for name in definition.observed_attributes() {
                if let Some(value) = self.dom.attribute(element, name) {
                    self.attribute_changed_callback(element, name, None, Some(&value), None)?;
                }
            }
        }

        if self.dom.is_connected(element) {
            self.connected_callback(element)?;
        }
        Ok(())
    }

    /// Patch and upgrade every element under `root`
    ///
    /// Import links are not upgraded; their documents are walked in place
    /// when loaded, or once on [`Self::import_loaded`] otherwise. Every
    /// element gets its chance even when an earlier one fails: the first
    /// failure is returned and the rest are reported.
    pub fn patch_and_upgrade_tree(
        &self,
        root: NodeId,
        options: TreeOptions<'_>,
    ) -> Result<(), UpgradeError> {
        match options.upgrade {
            Some(upgrade) => {
                let mut each = |element: NodeId| upgrade(element);
                let deferred = Some(upgrade.clone());
                self.walk_and_upgrade(root, options.visited_imports, &mut each, deferred)
            }
            None => {
                let mut each = |element: NodeId| self.upgrade_element(element);
                self.walk_and_upgrade(root, options.visited_imports, &mut each, None)
            }
        }
    }

    /// Walk body behind [`Self::patch_and_upgrade_tree`]
    ///
    /// `upgrade` runs for the elements found now; `deferred` is what import
    /// continuations run later (`None` for the default upgrade).
    pub(crate) fn walk_and_upgrade(
        &self,
        root: NodeId,
        visited_imports: Option<&mut HashSet<NodeId>>,
        upgrade: &mut dyn FnMut(NodeId) -> Result<(), UpgradeError>,
        deferred: Option<UpgradeFn>,
    ) -> Result<(), UpgradeError> {
        let mut own_visited = HashSet::new();
        let visited = visited_imports.unwrap_or(&mut own_visited);

        let dom = &*self.dom;
        let mut elements = Vec::new();
        let mut links = Vec::new();
        walk_deep_descendant_elements(dom, root, visited, |element| {
            if is_import_link(dom, element) {
                links.push(element);
            } else {
                elements.push(element);
            }
        });

        for link in links {
            self.gather_import(link, visited, deferred.as_ref());
        }

        if self.has_patches() {
            for &element in &elements {
                self.patch(element);
            }
        }

        let mut first = None;
        for element in elements {
            self.keep_first(&mut first, upgrade(element));
        }
        first.map_or(Ok(()), Err)
    }

    fn gather_import(
        &self,
        link: NodeId,
        visited: &HashSet<NodeId>,
        upgrade: Option<&UpgradeFn>,
    ) {
        let import = self.dom.import_document(link);
        if let Some(document) = import {
            self.mark_import_document(document);
        }

        match import {
            Some(document) if self.dom.is_loaded(document) => {
                self.set_load_handled(document);
            }
            _ => {
                tracing::trace!("Waiting for import {:?} to load", link);
                self.import_listeners
                    .borrow_mut()
                    .entry(link)
                    .or_default()
                    .push(ImportContinuation {
                        visited_imports: visited.clone(),
                        upgrade: upgrade.cloned(),
                    });
            }
        }
    }

    /// Load event of an import link: walk its document once
    pub fn import_loaded(&self, link: NodeId) -> Result<(), UpgradeError> {
        let continuations = self
            .import_listeners
            .borrow_mut()
            .remove(&link)
            .unwrap_or_default();

        let mut first = None;
        for continuation in continuations {
            let Some(import) = self.dom.import_document(link) else {
                continue;
            };
            if !self.set_load_handled(import) {
                continue;
            }
            self.mark_import_document(import);

            let mut visited = continuation.visited_imports;
            visited.remove(&import);
            tracing::debug!("Import {:?} loaded, walking {:?}", link, import);
            let result = self.patch_and_upgrade_tree(
                import,
                TreeOptions {
                    visited_imports: Some(&mut visited),
                    upgrade: continuation.upgrade,
                },
            );
            self.keep_first(&mut first, result);
        }
        first.map_or(Ok(()), Err)
    }

    /// Number of import links with a pending load continuation
    pub fn pending_imports(&self) -> usize {
        self.import_listeners.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{CustomElementClass, Definition, Lifecycle};
    use crate::dom::DomAccess;
    use crate::error::ScriptError;
    use crate::internals::ElementState;
    use crate::tree::DomTree;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn setup() -> (Rc<DomTree>, CustomElementInternals) {
        let tree = Rc::new(DomTree::new());
        let doc = tree.document();
        let internals =
            CustomElementInternals::new(tree.clone(), doc, Rc::new(|_: &UpgradeError| {}));
        (tree, internals)
    }

    fn define(internals: &CustomElementInternals, name: &str, class: CustomElementClass) {
        let lifecycle = Lifecycle::read(&class).unwrap();
        internals.set_definition(Rc::new(Definition::new(name, Rc::new(class), lifecycle)));
    }

    #[test]
    fn test_upgrade_without_definition_is_noop() {
        let (tree, internals) = setup();
        let el = tree.create_element(tree.document(), "x-foo");
        internals.upgrade_element(el).unwrap();
        assert_eq!(internals.element_state(el), None);
    }

    #[test]
    fn test_upgrade_sets_custom() {
        let (tree, internals) = setup();
        define(&internals, "x-foo", CustomElementClass::new());
        let el = tree.create_element(tree.document(), "x-foo");

        internals.upgrade_element(el).unwrap();
        assert_eq!(internals.element_state(el), Some(ElementState::Custom));
        assert_eq!(internals.definition_of(el).unwrap().local_name(), "x-foo");
        assert_eq!(internals.definition_of(el).unwrap().construction_depth(), 0);
    }

    #[test]
    fn test_constructor_error_marks_failed() {
        let (tree, internals) = setup();
        let attempts = Rc::new(RefCell::new(0));
        let counter = attempts.clone();
        define(
            &internals,
            "x-bad",
            CustomElementClass::new().constructor(move |_| {
                *counter.borrow_mut() += 1;
                Err(ScriptError::new("nope"))
            }),
        );
        let el = tree.create_element(tree.document(), "x-bad");

        let err = internals.upgrade_element(el).unwrap_err();
        assert!(matches!(err, UpgradeError::Constructor { .. }));
        assert_eq!(internals.element_state(el), Some(ElementState::Failed));
        assert!(internals.definition_of(el).is_none());

        // Never retried
        internals.upgrade_element(el).unwrap();
        assert_eq!(*attempts.borrow(), 1);
    }

    #[test]
    fn test_skipping_super_is_a_mismatch() {
        let (tree, internals) = setup();
        let doc = tree.document();
        // Returns the right node without going through the construction step
        let target = Rc::new(RefCell::new(NodeId::NONE));
        let captured = target.clone();
        define(
            &internals,
            "x-sneaky",
            CustomElementClass::new().constructor(move |_| Ok(*captured.borrow())),
        );
        let el = tree.create_element(doc, "x-sneaky");
        *target.borrow_mut() = el;

        let err = internals.upgrade_element(el).unwrap_err();
        assert!(matches!(err, UpgradeError::ConstructionMismatch { .. }));
        assert_eq!(internals.element_state(el), Some(ElementState::Failed));
    }

    #[test]
    fn test_document_without_browsing_context() {
        let (tree, internals) = setup();
        define(&internals, "x-foo", CustomElementClass::new());
        let inert = tree.create_document(false);
        let el = tree.create_element(inert, "x-foo");

        internals.upgrade_element(el).unwrap();
        assert_eq!(internals.element_state(el), None);

        // Import documents tied to a registry are exempt
        internals.mark_import_document(inert);
        internals.upgrade_element(el).unwrap();
        assert_eq!(internals.element_state(el), Some(ElementState::Custom));
    }

    #[test]
    fn test_custom_upgrade_function() {
        let (tree, internals) = setup();
        let doc = tree.document();
        let a = tree.create_element(doc, "x-a");
        let b = tree.create_element(doc, "x-b");
        tree.append_child(doc, a);
        tree.append_child(a, b);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let upgrade: UpgradeFn = Rc::new(move |element| {
            sink.borrow_mut().push(element);
            Ok(())
        });
        internals
            .patch_and_upgrade_tree(
                doc,
                TreeOptions {
                    visited_imports: None,
                    upgrade: Some(upgrade),
                },
            )
            .unwrap();
        assert_eq!(*seen.borrow(), vec![a, b]);
    }

    #[test]
    fn test_import_continuation_keeps_upgrade_function() {
        let (tree, internals) = setup();
        define(&internals, "x-foo", CustomElementClass::new());
        let doc = tree.document();
        let link = tree.create_element(doc, "link");
        tree.set_attribute(link, "rel", "import");
        tree.append_child(doc, link);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let upgrade: UpgradeFn = Rc::new(move |element| {
            sink.borrow_mut().push(element);
            Ok(())
        });
        internals
            .patch_and_upgrade_tree(
                doc,
                TreeOptions {
                    visited_imports: None,
                    upgrade: Some(upgrade),
                },
            )
            .unwrap();
        assert!(seen.borrow().is_empty());

        let import = tree.create_document(false);
        let el = tree.create_element(import, "x-foo");
        tree.append_child(import, el);
        tree.set_import(link, import);
        tree.set_loaded(import, true);
        internals.import_loaded(link).unwrap();

        // The walk's own function ran, not the default upgrade
        assert_eq!(*seen.borrow(), vec![el]);
        assert_eq!(internals.element_state(el), None);
    }

    #[test]
    fn test_direct_upgrade_patches_element() {
        let (tree, internals) = setup();
        internals.add_patch(Rc::new(|_: NodeId| {}));
        define(&internals, "x-foo", CustomElementClass::new());
        let el = tree.create_element(tree.document(), "x-foo");

        internals.upgrade_element(el).unwrap();
        assert!(internals.is_patched(el));
    }

    #[test]
    fn test_walk_continues_past_failures() {
        let reported = Rc::new(RefCell::new(Vec::new()));
        let sink = reported.clone();
        let tree = Rc::new(DomTree::new());
        let doc = tree.document();
        let internals = CustomElementInternals::new(
            tree.clone(),
            doc,
            Rc::new(move |e: &UpgradeError| sink.borrow_mut().push(e.element())),
        );
        define(
            &internals,
            "x-bad",
            CustomElementClass::new().constructor(|_| Err(ScriptError::new("nope"))),
        );
        define(&internals, "x-good", CustomElementClass::new());

        let bad1 = tree.create_element(doc, "x-bad");
        let good = tree.create_element(doc, "x-good");
        let bad2 = tree.create_element(doc, "x-bad");
        for el in [bad1, good, bad2] {
            tree.append_child(doc, el);
        }

        let err = internals.patch_and_upgrade_tree(doc, TreeOptions::default()).unwrap_err();
        assert_eq!(err.element(), Some(bad1));
        assert_eq!(*reported.borrow(), vec![Some(bad2)]);
        assert_eq!(internals.element_state(good), Some(ElementState::Custom));
        assert_eq!(internals.element_state(bad2), Some(ElementState::Failed));
    }

    #[test]
    fn test_import_links_are_not_upgraded() {
        let (tree, internals) = setup();
        internals.add_patch(Rc::new(|_: NodeId| {}));
        let doc = tree.document();
        let link = tree.create_element(doc, "link");
        let div = tree.create_element(doc, "div");
        tree.set_attribute(link, "rel", "import");
        tree.append_child(doc, link);
        tree.append_child(doc, div);

        internals.patch_and_upgrade_tree(doc, TreeOptions::default()).unwrap();
        assert_eq!(internals.pending_imports(), 1);
        assert!(!internals.is_patched(link));
        assert!(internals.is_patched(div));
    }
}
