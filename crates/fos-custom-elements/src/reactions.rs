//! Reaction dispatcher
//!
//! Lifecycle callbacks for elements that are already custom, and the subtree
//! operations DOM mutation glue calls on insertion, removal, cloning and
//! adoption.

use std::collections::HashSet;

use crate::definition::{LifecycleCallback, Reaction};
use crate::error::UpgradeError;
use crate::internals::{CustomElementInternals, ElementState};
use crate::upgrade::TreeOptions;
use crate::walker::walk_deep_descendant_elements;
use crate::NodeId;

impl CustomElementInternals {
    fn invoke(&self, reaction: &Reaction<'_>) -> Result<(), UpgradeError> {
        let element = reaction.element();
        let Some(definition) = self.definition_of(element) else {
            return Ok(());
        };
        let kind = reaction.callback();
        let Some(callback) = definition.callback(kind).cloned() else {
            return Ok(());
        };

        tracing::trace!("{} on <{}> {:?}", kind.member_name(), definition.local_name(), element);
        callback(reaction).map_err(|source| UpgradeError::Reaction {
            element,
            local_name: definition.local_name().to_string(),
            callback: kind.member_name(),
            source,
        })
    }

    pub fn connected_callback(&self, element: NodeId) -> Result<(), UpgradeError> {
        self.invoke(&Reaction::Connected { element })
    }

    pub fn disconnected_callback(&self, element: NodeId) -> Result<(), UpgradeError> {
        self.invoke(&Reaction::Disconnected { element })
    }

    pub fn adopted_callback(
        &self,
        element: NodeId,
        old_document: NodeId,
        new_document: NodeId,
    ) -> Result<(), UpgradeError> {
        self.invoke(&Reaction::Adopted {
            element,
            old_document,
            new_document,
        })
    }

    /// Fire `attributeChangedCallback` if `name` is observed
    pub fn attribute_changed_callback(
        &self,
        element: NodeId,
        name: &str,
        old_value: Option<&str>,
        new_value: Option<&str>,
        namespace: Option<&str>,
    ) -> Result<(), UpgradeError> {
        let observed = self
            .definition_of(element)
            .is_some_and(|d| d.is_observed(name));
        if !observed {
            return Ok(());
        }
        self.invoke(&Reaction::AttributeChanged {
            element,
            name,
            old_value,
            new_value,
            namespace,
        })
    }

    fn elements_under(&self, root: NodeId) -> Vec<NodeId> {
        let mut elements = Vec::new();
        walk_deep_descendant_elements(&*self.dom, root, &mut HashSet::new(), |e| elements.push(e));
        elements
    }

    /// `root` became connected: connect custom elements, upgrade the rest
    pub fn connect_tree(&self, root: NodeId) -> Result<(), UpgradeError> {
        let mut first = None;
        for element in self.elements_under(root) {
            let result = if self.element_state(element) == Some(ElementState::Custom) {
                self.connected_callback(element)
            } else {
                self.upgrade_element(element)
            };
            self.keep_first(&mut first, result);
        }
        first.map_or(Ok(()), Err)
    }

    /// `root` was disconnected
    pub fn disconnect_tree(&self, root: NodeId) -> Result<(), UpgradeError> {
        let mut first = None;
        for element in self.elements_under(root) {
            if self.element_state(element) == Some(ElementState::Custom) {
                let result = self.disconnected_callback(element);
                self.keep_first(&mut first, result);
            }
        }
        first.map_or(Ok(()), Err)
    }

    // ------------------------------------------------------------------
    // Mutation hooks
    // ------------------------------------------------------------------

    /// `node` was inserted somewhere
    pub fn node_inserted(&self, node: NodeId) -> Result<(), UpgradeError> {
        if self.dom.is_connected(node) {
            self.connect_tree(node)
        } else {
            Ok(())
        }
    }

    /// `node` was removed from a connected parent
    pub fn node_removed(&self, node: NodeId) -> Result<(), UpgradeError> {
        self.disconnect_tree(node)
    }

    /// `clone` was produced by `cloneNode` or `importNode`
    pub fn node_cloned(&self, clone: NodeId) -> Result<(), UpgradeError> {
        let document = self.dom.owner_document(clone);
        if self.has_registry(document) {
            self.patch_and_upgrade_tree(clone, TreeOptions::default())
        } else {
            self.patch_tree(clone);
            Ok(())
        }
    }

    /// `root` moved from `old_document` to `new_document`
    pub fn node_adopted(
        &self,
        root: NodeId,
        old_document: NodeId,
        new_document: NodeId,
    ) -> Result<(), UpgradeError> {
        if old_document == new_document {
            return Ok(());
        }
        let mut first = None;
        for element in self.elements_under(root) {
            let result = self.adopted_callback(element, old_document, new_document);
            self.keep_first(&mut first, result);
        }
        first.map_or(Ok(()), Err)
    }

    /// An attribute of `element` changed
    pub fn attribute_changed(
        &self,
        element: NodeId,
        name: &str,
        old_value: Option<&str>,
        new_value: Option<&str>,
        namespace: Option<&str>,
    ) -> Result<(), UpgradeError> {
        self.attribute_changed_callback(element, name, old_value, new_value, namespace)
    }
}
