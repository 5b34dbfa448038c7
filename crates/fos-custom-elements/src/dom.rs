//! DOM access capability
//!
//! The engine never touches a concrete tree. Hosts expose their DOM through
//! [`DomAccess`]; [`crate::DomTree`] is the in-memory implementation.

use crate::NodeId;

/// Node kinds the engine distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    DocumentFragment,
    Element,
    Text,
    Comment,
}

/// Read access to a live DOM, plus element creation
///
/// Implementations use interior mutability: user callbacks run while the
/// engine holds a shared reference and may mutate the tree through their own
/// handle. A node id may only be reused after the engine was told through
/// [`crate::CustomElementInternals::node_destroyed`].
pub trait DomAccess {
    /// Kind of `node`, or `None` for a dead handle
    fn kind(&self, node: NodeId) -> Option<NodeKind>;

    /// Local name of an element
    fn local_name(&self, element: NodeId) -> Option<String>;

    /// Attribute value of an element (null namespace)
    fn attribute(&self, element: NodeId, name: &str) -> Option<String>;

    fn parent(&self, node: NodeId) -> Option<NodeId>;

    fn first_child(&self, node: NodeId) -> Option<NodeId>;

    fn next_sibling(&self, node: NodeId) -> Option<NodeId>;

    /// Shadow root attached to `element`, closed roots included
    fn shadow_root(&self, element: NodeId) -> Option<NodeId>;

    /// Host of a shadow root
    fn shadow_host(&self, root: NodeId) -> Option<NodeId>;

    /// Owner document (a document is its own owner)
    fn owner_document(&self, node: NodeId) -> NodeId;

    /// Whether the document has a browsing context (a `defaultView`)
    fn has_browsing_context(&self, document: NodeId) -> bool;

    /// Document referenced by an import link, if one exists yet
    fn import_document(&self, link: NodeId) -> Option<NodeId>;

    /// Whether the document finished loading (`readyState == "complete"`)
    fn is_loaded(&self, document: NodeId) -> bool;

    /// Create a plain, unattached element owned by `document`
    fn create_element(&self, document: NodeId, local_name: &str) -> NodeId;

    /// Whether `node` is in a document, crossing shadow boundaries
    fn is_connected(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(node) = current {
            if self.kind(node) == Some(NodeKind::Document) {
                return true;
            }
            current = self.parent(node).or_else(|| self.shadow_host(node));
        }
        false
    }

    /// Children of `node` in tree order
    fn children(&self, node: NodeId) -> Vec<NodeId> {
        let mut children = Vec::new();
        let mut child = self.first_child(node);
        while let Some(id) = child {
            children.push(id);
            child = self.next_sibling(id);
        }
        children
    }
}

/// Whether `element` is `<link rel="import">`
pub fn is_import_link(dom: &dyn DomAccess, element: NodeId) -> bool {
    dom.local_name(element).as_deref() == Some("link")
        && dom.attribute(element, "rel").as_deref() == Some("import")
}
