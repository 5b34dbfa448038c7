//! In-memory DOM tree (arena-based allocation)
//!
//! A minimal multi-document tree implementing [`DomAccess`]. Nodes of every
//! document live in one arena; `NodeId::ROOT` is the main document. Interior
//! mutability lets callbacks mutate the tree while the engine walks it.

use std::cell::RefCell;

use crate::dom::{DomAccess, NodeKind};
use crate::NodeId;

/// Arena-based DOM tree
#[derive(Debug)]
pub struct DomTree {
    nodes: RefCell<Vec<Node>>,
}

#[derive(Debug)]
struct Node {
    parent: NodeId,
    first_child: NodeId,
    last_child: NodeId,
    prev_sibling: NodeId,
    next_sibling: NodeId,
    /// Owner document
    document: NodeId,
    data: NodeData,
}

#[derive(Debug)]
enum NodeData {
    Document {
        browsing_context: bool,
        loaded: bool,
    },
    /// Shadow roots and detached fragments
    Fragment { host: NodeId },
    Element(ElementData),
    Text(String),
    Comment(String),
}

#[derive(Debug)]
struct ElementData {
    local_name: String,
    attrs: Vec<(String, String)>,
    shadow_root: NodeId,
    /// Imported document of `<link rel="import">`
    import: NodeId,
}

impl Node {
    fn new(document: NodeId, data: NodeData) -> Self {
        Self {
            parent: NodeId::NONE,
            first_child: NodeId::NONE,
            last_child: NodeId::NONE,
            prev_sibling: NodeId::NONE,
            next_sibling: NodeId::NONE,
            document,
            data,
        }
    }

    fn as_element(&self) -> Option<&ElementData> {
        match &self.data {
            NodeData::Element(e) => Some(e),
            _ => None,
        }
    }

    fn as_element_mut(&mut self) -> Option<&mut ElementData> {
        match &mut self.data {
            NodeData::Element(e) => Some(e),
            _ => None,
        }
    }
}

impl Default for DomTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DomTree {
    /// Create a tree holding one loaded main document with a browsing context
    pub fn new() -> Self {
        let tree = Self {
            nodes: RefCell::new(Vec::new()),
        };
        tree.create_document(true);
        tree
    }

    /// The main document
    pub fn document(&self) -> NodeId {
        NodeId::ROOT
    }

    fn alloc(&self, document: Option<NodeId>, data: NodeData) -> NodeId {
        let mut nodes = self.nodes.borrow_mut();
        let id = NodeId(nodes.len() as u32);
        nodes.push(Node::new(document.unwrap_or(id), data));
        id
    }

    /// Create an additional document. Documents without a browsing context
    /// start out unloaded.
    pub fn create_document(&self, browsing_context: bool) -> NodeId {
        self.alloc(
            None,
            NodeData::Document {
                browsing_context,
                loaded: browsing_context,
            },
        )
    }

    pub fn create_text(&self, document: NodeId, content: &str) -> NodeId {
        self.alloc(Some(document), NodeData::Text(content.to_string()))
    }

    pub fn create_comment(&self, document: NodeId, content: &str) -> NodeId {
        self.alloc(Some(document), NodeData::Comment(content.to_string()))
    }

    pub fn create_fragment(&self, document: NodeId) -> NodeId {
        self.alloc(Some(document), NodeData::Fragment { host: NodeId::NONE })
    }

    /// Attach a shadow root to `host` (or return the existing one)
    pub fn attach_shadow(&self, host: NodeId) -> NodeId {
        if let Some(root) = self.shadow_root(host) {
            return root;
        }
        let document = self.owner_document(host);
        let root = self.alloc(Some(document), NodeData::Fragment { host });
        if let Some(element) = self.nodes.borrow_mut()[host.0 as usize].as_element_mut() {
            element.shadow_root = root;
        }
        root
    }

    /// Append `child` to `parent`, detaching it from its old parent first
    pub fn append_child(&self, parent: NodeId, child: NodeId) {
        self.remove(child);
        let mut nodes = self.nodes.borrow_mut();
        let last = nodes[parent.0 as usize].last_child;
        {
            let node = &mut nodes[child.0 as usize];
            node.parent = parent;
            node.prev_sibling = last;
            node.next_sibling = NodeId::NONE;
        }
        if last.is_valid() {
            nodes[last.0 as usize].next_sibling = child;
        } else {
            nodes[parent.0 as usize].first_child = child;
        }
        nodes[parent.0 as usize].last_child = child;
    }

    /// Detach `child` from its parent
    pub fn remove(&self, child: NodeId) {
        let mut nodes = self.nodes.borrow_mut();
        let (parent, prev, next) = {
            let node = &nodes[child.0 as usize];
            (node.parent, node.prev_sibling, node.next_sibling)
        };
        if !parent.is_valid() {
            return;
        }
        if prev.is_valid() {
            nodes[prev.0 as usize].next_sibling = next;
        } else {
            nodes[parent.0 as usize].first_child = next;
        }
        if next.is_valid() {
            nodes[next.0 as usize].prev_sibling = prev;
        } else {
            nodes[parent.0 as usize].last_child = prev;
        }
        let node = &mut nodes[child.0 as usize];
        node.parent = NodeId::NONE;
        node.prev_sibling = NodeId::NONE;
        node.next_sibling = NodeId::NONE;
    }

    /// Move `node` and its descendants to `document`
    pub fn adopt(&self, node: NodeId, document: NodeId) {
        self.remove(node);
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            let mut nodes = self.nodes.borrow_mut();
            nodes[id.0 as usize].document = document;
            let shadow = nodes[id.0 as usize]
                .as_element()
                .map_or(NodeId::NONE, |e| e.shadow_root);
            let mut child = nodes[id.0 as usize].first_child;
            drop(nodes);
            if shadow.is_valid() {
                stack.push(shadow);
            }
            while child.is_valid() {
                stack.push(child);
                child = self.nodes.borrow()[child.0 as usize].next_sibling;
            }
        }
    }

    /// Set an attribute, returning the previous value
    pub fn set_attribute(&self, element: NodeId, name: &str, value: &str) -> Option<String> {
        let mut nodes = self.nodes.borrow_mut();
        let data = nodes.get_mut(element.0 as usize)?.as_element_mut()?;
        if let Some(attr) = data.attrs.iter_mut().find(|(n, _)| n == name) {
            return Some(std::mem::replace(&mut attr.1, value.to_string()));
        }
        data.attrs.push((name.to_string(), value.to_string()));
        None
    }

    /// Remove an attribute, returning the previous value
    pub fn remove_attribute(&self, element: NodeId, name: &str) -> Option<String> {
        let mut nodes = self.nodes.borrow_mut();
        let data = nodes.get_mut(element.0 as usize)?.as_element_mut()?;
        let index = data.attrs.iter().position(|(n, _)| n == name)?;
        Some(data.attrs.remove(index).1)
    }

    /// Point an import link at its document
    pub fn set_import(&self, link: NodeId, document: NodeId) {
        if let Some(element) = self.nodes.borrow_mut()[link.0 as usize].as_element_mut() {
            element.import = document;
        }
    }

    pub fn set_loaded(&self, document: NodeId, value: bool) {
        let mut nodes = self.nodes.borrow_mut();
        if let NodeData::Document { loaded, .. } = &mut nodes[document.0 as usize].data {
            *loaded = value;
        }
    }

    /// Text content of a text or comment node
    pub fn text(&self, node: NodeId) -> Option<String> {
        match &self.nodes.borrow().get(node.0 as usize)?.data {
            NodeData::Text(s) | NodeData::Comment(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// Number of nodes in the arena
    pub fn len(&self) -> usize {
        self.nodes.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.borrow().is_empty()
    }

    fn link(&self, node: NodeId, f: impl Fn(&Node) -> NodeId) -> Option<NodeId> {
        self.nodes.borrow().get(node.0 as usize).map(f).and_then(NodeId::valid)
    }
}

impl DomAccess for DomTree {
    fn kind(&self, node: NodeId) -> Option<NodeKind> {
        let nodes = self.nodes.borrow();
        Some(match nodes.get(node.0 as usize)?.data {
            NodeData::Document { .. } => NodeKind::Document,
            NodeData::Fragment { .. } => NodeKind::DocumentFragment,
            NodeData::Element(_) => NodeKind::Element,
            NodeData::Text(_) => NodeKind::Text,
            NodeData::Comment(_) => NodeKind::Comment,
        })
    }

    fn local_name(&self, element: NodeId) -> Option<String> {
        let nodes = self.nodes.borrow();
        nodes
            .get(element.0 as usize)?
            .as_element()
            .map(|e| e.local_name.clone())
    }

    fn attribute(&self, element: NodeId, name: &str) -> Option<String> {
        let nodes = self.nodes.borrow();
        nodes
            .get(element.0 as usize)?
            .as_element()?
            .attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.link(node, |n| n.parent)
    }

    fn first_child(&self, node: NodeId) -> Option<NodeId> {
        self.link(node, |n| n.first_child)
    }

    fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        self.link(node, |n| n.next_sibling)
    }

    fn shadow_root(&self, element: NodeId) -> Option<NodeId> {
        self.link(element, |n| n.as_element().map_or(NodeId::NONE, |e| e.shadow_root))
    }

    fn shadow_host(&self, root: NodeId) -> Option<NodeId> {
        self.link(root, |n| match n.data {
            NodeData::Fragment { host } => host,
            _ => NodeId::NONE,
        })
    }

    fn owner_document(&self, node: NodeId) -> NodeId {
        self.nodes
            .borrow()
            .get(node.0 as usize)
            .map_or(NodeId::NONE, |n| n.document)
    }

    fn has_browsing_context(&self, document: NodeId) -> bool {
        matches!(
            self.nodes.borrow().get(document.0 as usize).map(|n| &n.data),
            Some(NodeData::Document { browsing_context: true, .. })
        )
    }

    fn import_document(&self, link: NodeId) -> Option<NodeId> {
        self.link(link, |n| n.as_element().map_or(NodeId::NONE, |e| e.import))
    }

    fn is_loaded(&self, document: NodeId) -> bool {
        matches!(
            self.nodes.borrow().get(document.0 as usize).map(|n| &n.data),
            Some(NodeData::Document { loaded: true, .. })
        )
    }

    fn create_element(&self, document: NodeId, local_name: &str) -> NodeId {
        self.alloc(
            Some(document),
            NodeData::Element(ElementData {
                local_name: local_name.to_string(),
                attrs: Vec::new(),
                shadow_root: NodeId::NONE,
                import: NodeId::NONE,
            }),
        )
    }
}
