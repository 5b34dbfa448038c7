//! Deep descendant walker
//!
//! Visits every custom-element-eligible element under a root in tree order,
//! descending into shadow trees and import documents and skipping template
//! contents. Uses an explicit stack so depth is bounded only by memory.

use std::collections::HashSet;

use crate::dom::{is_import_link, DomAccess, NodeKind};
use crate::NodeId;

/// Walk `root` and its deep descendants, calling `callback` per element
///
/// - shadow root children follow their host, before its light children
/// - an import link's document is walked the first time it is seen in
///   `visited_imports`; the link's own children are not
/// - `<template>` is visited but its descendants are not
pub fn walk_deep_descendant_elements(
    dom: &dyn DomAccess,
    root: NodeId,
    visited_imports: &mut HashSet<NodeId>,
    mut callback: impl FnMut(NodeId),
) {
    let mut stack = vec![root];

    while let Some(node) = stack.pop() {
        if dom.kind(node) != Some(NodeKind::Element) {
            push_children(dom, node, &mut stack);
            continue;
        }

        callback(node);

        if is_import_link(dom, node) {
            if let Some(import) = dom.import_document(node) {
                if visited_imports.insert(import) {
                    push_children(dom, import, &mut stack);
                }
            }
            continue;
        }

        if dom.local_name(node).as_deref() == Some("template") {
            continue;
        }

        // Light children go first so the shadow tree is popped before them.
        push_children(dom, node, &mut stack);
        if let Some(shadow_root) = dom.shadow_root(node) {
            push_children(dom, shadow_root, &mut stack);
        }
    }
}

fn push_children(dom: &dyn DomAccess, node: NodeId, stack: &mut Vec<NodeId>) {
    let start = stack.len();
    let mut child = dom.first_child(node);
    while let Some(id) = child {
        stack.push(id);
        child = dom.next_sibling(id);
    }
    stack[start..].reverse();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::DomTree;

    fn collect(tree: &DomTree, root: NodeId) -> Vec<String> {
        let mut names = Vec::new();
        walk_deep_descendant_elements(tree, root, &mut HashSet::new(), |element| {
            names.push(tree.local_name(element).unwrap_or_default());
        });
        names
    }

    #[test]
    fn test_preorder() {
        let tree = DomTree::new();
        let doc = tree.document();
        let a = tree.create_element(doc, "a");
        let b = tree.create_element(doc, "b");
        let c = tree.create_element(doc, "c");
        let d = tree.create_element(doc, "d");
        let text = tree.create_text(doc, "hello");
        tree.append_child(doc, a);
        tree.append_child(a, b);
        tree.append_child(b, text);
        tree.append_child(b, c);
        tree.append_child(a, d);

        assert_eq!(collect(&tree, doc), ["a", "b", "c", "d"]);
        // The root itself is visited when it is an element
        assert_eq!(collect(&tree, b), ["b", "c"]);
    }

    #[test]
    fn test_template_contents_skipped() {
        let tree = DomTree::new();
        let doc = tree.document();
        let template = tree.create_element(doc, "template");
        let inner = tree.create_element(doc, "x-inner");
        let after = tree.create_element(doc, "x-after");
        tree.append_child(doc, template);
        tree.append_child(template, inner);
        tree.append_child(doc, after);

        assert_eq!(collect(&tree, doc), ["template", "x-after"]);
    }

    #[test]
    fn test_shadow_before_light() {
        let tree = DomTree::new();
        let doc = tree.document();
        let host = tree.create_element(doc, "x-host");
        let light = tree.create_element(doc, "x-light");
        let shadow = tree.attach_shadow(host);
        let inside = tree.create_element(doc, "x-shadow");
        tree.append_child(doc, host);
        tree.append_child(host, light);
        tree.append_child(shadow, inside);

        assert_eq!(collect(&tree, doc), ["x-host", "x-shadow", "x-light"]);
    }

    #[test]
    fn test_import_walked_once() {
        let tree = DomTree::new();
        let doc = tree.document();
        let import = tree.create_document(false);
        let imported = tree.create_element(import, "x-imported");
        tree.append_child(import, imported);

        for _ in 0..2 {
            let link = tree.create_element(doc, "link");
            tree.set_attribute(link, "rel", "import");
            tree.set_import(link, import);
            // Children of the link itself are never visited
            let child = tree.create_element(doc, "x-link-child");
            tree.append_child(link, child);
            tree.append_child(doc, link);
        }

        assert_eq!(collect(&tree, doc), ["link", "x-imported", "link"]);

        // A shared visited set suppresses the import on a second walk
        let mut visited = HashSet::new();
        let mut count = 0;
        walk_deep_descendant_elements(&tree, doc, &mut visited, |_| count += 1);
        assert_eq!(count, 3);
        count = 0;
        walk_deep_descendant_elements(&tree, doc, &mut visited, |_| count += 1);
        assert_eq!(count, 2);
    }

    #[test]
    fn test_deep_tree() {
        let tree = DomTree::new();
        let doc = tree.document();
        let mut parent = doc;
        for _ in 0..100_000 {
            let element = tree.create_element(doc, "div");
            tree.append_child(parent, element);
            parent = element;
        }

        let mut count = 0;
        walk_deep_descendant_elements(&tree, doc, &mut HashSet::new(), |_| count += 1);
        assert_eq!(count, 100_000);
    }
}
