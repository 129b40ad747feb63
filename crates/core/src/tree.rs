//! Command address tree.
//!
//! Nodes live in a flat arena owned by [`AddressTree`] and refer to each
//! other by [`NodeId`]. Each node has a main key, optional aliases, an
//! optional [`Handler`], and children keyed by any of their names.
//!
//! ```text
//! (root)
//!  ├── greet | hi        handler: <name> [-loud]
//!  └── zone
//!       └── b
//!            └── c       handler, inherits "zone" permission
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::buffer::TokenBuffer;
use crate::handler::Handler;

/// Index of a node in an [`AddressTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// The root node of every tree.
    pub const ROOT: NodeId = NodeId(0);

    /// Arena index.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Custom child selection for nodes whose next step depends on more than a
/// single token.
///
/// Implementations may consume any number of tokens. On `None` the tree
/// restores the cursor.
pub trait ChildSelector: Send + Sync {
    /// Pick the child of `node` for the tokens at the cursor.
    fn select(&self, tree: &AddressTree, node: NodeId, buffer: &mut TokenBuffer)
    -> Option<NodeId>;
}

/// One point in the command hierarchy.
#[derive(Default)]
pub struct AddressNode {
    /// First entry is the main key. Empty for the root.
    names: Vec<String>,
    /// Set on first attachment; the name list is frozen afterwards.
    finalized: bool,
    handler: Option<Arc<Handler>>,
    parent: Option<NodeId>,
    /// Every name or alias of every child.
    children: HashMap<String, NodeId>,
    /// Distinct main keys in insertion order.
    main_keys: Vec<String>,
    trailing: bool,
    selector: Option<Arc<dyn ChildSelector>>,
}

impl AddressNode {
    /// Main key and aliases; the first entry is the main key.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Main key, `None` for the root.
    pub fn main_key(&self) -> Option<&str> {
        self.names.first().map(String::as_str)
    }

    /// Bound handler.
    pub fn handler(&self) -> Option<&Arc<Handler>> {
        self.handler.as_ref()
    }

    /// Parent node, `None` for the root and detached nodes.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Whether the handler runs inline while resolution passes through.
    pub fn is_trailing(&self) -> bool {
        self.trailing
    }

    /// Whether the node has been attached.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }
}

impl fmt::Debug for AddressNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddressNode")
            .field("names", &self.names)
            .field("parent", &self.parent)
            .field("children", &self.main_keys)
            .field("handler", &self.handler.is_some())
            .field("trailing", &self.trailing)
            .finish()
    }
}

/// Arena of [`AddressNode`]s rooted at [`NodeId::ROOT`].
#[derive(Debug)]
pub struct AddressTree {
    nodes: Vec<AddressNode>,
}

impl Default for AddressTree {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressTree {
    /// A tree holding only the root.
    pub fn new() -> Self {
        Self {
            nodes: vec![AddressNode {
                finalized: true,
                ..AddressNode::default()
            }],
        }
    }

    /// Number of nodes, attached or not, including the root.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always `false`: the root exists.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Borrow a node.
    ///
    /// # Panics
    /// Panics if `id` does not belong to this tree.
    pub fn node(&self, id: NodeId) -> &AddressNode {
        &self.nodes[id.0]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut AddressNode {
        &mut self.nodes[id.0]
    }

    // ── Construction ────────────────────────────────────────────────────

    /// Create a detached node with the given names (main key first).
    pub fn create_node<I, S>(&mut self, names: I) -> NodeId
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = NodeId(self.nodes.len());
        self.nodes.push(AddressNode {
            names: names.into_iter().map(Into::into).collect(),
            ..AddressNode::default()
        });
        id
    }

    /// Add a name to a detached node.
    ///
    /// # Panics
    /// Panics once the node has been attached.
    pub fn add_alias(&mut self, node: NodeId, alias: impl Into<String>) {
        let n = self.node_mut(node);
        assert!(!n.finalized, "alias list of {node} is finalized");
        n.names.push(alias.into());
    }

    /// Bind a handler, replacing any previous one.
    pub fn set_handler(&mut self, node: NodeId, handler: Arc<Handler>) {
        self.node_mut(node).handler = Some(handler);
    }

    /// Mark a node's handler as trailing.
    pub fn set_trailing(&mut self, node: NodeId, trailing: bool) {
        self.node_mut(node).trailing = trailing;
    }

    /// Install a custom child selector.
    pub fn set_selector(&mut self, node: NodeId, selector: Arc<dyn ChildSelector>) {
        self.node_mut(node).selector = Some(selector);
    }

    /// Attach `child` under `parent`.
    ///
    /// The main key always maps to the child; an alias already claimed by a
    /// sibling is dropped from the child's name list.
    ///
    /// # Panics
    /// Panics when `child` is the root, is already attached, has no names,
    /// or when its main key equals a sibling's main key.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) {
        assert!(child != NodeId::ROOT, "the root cannot be attached");
        assert!(
            self.node(child).parent.is_none(),
            "{child} is already attached"
        );
        let Some(main) = self.node(child).main_key().map(str::to_string) else {
            panic!("{child} has no names");
        };

        if let Some(&existing) = self.node(parent).children.get(&main) {
            assert!(
                self.node(existing).main_key() != Some(main.as_str()),
                "duplicate child '{main}' under {parent}"
            );
            // The new main key takes the mapping; the sibling loses the alias.
            debug!(key = %main, "main key replaces sibling alias");
            self.node_mut(existing).names.retain(|n| *n != main);
        }

        let aliases: Vec<String> = self.node(child).names[1..].to_vec();
        let mut kept = vec![main.clone()];
        {
            let p = self.node_mut(parent);
            if !p.main_keys.contains(&main) {
                p.main_keys.push(main.clone());
            }
            p.children.insert(main.clone(), child);
            for alias in aliases {
                if alias == main || p.children.contains_key(&alias) {
                    debug!(alias = %alias, key = %main, "alias already taken, dropped");
                    continue;
                }
                p.children.insert(alias.clone(), child);
                kept.push(alias);
            }
        }

        let c = self.node_mut(child);
        c.names = kept;
        c.parent = Some(parent);
        c.finalized = true;
    }

    /// Detach children of `parent` by key.
    ///
    /// With `remove_aliases`, every name of the matched child that still maps
    /// to it is removed. Otherwise only the given key is unmapped and dropped
    /// from the child's names; the child stays reachable by its other names.
    pub fn remove_children(&mut self, parent: NodeId, keys: &[&str], remove_aliases: bool) {
        for &key in keys {
            let Some(&child) = self.node(parent).children.get(key) else {
                continue;
            };
            let removed: Vec<String> = if remove_aliases {
                self.node(child).names.clone()
            } else {
                vec![key.to_string()]
            };
            {
                let p = self.node_mut(parent);
                for name in &removed {
                    if p.children.get(name) == Some(&child) {
                        p.children.remove(name);
                    }
                }
                p.main_keys.retain(|k| p.children.contains_key(k));
            }
            if !remove_aliases {
                self.node_mut(child).names.retain(|n| n != key);
                // Promote the next name so the child keeps a listed main key.
                if let Some(main) = self.node(child).main_key().map(str::to_string)
                    && self.node(parent).children.get(&main) == Some(&child)
                {
                    let p = self.node_mut(parent);
                    if !p.main_keys.contains(&main) {
                        p.main_keys.push(main);
                    }
                }
            }
            debug!(key, remove_aliases, "removed child mapping");
        }
    }

    // ── Queries ─────────────────────────────────────────────────────────

    /// Child of `node` mapped by `key` (main key or alias).
    pub fn child(&self, node: NodeId, key: &str) -> Option<NodeId> {
        self.node(node).children.get(key).copied()
    }

    /// Child selected by the tokens at the cursor.
    ///
    /// Consumes exactly one token by default; nodes with a
    /// [`ChildSelector`] may consume more. The cursor is restored on a miss.
    pub fn select_child(&self, node: NodeId, buffer: &mut TokenBuffer) -> Option<NodeId> {
        let start = buffer.cursor();
        let found = match &self.node(node).selector {
            Some(selector) => selector.select(self, node, buffer),
            None => buffer.next().and_then(|key| self.child(node, key)),
        };
        if found.is_none() {
            buffer.set_cursor(start);
        }
        found
    }

    /// Bound handler of `node`.
    pub fn handler(&self, node: NodeId) -> Option<&Arc<Handler>> {
        self.node(node).handler.as_ref()
    }

    /// Parent of `node`.
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.node(node).parent
    }

    /// Main key of `node`.
    pub fn main_key(&self, node: NodeId) -> Option<&str> {
        self.node(node).main_key()
    }

    /// Distinct children in insertion order of their main keys.
    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        let n = self.node(node);
        let mut out: Vec<NodeId> = Vec::with_capacity(n.main_keys.len());
        for key in &n.main_keys {
            if let Some(&child) = n.children.get(key)
                && !out.contains(&child)
            {
                out.push(child);
            }
        }
        out
    }

    /// Names of `child` that still map to it from its parent.
    pub fn live_names(&self, child: NodeId) -> Vec<&str> {
        let Some(parent) = self.parent(child) else {
            return Vec::new();
        };
        self.node(child)
            .names
            .iter()
            .filter(|n| self.child(parent, n) == Some(child))
            .map(String::as_str)
            .collect()
    }

    /// Number of hops from the root.
    pub fn depth(&self, node: NodeId) -> usize {
        self.ancestors(node).count()
    }

    /// Parent, grandparent, and so on up to the root.
    pub fn ancestors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(node), |&n| self.parent(n))
    }

    /// Main keys from the root down to `node`.
    pub fn path(&self, node: NodeId) -> Vec<&str> {
        let mut keys: Vec<&str> = std::iter::once(node)
            .chain(self.ancestors(node))
            .filter_map(|n| self.main_key(n))
            .collect();
        keys.reverse();
        keys
    }

    /// Space-separated address, e.g. `zone b c`.
    pub fn address(&self, node: NodeId) -> String {
        self.path(node).join(" ")
    }

    /// Dot-separated address, e.g. `zone.b.c`.
    pub fn dotted_address(&self, node: NodeId) -> String {
        self.path(node).join(".")
    }

    /// Follow main keys or aliases from the root.
    pub fn find(&self, keys: &[&str]) -> Option<NodeId> {
        keys.iter()
            .try_fold(NodeId::ROOT, |node, key| self.child(node, key))
    }

    /// Every attached node below `node`, depth first, in child order.
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(node).into_iter().rev().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).into_iter().rev());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_with(names: &[&[&str]]) -> (AddressTree, Vec<NodeId>) {
        let mut tree = AddressTree::new();
        let ids = names
            .iter()
            .map(|n| {
                let id = tree.create_node(n.iter().copied());
                tree.add_child(NodeId::ROOT, id);
                id
            })
            .collect();
        (tree, ids)
    }

    #[test]
    fn aliases_resolve_to_same_node() {
        let (tree, ids) = tree_with(&[&["greet", "hi", "hello"]]);
        assert_eq!(tree.child(NodeId::ROOT, "greet"), Some(ids[0]));
        assert_eq!(tree.child(NodeId::ROOT, "hi"), Some(ids[0]));
        assert_eq!(tree.child(NodeId::ROOT, "hello"), Some(ids[0]));
        assert_eq!(tree.depth(ids[0]), 1);
        assert_eq!(tree.depth(NodeId::ROOT), 0);
    }

    #[test]
    fn colliding_alias_is_dropped_from_later_child() {
        let (tree, ids) = tree_with(&[&["greet", "hi"], &["hail", "hi"]]);
        assert_eq!(tree.child(NodeId::ROOT, "hi"), Some(ids[0]));
        assert_eq!(tree.node(ids[1]).names(), ["hail"]);
        assert_eq!(tree.children(NodeId::ROOT), ids);
    }

    #[test]
    fn main_key_takes_over_sibling_alias() {
        let (tree, ids) = tree_with(&[&["greet", "hi"], &["hi"]]);
        assert_eq!(tree.child(NodeId::ROOT, "hi"), Some(ids[1]));
        assert_eq!(tree.node(ids[0]).names(), ["greet"]);
    }

    #[test]
    #[should_panic(expected = "duplicate child")]
    fn duplicate_main_key_panics() {
        tree_with(&[&["greet"], &["greet"]]);
    }

    #[test]
    #[should_panic(expected = "already attached")]
    fn reattach_panics() {
        let (mut tree, ids) = tree_with(&[&["greet"]]);
        tree.add_child(NodeId::ROOT, ids[0]);
    }

    #[test]
    #[should_panic(expected = "finalized")]
    fn alias_after_attach_panics() {
        let (mut tree, ids) = tree_with(&[&["greet"]]);
        tree.add_alias(ids[0], "hi");
    }

    #[test]
    fn remove_single_alias_keeps_node_reachable() {
        let (mut tree, ids) = tree_with(&[&["greet", "hi", "hello"]]);
        tree.remove_children(NodeId::ROOT, &["hi"], false);
        assert_eq!(tree.child(NodeId::ROOT, "hi"), None);
        assert_eq!(tree.child(NodeId::ROOT, "greet"), Some(ids[0]));
        assert_eq!(tree.child(NodeId::ROOT, "hello"), Some(ids[0]));
        assert_eq!(tree.node(ids[0]).names(), ["greet", "hello"]);
    }

    #[test]
    fn remove_main_key_promotes_next_name() {
        let (mut tree, ids) = tree_with(&[&["greet", "hi"]]);
        tree.remove_children(NodeId::ROOT, &["greet"], false);
        assert_eq!(tree.main_key(ids[0]), Some("hi"));
        assert_eq!(tree.children(NodeId::ROOT), ids);
    }

    #[test]
    fn remove_with_aliases_detaches_every_mapping() {
        let (mut tree, ids) = tree_with(&[&["greet", "hi"], &["zone"]]);
        tree.remove_children(NodeId::ROOT, &["hi"], true);
        assert_eq!(tree.child(NodeId::ROOT, "greet"), None);
        assert_eq!(tree.children(NodeId::ROOT), [ids[1]]);
    }

    #[test]
    fn paths_and_descendants() {
        let mut tree = AddressTree::new();
        let a = tree.create_node(["a"]);
        tree.add_child(NodeId::ROOT, a);
        let b = tree.create_node(["b"]);
        tree.add_child(a, b);
        let c = tree.create_node(["c", "see"]);
        tree.add_child(b, c);
        let d = tree.create_node(["d"]);
        tree.add_child(a, d);

        assert_eq!(tree.path(c), ["a", "b", "c"]);
        assert_eq!(tree.address(c), "a b c");
        assert_eq!(tree.dotted_address(c), "a.b.c");
        assert_eq!(tree.find(&["a", "b", "see"]), Some(c));
        assert_eq!(tree.descendants(NodeId::ROOT), [a, b, c, d]);
        assert_eq!(tree.ancestors(c).collect::<Vec<_>>(), [b, a, NodeId::ROOT]);
    }

    #[test]
    fn select_child_restores_cursor_on_miss() {
        let (tree, ids) = tree_with(&[&["greet"]]);
        let mut buffer = TokenBuffer::new(["nope"]);
        assert_eq!(tree.select_child(NodeId::ROOT, &mut buffer), None);
        assert_eq!(buffer.cursor(), 0);
        let mut buffer = TokenBuffer::new(["greet", "x"]);
        assert_eq!(tree.select_child(NodeId::ROOT, &mut buffer), Some(ids[0]));
        assert_eq!(buffer.cursor(), 1);
    }

    #[derive(Debug)]
    struct TwoWord;

    impl ChildSelector for TwoWord {
        fn select(
            &self,
            tree: &AddressTree,
            node: NodeId,
            buffer: &mut TokenBuffer,
        ) -> Option<NodeId> {
            let first = buffer.next()?.to_string();
            let second = buffer.next()?;
            tree.child(node, &format!("{first}_{second}"))
        }
    }

    #[test]
    fn custom_selector_consumes_several_tokens() {
        let (mut tree, ids) = tree_with(&[&["set_home"]]);
        tree.set_selector(NodeId::ROOT, Arc::new(TwoWord));
        let mut buffer = TokenBuffer::new(["set", "home"]);
        assert_eq!(tree.select_child(NodeId::ROOT, &mut buffer), Some(ids[0]));
        let mut buffer = TokenBuffer::new(["set"]);
        assert_eq!(tree.select_child(NodeId::ROOT, &mut buffer), None);
        assert_eq!(buffer.cursor(), 0);
    }
}
