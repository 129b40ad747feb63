//! Context filters.
//!
//! Filters validate an [`ExecutionContext`] before the handler runs. They are
//! kept sorted by [`FilterPriority`]; everything below
//! [`FilterPriority::PostParameters`] runs before parameter parsing, the rest
//! after (and never during completion).
//!
//! Inheritable filters compose across the tree: a marker on a deep handler
//! walks up its ancestors and asks the first same-family filter it finds to
//! check a path-specific variant of itself. With `zone` declared at `a`,
//! invoking `a b c` checks `zone.b.c`.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::caller::{Caller, SenderKind};
use crate::context::ExecutionContext;
use crate::error::CommandError;
use crate::tree::{AddressTree, NodeId};

/// Ordering bucket of a filter. Earlier variants run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterPriority {
    /// Cheap structural checks.
    VeryEarly,
    /// Permission checks.
    Permission,
    /// Early validation.
    Early,
    /// Default bucket.
    Normal,
    /// Late validation.
    Late,
    /// Last checks before parsing.
    VeryLate,
    /// Runs after parameters are bound; skipped during completion.
    PostParameters,
}

/// A validator attached to a handler.
pub trait ContextFilter: Send + Sync + fmt::Debug {
    /// Ordering bucket.
    fn priority(&self) -> FilterPriority {
        FilterPriority::Normal
    }

    /// Accept or reject the call.
    fn filter(&self, ctx: &ExecutionContext<'_>) -> Result<(), CommandError>;

    /// Whether the handler at `node` should be visible to `caller` at all.
    fn is_visible_to(&self, _caller: &dyn Caller, _tree: &AddressTree, _node: NodeId) -> bool {
        true
    }

    /// Composition capability, for filters that take part in inheritance.
    fn inheritance(&self) -> Option<&dyn InheritableFilter> {
        None
    }
}

/// A filter that can check a variant of itself for a descendant path.
pub trait InheritableFilter: Send + Sync {
    /// Family shared by composing filters and their markers.
    fn family(&self) -> &str;

    /// Markers only trigger the walk and never match it.
    fn is_marker(&self) -> bool {
        false
    }

    /// Check the variant of this filter for `path`, the main keys from the
    /// declaring node (exclusive) down to the invoked node.
    fn check_with_path(&self, caller: &dyn Caller, path: &[&str]) -> Result<(), CommandError>;
}

/// Walk from `node` towards the root and check the first ancestor carrying
/// non-marker filters of `family`.
///
/// Reaching the root without a match passes.
pub fn check_inherited(
    tree: &AddressTree,
    node: NodeId,
    caller: &dyn Caller,
    family: &str,
) -> Result<(), CommandError> {
    let mut path: Vec<&str> = Vec::new();
    let mut current = node;
    while let Some(parent) = tree.parent(current) {
        if let Some(key) = tree.main_key(current) {
            path.insert(0, key);
        }
        current = parent;
        let Some(handler) = tree.handler(current) else {
            continue;
        };
        let mut matched = false;
        for inheritable in handler
            .filters()
            .iter()
            .filter_map(|f| f.inheritance())
            .filter(|i| i.family() == family && !i.is_marker())
        {
            trace!(family, path = ?path, "inherited check");
            inheritable.check_with_path(caller, &path)?;
            matched = true;
        }
        if matched {
            return Ok(());
        }
    }
    Ok(())
}

// ── Permission ──────────────────────────────────────────────────────────

const PERMISSION_FAMILY: &str = "permission";

/// Requires a permission; optionally composes path-specific permissions for
/// descendants that carry [`InheritPermission`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionFilter {
    permission: String,
    inheritable: bool,
    insert_at: Option<usize>,
}

impl PermissionFilter {
    /// A plain permission check.
    pub fn new(permission: impl Into<String>) -> Self {
        Self {
            permission: permission.into(),
            inheritable: false,
            insert_at: None,
        }
    }

    /// A permission that descendants compose onto.
    pub fn inheritable(permission: impl Into<String>) -> Self {
        Self {
            inheritable: true,
            ..Self::new(permission)
        }
    }

    /// Insert path components at this dot-separated index instead of
    /// appending them.
    pub fn with_insert_index(mut self, index: usize) -> Self {
        self.insert_at = Some(index);
        self
    }

    /// The declared permission.
    pub fn permission(&self) -> &str {
        &self.permission
    }

    /// Permission for a descendant at `path`.
    pub fn compose(&self, path: &[&str]) -> String {
        let mut parts: Vec<&str> = self.permission.split('.').collect();
        match self.insert_at {
            Some(index) => {
                let index = index.min(parts.len());
                for (offset, key) in path.iter().enumerate() {
                    parts.insert(index + offset, key);
                }
            }
            None => parts.extend_from_slice(path),
        }
        parts.join(".")
    }

    fn check(caller: &dyn Caller, permission: &str) -> Result<(), CommandError> {
        if caller.has_permission(permission) {
            Ok(())
        } else {
            Err(CommandError::permission_denied(permission))
        }
    }
}

impl ContextFilter for PermissionFilter {
    fn priority(&self) -> FilterPriority {
        FilterPriority::Permission
    }

    fn filter(&self, ctx: &ExecutionContext<'_>) -> Result<(), CommandError> {
        Self::check(ctx.caller(), &self.permission)
    }

    /// Inheritable permissions never hide their node: descendants check
    /// their own composed permission.
    fn is_visible_to(&self, caller: &dyn Caller, _tree: &AddressTree, _node: NodeId) -> bool {
        self.inheritable || caller.has_permission(&self.permission)
    }

    fn inheritance(&self) -> Option<&dyn InheritableFilter> {
        self.inheritable.then_some(self as &dyn InheritableFilter)
    }
}

impl InheritableFilter for PermissionFilter {
    fn family(&self) -> &str {
        PERMISSION_FAMILY
    }

    fn check_with_path(&self, caller: &dyn Caller, path: &[&str]) -> Result<(), CommandError> {
        Self::check(caller, &self.compose(path))
    }
}

/// Marker: require the permission composed by the nearest inheritable
/// [`PermissionFilter`] above this node.
///
/// The check happens when the handler is invoked; the node stays visible.
#[derive(Debug, Clone, Copy, Default)]
pub struct InheritPermission;

impl ContextFilter for InheritPermission {
    fn priority(&self) -> FilterPriority {
        FilterPriority::Permission
    }

    fn filter(&self, ctx: &ExecutionContext<'_>) -> Result<(), CommandError> {
        check_inherited(ctx.tree(), ctx.address(), ctx.caller(), PERMISSION_FAMILY)
    }

    fn inheritance(&self) -> Option<&dyn InheritableFilter> {
        Some(self)
    }
}

impl InheritableFilter for InheritPermission {
    fn family(&self) -> &str {
        PERMISSION_FAMILY
    }

    fn is_marker(&self) -> bool {
        true
    }

    fn check_with_path(&self, _caller: &dyn Caller, _path: &[&str]) -> Result<(), CommandError> {
        Ok(())
    }
}

// ── Sender kind ─────────────────────────────────────────────────────────

/// Restricts a handler to certain kinds of callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderKindFilter {
    allowed: Vec<SenderKind>,
}

impl SenderKindFilter {
    /// Allow only `allowed`.
    pub fn new(allowed: impl IntoIterator<Item = SenderKind>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }
}

impl ContextFilter for SenderKindFilter {
    fn priority(&self) -> FilterPriority {
        FilterPriority::VeryEarly
    }

    fn filter(&self, ctx: &ExecutionContext<'_>) -> Result<(), CommandError> {
        let kind = ctx.caller().kind();
        if self.allowed.contains(&kind) {
            return Ok(());
        }
        let allowed: Vec<String> = self.allowed.iter().map(ToString::to_string).collect();
        Err(CommandError::new(format!(
            "This command can only be used by: {}",
            allowed.join(", ")
        )))
    }

    fn is_visible_to(&self, caller: &dyn Caller, _tree: &AddressTree, _node: NodeId) -> bool {
        self.allowed.contains(&caller.kind())
    }
}

// ── Closure ─────────────────────────────────────────────────────────────

type FilterFn = dyn Fn(&ExecutionContext<'_>) -> Result<(), CommandError> + Send + Sync;

/// A filter backed by a closure.
#[derive(Clone)]
pub struct FnFilter {
    name: String,
    priority: FilterPriority,
    check: Arc<FilterFn>,
}

impl FnFilter {
    /// Wrap `check` under a descriptive `name`.
    pub fn new<F>(name: impl Into<String>, priority: FilterPriority, check: F) -> Self
    where
        F: Fn(&ExecutionContext<'_>) -> Result<(), CommandError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            priority,
            check: Arc::new(check),
        }
    }
}

impl fmt::Debug for FnFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnFilter")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

impl ContextFilter for FnFilter {
    fn priority(&self) -> FilterPriority {
        self.priority
    }

    fn filter(&self, ctx: &ExecutionContext<'_>) -> Result<(), CommandError> {
        (self.check)(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caller::SimpleCaller;
    use crate::error::ErrorKind;
    use crate::handler::Handler;

    fn handler_with(filter: impl ContextFilter + 'static) -> Arc<Handler> {
        Arc::new(Handler::from_fn(|_| Ok(None)).with_filter(filter))
    }

    /// `a` (inheritable "zone") → `b` (no handler) → `c` (marker).
    fn zone_tree() -> (AddressTree, NodeId) {
        let mut tree = AddressTree::new();
        let a = tree.create_node(["a"]);
        tree.add_child(NodeId::ROOT, a);
        tree.set_handler(a, handler_with(PermissionFilter::inheritable("zone")));
        let b = tree.create_node(["b"]);
        tree.add_child(a, b);
        let c = tree.create_node(["c"]);
        tree.add_child(b, c);
        tree.set_handler(c, handler_with(InheritPermission));
        (tree, c)
    }

    #[test]
    fn priorities_are_ordered() {
        assert!(FilterPriority::VeryEarly < FilterPriority::Permission);
        assert!(FilterPriority::VeryLate < FilterPriority::PostParameters);
    }

    #[test]
    fn compose_appends_or_inserts() {
        let filter = PermissionFilter::inheritable("zone");
        assert_eq!(filter.compose(&["b", "c"]), "zone.b.c");
        let filter = PermissionFilter::inheritable("plugin.admin").with_insert_index(1);
        assert_eq!(filter.compose(&["b", "c"]), "plugin.b.c.admin");
        let filter = PermissionFilter::inheritable("x").with_insert_index(9);
        assert_eq!(filter.compose(&["y"]), "x.y");
    }

    #[test]
    fn inherited_permission_composes_full_path() {
        let (tree, c) = zone_tree();
        let allowed = SimpleCaller::new("a", SenderKind::Player).with_permission("zone.b.c");
        assert!(check_inherited(&tree, c, &allowed, PERMISSION_FAMILY).is_ok());

        let denied = SimpleCaller::new("b", SenderKind::Player).with_permission("zone.b");
        let err = check_inherited(&tree, c, &denied, PERMISSION_FAMILY).unwrap_err();
        assert!(
            matches!(err.kind(), ErrorKind::PermissionDenied { permission } if permission == "zone.b.c")
        );
    }

    #[test]
    fn markers_on_ancestors_keep_walking() {
        let (mut tree, c) = zone_tree();
        let b = tree.parent(c).unwrap();
        tree.set_handler(b, handler_with(InheritPermission));
        let caller = SimpleCaller::new("a", SenderKind::Player).with_permission("zone.b.c");
        assert!(check_inherited(&tree, c, &caller, PERMISSION_FAMILY).is_ok());
    }

    #[test]
    fn walk_reaching_root_passes() {
        let mut tree = AddressTree::new();
        let lone = tree.create_node(["lone"]);
        tree.add_child(NodeId::ROOT, lone);
        tree.set_handler(lone, handler_with(InheritPermission));
        let caller = SimpleCaller::new("a", SenderKind::Player);
        assert!(check_inherited(&tree, lone, &caller, PERMISSION_FAMILY).is_ok());
    }

    #[test]
    fn sender_kind_visibility() {
        let filter = SenderKindFilter::new([SenderKind::Console]);
        let tree = AddressTree::new();
        let player = SimpleCaller::new("p", SenderKind::Player);
        let console = SimpleCaller::new("c", SenderKind::Console);
        assert!(!filter.is_visible_to(&player, &tree, NodeId::ROOT));
        assert!(filter.is_visible_to(&console, &tree, NodeId::ROOT));
    }
}
