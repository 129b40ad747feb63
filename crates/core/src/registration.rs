//! Labels a host registry should claim for top-level commands.
//!
//! Hosts expose root children under their own command registry, where other
//! sources may already own a label. A [`CollisionPolicy`] decides which
//! plain labels are claimed regardless and which only when free. Fallback
//! labels are `prefix:key` and only exist when a prefix is set.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::tree::{AddressTree, NodeId};

/// How to treat labels that may already be taken in the host registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CollisionPolicy {
    /// Claim every plain and fallback label, replacing existing owners.
    ReplaceAll,
    /// Always claim main keys; aliases only when free.
    MainKeyOnly,
    /// Always claim main keys and their fallbacks; aliases only when free.
    #[default]
    MainAndFallback,
    /// Always claim fallbacks; plain labels only when free.
    FallbackOnly,
    /// Claim only free labels.
    NeverOverride,
}

impl fmt::Display for CollisionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CollisionPolicy::ReplaceAll => "replace-all",
            CollisionPolicy::MainKeyOnly => "main-key-only",
            CollisionPolicy::MainAndFallback => "main-and-fallback",
            CollisionPolicy::FallbackOnly => "fallback-only",
            CollisionPolicy::NeverOverride => "never-override",
        };
        f.write_str(name)
    }
}

/// One label to register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Label {
    /// Label text.
    pub label: String,
    /// Root child it resolves to.
    #[serde(skip)]
    pub node: NodeId,
    /// Whether this is a `prefix:key` fallback label.
    pub fallback: bool,
}

/// Labels to claim for every root child under `policy`.
///
/// `is_taken` reports whether a label already has another owner in the
/// host. Labels are returned in child order, plain before fallback.
pub fn top_level_labels(
    tree: &AddressTree,
    policy: CollisionPolicy,
    prefix: &str,
    is_taken: impl Fn(&str) -> bool,
) -> Vec<Label> {
    let mut out = Vec::new();
    for child in tree.children(NodeId::ROOT) {
        let names = tree.live_names(child);
        for (i, name) in names.iter().enumerate() {
            let main = i == 0;
            let forced = match policy {
                CollisionPolicy::ReplaceAll => true,
                CollisionPolicy::MainKeyOnly | CollisionPolicy::MainAndFallback => main,
                CollisionPolicy::FallbackOnly | CollisionPolicy::NeverOverride => false,
            };
            if forced || !is_taken(name) {
                out.push(Label {
                    label: (*name).to_string(),
                    node: child,
                    fallback: false,
                });
            }
        }
        if prefix.is_empty() {
            continue;
        }
        for (i, name) in names.iter().enumerate() {
            let main = i == 0;
            let label = format!("{prefix}:{name}");
            let forced = match policy {
                CollisionPolicy::ReplaceAll | CollisionPolicy::FallbackOnly => true,
                CollisionPolicy::MainAndFallback => main,
                CollisionPolicy::MainKeyOnly | CollisionPolicy::NeverOverride => false,
            };
            if forced || !is_taken(&label) {
                out.push(Label {
                    label,
                    node: child,
                    fallback: true,
                });
            }
        }
    }
    out
}
