//! Startup build phase.
//!
//! [`TreeBuilder`] registers handlers by space-separated path, creating
//! intermediate groups on the way, and owns the type and predefined-handler
//! registries until [`build`](TreeBuilder::build) hands everything to a
//! [`Dispatcher`].

use std::sync::Arc;

use tracing::debug;

use crate::config::DispatchConfig;
use crate::dispatch::{Dispatcher, FailureHandler};
use crate::handler::{Handler, PredefinedRegistry};
use crate::params::TypeRegistry;
use crate::tree::{AddressTree, NodeId};

/// Assembles an [`AddressTree`] and its registries.
#[derive(Default)]
pub struct TreeBuilder {
    tree: AddressTree,
    config: DispatchConfig,
    types: TypeRegistry,
    predefined: PredefinedRegistry,
    failure: Option<Arc<dyn FailureHandler>>,
}

impl TreeBuilder {
    /// An empty tree with default configuration and built-in registries.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the failure handler installed on the dispatcher.
    pub fn with_failure_handler(mut self, failure: Arc<dyn FailureHandler>) -> Self {
        self.failure = Some(failure);
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Parameter type registry.
    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    /// Mutable parameter type registry, for host-defined types.
    pub fn types_mut(&mut self) -> &mut TypeRegistry {
        &mut self.types
    }

    /// Predefined handler registry.
    pub fn predefined(&self) -> &PredefinedRegistry {
        &self.predefined
    }

    /// Mutable predefined handler registry.
    pub fn predefined_mut(&mut self) -> &mut PredefinedRegistry {
        &mut self.predefined
    }

    /// The tree built so far.
    pub fn tree(&self) -> &AddressTree {
        &self.tree
    }

    /// Direct access for operations the builder does not wrap.
    pub fn tree_mut(&mut self) -> &mut AddressTree {
        &mut self.tree
    }

    /// Ensure the node at `path` exists. `aliases` apply only when the final
    /// segment is created here.
    pub fn group(&mut self, path: &str, aliases: &[&str]) -> NodeId {
        let segments: Vec<&str> = path.split_whitespace().collect();
        let mut node = NodeId::ROOT;
        for (i, segment) in segments.iter().enumerate() {
            if let Some(child) = self.tree.child(node, segment) {
                node = child;
                continue;
            }
            let last = i + 1 == segments.len();
            let names = std::iter::once(*segment).chain(aliases.iter().copied().filter(|_| last));
            let child = self.tree.create_node(names);
            self.tree.add_child(node, child);
            debug!(path = %self.tree.address(child), "created node");
            node = child;
        }
        node
    }

    /// Bind `handler` at `path`, creating the node and any missing groups.
    pub fn register(&mut self, path: &str, aliases: &[&str], handler: Handler) -> NodeId {
        self.register_shared(path, aliases, Arc::new(handler))
    }

    /// Like [`register`](Self::register) with a shared handler.
    pub fn register_shared(
        &mut self,
        path: &str,
        aliases: &[&str],
        handler: Arc<Handler>,
    ) -> NodeId {
        let node = self.group(path, aliases);
        self.tree.set_handler(node, handler);
        node
    }

    /// Mark the handler at `node` as trailing.
    pub fn set_trailing(&mut self, node: NodeId, trailing: bool) {
        self.tree.set_trailing(node, trailing);
    }

    /// Attach the predefined handler `name` under `path`.
    ///
    /// Returns `None` when no generator has that name.
    pub fn add_predefined(&mut self, path: &str, name: &str) -> Option<NodeId> {
        let generated = self.predefined.generate(name, &self.config)?;
        let parent = self.group(path, &[]);
        let node = self.tree.create_node(generated.aliases);
        self.tree.add_child(parent, node);
        self.tree.set_handler(node, generated.handler);
        Some(node)
    }

    /// Finish building.
    pub fn build(self) -> Dispatcher {
        let dispatcher = Dispatcher::new(self.tree, self.config).with_types(self.types);
        match self.failure {
            Some(failure) => dispatcher.with_failure_handler(failure),
            None => dispatcher,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HELP;
    use crate::params::{ValueKind, types};

    #[test]
    fn register_creates_groups() {
        let mut builder = TreeBuilder::new();
        let c = builder.register("a b c", &["see"], Handler::from_fn(|_| Ok(None)));
        let tree = builder.tree();
        assert_eq!(tree.find(&["a", "b", "see"]), Some(c));
        let b = tree.find(&["a", "b"]).unwrap();
        assert!(tree.handler(b).is_none());
        assert!(tree.handler(c).is_some());
    }

    #[test]
    fn register_on_existing_group_binds_handler() {
        let mut builder = TreeBuilder::new();
        builder.register("zone b", &[], Handler::from_fn(|_| Ok(None)));
        let zone = builder.register("zone", &["z"], Handler::from_fn(|_| Ok(None)));
        assert!(builder.tree().handler(zone).is_some());
        // Aliases only apply to nodes created by the call.
        assert_eq!(builder.tree().child(NodeId::ROOT, "z"), None);
    }

    #[test]
    fn predefined_help_is_attached() {
        let mut builder = TreeBuilder::new();
        let help = builder.add_predefined("zone", HELP).unwrap();
        let tree = builder.tree();
        let zone = tree.find(&["zone"]).unwrap();
        assert_eq!(tree.child(zone, "?"), Some(help));
        assert!(builder.add_predefined("zone", "nope").is_none());
    }

    #[test]
    fn registered_types_reach_the_dispatcher() {
        let mut builder = TreeBuilder::new();
        builder
            .types_mut()
            .register(ValueKind::Text, Some("shout"), types::greedy_string());
        let d = builder.build();
        assert!(d.types().lookup(ValueKind::Text, Some("shout")).is_some());
        assert!(d.types().lookup(ValueKind::Integer, Some("shout")).is_some());
    }
}
