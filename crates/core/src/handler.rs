//! Handlers, executors, and predefined handler generators.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::buffer::TokenBuffer;
use crate::caller::Caller;
use crate::config::DispatchConfig;
use crate::context::ExecutionContext;
use crate::error::CommandError;
use crate::filter::{ContextFilter, FilterPriority};
use crate::params::{Parameter, ParameterModel, types};
use crate::tree::{AddressTree, NodeId};

/// Body of a command.
pub trait CommandExecutor: Send + Sync {
    /// Run the command. `ctx` has already passed the pre-parameter filters,
    /// been parsed, and passed the post-parameter filters.
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<Option<String>, CommandError>;

    /// Suggestions for the token being completed.
    fn complete(&self, ctx: &mut ExecutionContext<'_>) -> Vec<String> {
        ctx.parameter_completions()
    }

    /// Claim `next` as input to this handler even when it names a
    /// subcommand.
    fn takes_precedence_over_subcommand(&self, _next: &str, _remaining: &TokenBuffer) -> bool {
        false
    }
}

type ExecuteFn =
    dyn Fn(&mut ExecutionContext<'_>) -> Result<Option<String>, CommandError> + Send + Sync;

/// [`CommandExecutor`] backed by a closure.
pub struct FnExecutor(Box<ExecuteFn>);

impl FnExecutor {
    /// Wrap `f`.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut ExecutionContext<'_>) -> Result<Option<String>, CommandError>
            + Send
            + Sync
            + 'static,
    {
        Self(Box::new(f))
    }
}

impl CommandExecutor for FnExecutor {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<Option<String>, CommandError> {
        (self.0)(ctx)
    }
}

/// Immutable command identity: parameters, filters, description, body.
///
/// A handler may be shared by several nodes.
pub struct Handler {
    parameters: ParameterModel,
    /// Sorted by priority; equal priorities keep insertion order.
    filters: Vec<Arc<dyn ContextFilter>>,
    description: Option<String>,
    merge_quotes: Option<bool>,
    executor: Arc<dyn CommandExecutor>,
}

impl Handler {
    /// A handler with no parameters or filters.
    pub fn new(executor: impl CommandExecutor + 'static) -> Self {
        Self::with_executor(Arc::new(executor))
    }

    /// A handler around a shared executor.
    pub fn with_executor(executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            parameters: ParameterModel::new(),
            filters: Vec::new(),
            description: None,
            merge_quotes: None,
            executor,
        }
    }

    /// A handler whose body is a closure.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&mut ExecutionContext<'_>) -> Result<Option<String>, CommandError>
            + Send
            + Sync
            + 'static,
    {
        Self::new(FnExecutor::new(f))
    }

    /// Set the parameter model.
    pub fn with_parameters(mut self, parameters: ParameterModel) -> Self {
        self.parameters = parameters;
        self
    }

    /// Add a filter at its priority position.
    pub fn with_filter(self, filter: impl ContextFilter + 'static) -> Self {
        self.with_shared_filter(Arc::new(filter))
    }

    /// Add a shared filter at its priority position.
    pub fn with_shared_filter(mut self, filter: Arc<dyn ContextFilter>) -> Self {
        let priority = filter.priority();
        let at = self.filters.partition_point(|f| f.priority() <= priority);
        self.filters.insert(at, filter);
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Override the configured quote merging for this handler.
    pub fn with_merge_quotes(mut self, merge: bool) -> Self {
        self.merge_quotes = Some(merge);
        self
    }

    /// Parameter model.
    pub fn parameters(&self) -> &ParameterModel {
        &self.parameters
    }

    /// Filters in priority order.
    pub fn filters(&self) -> &[Arc<dyn ContextFilter>] {
        &self.filters
    }

    /// Filters that run before parsing.
    pub fn pre_parameter_filters(&self) -> impl Iterator<Item = &Arc<dyn ContextFilter>> {
        self.filters
            .iter()
            .filter(|f| f.priority() < FilterPriority::PostParameters)
    }

    /// Filters that run after parsing.
    pub fn post_parameter_filters(&self) -> impl Iterator<Item = &Arc<dyn ContextFilter>> {
        self.filters
            .iter()
            .filter(|f| f.priority() >= FilterPriority::PostParameters)
    }

    /// Description text.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Quote merging override.
    pub fn merge_quotes(&self) -> Option<bool> {
        self.merge_quotes
    }

    /// Command body.
    pub fn executor(&self) -> &dyn CommandExecutor {
        self.executor.as_ref()
    }

    /// Whether every filter lets `caller` see this handler at `node`.
    pub fn is_visible_to(&self, caller: &dyn Caller, tree: &AddressTree, node: NodeId) -> bool {
        self.filters
            .iter()
            .all(|f| f.is_visible_to(caller, tree, node))
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("parameters", &self.parameters.usage())
            .field("filters", &self.filters)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

// ── Predefined handlers ─────────────────────────────────────────────────

/// A generated handler together with the names to attach it under.
#[derive(Debug, Clone)]
pub struct Predefined {
    /// Names, main key first.
    pub aliases: Vec<String>,
    /// Shared handler.
    pub handler: Arc<Handler>,
}

type Generator = dyn Fn(&DispatchConfig) -> Predefined + Send + Sync;

/// Named generators for handlers attached under many nodes.
#[derive(Clone)]
pub struct PredefinedRegistry {
    generators: BTreeMap<String, Arc<Generator>>,
}

/// Name of the built-in help generator.
pub const HELP: &str = "help";

impl PredefinedRegistry {
    /// A registry with no generators.
    pub fn empty() -> Self {
        Self {
            generators: BTreeMap::new(),
        }
    }

    /// A registry holding the built-in `help` generator.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(HELP, help);
        registry
    }

    /// Register or replace a generator.
    pub fn register<F>(&mut self, name: impl Into<String>, generator: F)
    where
        F: Fn(&DispatchConfig) -> Predefined + Send + Sync + 'static,
    {
        self.generators.insert(name.into(), Arc::new(generator));
    }

    /// Run the generator called `name`.
    pub fn generate(&self, name: &str, config: &DispatchConfig) -> Option<Predefined> {
        self.generators.get(name).map(|g| g(config))
    }

    /// Registered generator names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.generators.keys().map(String::as_str)
    }
}

impl Default for PredefinedRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PredefinedRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.generators.keys()).finish()
    }
}

/// Built-in generator: lists the visible siblings of the help node.
///
/// Any words after the help node are taken as an ignored `topic`, so a group
/// falling back to help shows the listing for `group unknown-word` too.
pub fn help(config: &DispatchConfig) -> Predefined {
    let handler = Handler::new(HelpExecutor)
        .with_parameters(
            ParameterModel::new().with(Parameter::new("topic", types::greedy_string())),
        )
        .with_description("Show available subcommands");
    Predefined {
        aliases: vec![config.help_key.clone(), "?".to_string()],
        handler: Arc::new(handler),
    }
}

/// Lists the subcommands next to the node it is attached to.
#[derive(Debug, Clone, Copy, Default)]
pub struct HelpExecutor;

impl CommandExecutor for HelpExecutor {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<Option<String>, CommandError> {
        let tree = ctx.tree();
        let caller = ctx.caller();
        let here = ctx.address();
        let parent = tree.parent(here).unwrap_or(NodeId::ROOT);
        let mut lines = Vec::new();
        for child in tree.children(parent) {
            if child == here {
                continue;
            }
            let mut line = tree.address(child);
            match tree.handler(child) {
                Some(handler) if !handler.is_visible_to(caller, tree, child) => continue,
                Some(handler) => {
                    let usage = handler.parameters().usage();
                    if !usage.is_empty() {
                        line.push(' ');
                        line.push_str(&usage);
                    }
                    if let Some(description) = handler.description() {
                        line.push_str(" - ");
                        line.push_str(description);
                    }
                }
                None => line.push_str(" ..."),
            }
            lines.push(line);
        }
        if lines.is_empty() {
            return Ok(Some("No subcommands available".to_string()));
        }
        Ok(Some(lines.join("\n")))
    }

    fn complete(&self, _ctx: &mut ExecutionContext<'_>) -> Vec<String> {
        Vec::new()
    }
}
