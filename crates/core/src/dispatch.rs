//! Resolution, dispatch, and completion.
//!
//! The [`Dispatcher`] walks the [`AddressTree`] from the root, consuming one
//! child key (or whatever a custom selector needs) per step, then runs the
//! resolved handler through its filters, parser, and executor.

use std::any::Any;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::buffer::TokenBuffer;
use crate::caller::Caller;
use crate::config::DispatchConfig;
use crate::context::ExecutionContext;
use crate::error::{CommandError, ErrorKind};
use crate::handler::Handler;
use crate::params::TypeRegistry;
use crate::tree::{AddressTree, NodeId};

/// Outcome of walking the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    /// Deepest node reached.
    pub node: NodeId,
    /// Tokens consumed by the walk, including those bound by trailing
    /// handlers. Zero on non-empty input means nothing matched.
    pub consumed: usize,
    /// Whether `node` is trailing and its handler already bound its
    /// parameters during the walk.
    pub inline_bound: bool,
}

/// Host-side presentation of failed commands.
pub trait FailureHandler: Send + Sync {
    /// Present `error`, raised while running `ctx`.
    fn handle(&self, caller: &dyn Caller, ctx: &ExecutionContext<'_>, error: &CommandError);
}

/// Logs the failure and sends its message to the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFailureHandler;

impl FailureHandler for DefaultFailureHandler {
    fn handle(&self, caller: &dyn Caller, ctx: &ExecutionContext<'_>, error: &CommandError) {
        let address = ctx.tree().address(ctx.address());
        if matches!(error.kind(), ErrorKind::Invocation) {
            warn!(caller = caller.name(), %address, error = ?error, "command failed");
        } else {
            debug!(caller = caller.name(), %address, kind = %error.kind(), "command rejected");
        }
        caller.send_message(error.message());
    }
}

/// Entry point for executing and completing commands against a tree.
pub struct Dispatcher {
    tree: AddressTree,
    config: DispatchConfig,
    types: TypeRegistry,
    failure: Arc<dyn FailureHandler>,
}

impl Dispatcher {
    /// Dispatch against `tree` with `config`.
    pub fn new(tree: AddressTree, config: DispatchConfig) -> Self {
        Self {
            tree,
            config,
            types: TypeRegistry::new(),
            failure: Arc::new(DefaultFailureHandler),
        }
    }

    /// Replace the failure handler.
    pub fn with_failure_handler(mut self, failure: Arc<dyn FailureHandler>) -> Self {
        self.failure = failure;
        self
    }

    /// Hand over the type registry used to build the tree.
    pub fn with_types(mut self, types: TypeRegistry) -> Self {
        self.types = types;
        self
    }

    /// The command tree.
    pub fn tree(&self) -> &AddressTree {
        &self.tree
    }

    /// Mutable access for rebuilds. Not for use while requests are running.
    pub fn tree_mut(&mut self) -> &mut AddressTree {
        &mut self.tree
    }

    /// Active configuration.
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Parameter types known to this dispatcher.
    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    /// A fresh context for executing `buffer`.
    pub fn context<'a>(
        &'a self,
        caller: &'a dyn Caller,
        buffer: TokenBuffer,
    ) -> ExecutionContext<'a> {
        ExecutionContext::new(caller, &self.tree, &self.config, buffer)
    }

    /// A fresh context for completing `buffer`.
    pub fn completion_context<'a>(
        &'a self,
        caller: &'a dyn Caller,
        buffer: TokenBuffer,
        host: Option<&'a (dyn Any + Send + Sync)>,
    ) -> ExecutionContext<'a> {
        let mut ctx = self.context(caller, buffer);
        ctx.completing = true;
        ctx.completion_context = host;
        ctx
    }

    // ── Resolution ──────────────────────────────────────────────────────

    /// Walk the tree from the root, consuming tokens from `ctx`'s buffer.
    ///
    /// Trailing handlers passed on the way are parsed and executed inline
    /// (parsed only, during completion); their errors abort the walk.
    pub fn resolve(&self, ctx: &mut ExecutionContext<'_>) -> Result<Resolution, CommandError> {
        let tree = ctx.tree;
        let start = ctx.buffer.cursor();
        let mut node = NodeId::ROOT;
        let mut inline_bound = false;

        while let Some(next) = ctx.buffer.peek() {
            if let Some(handler) = tree.handler(node)
                && handler
                    .executor()
                    .takes_precedence_over_subcommand(next, &ctx.buffer)
            {
                debug!(key = next, "handler takes precedence over subcommand");
                break;
            }
            let before = ctx.buffer.cursor();
            let Some(child) = tree.select_child(node, &mut ctx.buffer) else {
                break;
            };
            if let Some(handler) = tree.handler(child)
                && !handler.is_visible_to(ctx.caller, tree, child)
            {
                debug!(address = %tree.address(child), "hidden from caller");
                ctx.buffer.set_cursor(before);
                break;
            }
            if ctx.completing && !ctx.buffer.has_next() {
                // The last token stays available as the partial to complete.
                ctx.buffer.set_cursor(before);
                break;
            }
            node = child;
            inline_bound = false;
            trace!(address = %tree.address(node), cursor = ctx.buffer.cursor(), "descended");

            if tree.node(node).is_trailing()
                && let Some(handler) = tree.handler(node)
            {
                if !self.run_trailing(ctx, node, Arc::clone(handler))? {
                    break;
                }
                inline_bound = true;
            }
        }

        Ok(Resolution {
            node,
            consumed: ctx.buffer.cursor() - start,
            inline_bound,
        })
    }

    /// Run a trailing handler in a sub-scope and advance past what it bound.
    /// Returns `false` when resolution should stop at `node`, which happens
    /// when no tokens are left for deeper nodes. In that case no filter has
    /// run yet; `execute` runs them once for the target.
    fn run_trailing(
        &self,
        ctx: &mut ExecutionContext<'_>,
        node: NodeId,
        handler: Arc<Handler>,
    ) -> Result<bool, CommandError> {
        let mut lookahead = ctx.sub_scope(node, Arc::clone(&handler));
        let parsed = lookahead.parse_parameters();
        if ctx.completing {
            if parsed.is_err()
                || lookahead.completion_target.is_some()
                || !lookahead.buffer.has_next()
            {
                return Ok(false);
            }
            ctx.buffer.set_cursor(lookahead.buffer.cursor());
            return Ok(true);
        }
        if parsed.is_ok() && !lookahead.buffer.has_next() {
            // Nothing deeper to resolve; the handler runs as the target.
            return Ok(false);
        }

        // Parse failures surface below, after the pre-parameter filters.
        debug!(address = %self.tree.address(node), "running trailing handler");
        let mut scope = ctx.sub_scope(node, Arc::clone(&handler));
        for filter in handler.pre_parameter_filters() {
            filter.filter(&scope)?;
        }
        scope.parse_parameters()?;
        for filter in handler.post_parameter_filters() {
            filter.filter(&scope)?;
        }
        let response = handler.executor().execute(&mut scope)?;
        if let Some(response) = response {
            scope.reply(&response);
        }
        ctx.buffer.set_cursor(scope.buffer.cursor());
        Ok(true)
    }

    /// The handler to run for `node`: its own, or its help child's.
    fn effective_handler(&self, node: NodeId) -> Option<(NodeId, Arc<Handler>)> {
        if let Some(handler) = self.tree.handler(node) {
            return Some((node, Arc::clone(handler)));
        }
        let help = self.tree.child(node, &self.config.help_key)?;
        let handler = self.tree.handler(help)?;
        Some((help, Arc::clone(handler)))
    }

    // ── Execution ───────────────────────────────────────────────────────

    /// Resolve, filter, parse, and execute.
    ///
    /// Fails with [`ErrorKind::NoCommand`] when nothing matched.
    pub fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<Option<String>, CommandError> {
        if !ctx.completing {
            ctx.buffer.drop_trailing_empty_elements();
        }
        let resolution = self.resolve(ctx)?;
        if resolution.consumed == 0
            && ctx.buffer.has_next()
            && self.tree.handler(NodeId::ROOT).is_none()
        {
            return Err(CommandError::no_command().at_token(ctx.buffer.cursor()));
        }
        if resolution.inline_bound {
            // A trailing handler ran and the rest matched no subcommand.
            return Err(CommandError::too_many_arguments().at_token(ctx.buffer.cursor()));
        }
        let Some((address, handler)) = self.effective_handler(resolution.node) else {
            return Err(CommandError::no_command());
        };
        debug!(
            caller = ctx.caller.name(),
            address = %self.tree.address(address),
            "dispatching"
        );
        ctx.bind(address, Arc::clone(&handler));

        if handler.merge_quotes().unwrap_or(self.config.merge_quotes) {
            ctx.buffer = ctx.buffer.merge_quoted();
        }
        for filter in handler.pre_parameter_filters() {
            filter.filter(ctx)?;
        }
        ctx.parse_parameters()?;
        for filter in handler.post_parameter_filters() {
            filter.filter(ctx)?;
        }
        handler.executor().execute(ctx)
    }

    /// Execute `buffer` for `caller`.
    ///
    /// Returns whether a command was attempted: `true` once a handler was
    /// found, even when it failed. Failures go to the failure handler and
    /// responses to the caller.
    pub fn dispatch(&self, caller: &dyn Caller, buffer: TokenBuffer) -> bool {
        let mut ctx = self.context(caller, buffer);
        match self.execute(&mut ctx) {
            Ok(response) => {
                if let Some(response) = response {
                    ctx.reply(&response);
                }
                true
            }
            Err(err) if matches!(err.kind(), ErrorKind::NoCommand) => {
                debug!(caller = caller.name(), "no command matched");
                false
            }
            Err(err) => {
                self.failure.handle(caller, &ctx, &err);
                true
            }
        }
    }

    // ── Completion ──────────────────────────────────────────────────────

    /// Suggestions for the last token of `buffer`.
    ///
    /// Errors are swallowed; completion degrades to whatever could be
    /// computed before the failure.
    pub fn complete(
        &self,
        caller: &dyn Caller,
        buffer: TokenBuffer,
        host: Option<&(dyn Any + Send + Sync)>,
    ) -> Vec<String> {
        let buffer = if buffer.is_empty() {
            TokenBuffer::new([""])
        } else {
            buffer
        };
        let mut ctx = self.completion_context(caller, buffer, host);
        let resolution = match self.resolve(&mut ctx) {
            Ok(resolution) => resolution,
            Err(err) => {
                debug!(error = %err, "resolution failed during completion");
                return Vec::new();
            }
        };
        let node = resolution.node;
        let mut out = Vec::new();

        if ctx.buffer.remaining() == 1 {
            let partial = ctx.buffer.peek().unwrap_or("").to_lowercase();
            for child in self.tree.children(node) {
                if let Some(handler) = self.tree.handler(child)
                    && !handler.is_visible_to(caller, &self.tree, child)
                {
                    continue;
                }
                out.extend(
                    self.tree
                        .live_names(child)
                        .into_iter()
                        .filter(|name| name.to_lowercase().starts_with(&partial))
                        .map(str::to_string),
                );
            }
        }

        if let Some(handler) = self.tree.handler(node).map(Arc::clone)
            && !resolution.inline_bound
        {
            ctx.bind(node, Arc::clone(&handler));
            match handler
                .pre_parameter_filters()
                .try_for_each(|f| f.filter(&ctx))
            {
                Ok(()) => out.extend(handler.executor().complete(&mut ctx)),
                Err(err) => debug!(error = %err, "filter rejected completion"),
            }
        }

        let mut seen = std::collections::HashSet::new();
        out.retain(|s| seen.insert(s.clone()));
        out.truncate(self.config.max_suggestions);
        out
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("tree", &self.tree)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
