//! Per-call execution state.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::trace;

use crate::buffer::TokenBuffer;
use crate::caller::Caller;
use crate::config::DispatchConfig;
use crate::error::CommandError;
use crate::handler::Handler;
use crate::params::{Parameter, Value, parser};
use crate::tree::{AddressTree, NodeId};

/// Parameter and buffer position a completion request is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionTarget {
    /// Name of the parameter being completed.
    pub parameter: String,
    /// Cursor at which that parameter's token starts.
    pub cursor: usize,
}

/// Mutable state for one resolve-parse-execute (or resolve-complete) request.
///
/// A context is created by the [`Dispatcher`](crate::dispatch::Dispatcher),
/// used for exactly one request, and then dropped.
pub struct ExecutionContext<'a> {
    pub(crate) caller: &'a dyn Caller,
    pub(crate) tree: &'a AddressTree,
    pub(crate) config: &'a DispatchConfig,
    pub(crate) address: NodeId,
    pub(crate) handler: Option<Arc<Handler>>,
    /// Input as received, kept for redisplay.
    pub(crate) original: TokenBuffer,
    /// Buffer used for resolution and parsing.
    pub(crate) buffer: TokenBuffer,
    pub(crate) values: HashMap<String, Value>,
    pub(crate) supplied: HashSet<String>,
    pub(crate) completing: bool,
    /// Parse only this handler's own parameters and leave the rest.
    pub(crate) trailing: bool,
    pub(crate) completion_target: Option<CompletionTarget>,
    pub(crate) completion_context: Option<&'a (dyn Any + Send + Sync)>,
    pub(crate) muted: bool,
    parsed: bool,
}

impl<'a> ExecutionContext<'a> {
    pub(crate) fn new(
        caller: &'a dyn Caller,
        tree: &'a AddressTree,
        config: &'a DispatchConfig,
        buffer: TokenBuffer,
    ) -> Self {
        Self {
            caller,
            tree,
            config,
            address: NodeId::ROOT,
            handler: None,
            original: buffer.clone(),
            buffer,
            values: HashMap::new(),
            supplied: HashSet::new(),
            completing: false,
            trailing: false,
            completion_target: None,
            completion_context: None,
            muted: false,
            parsed: false,
        }
    }

    /// A fresh context for running `handler` at `node` inline, starting at
    /// this context's cursor.
    pub(crate) fn sub_scope(&self, node: NodeId, handler: Arc<Handler>) -> ExecutionContext<'a> {
        ExecutionContext {
            address: node,
            handler: Some(handler),
            original: self.original.clone(),
            buffer: self.buffer.clone(),
            completing: self.completing,
            trailing: true,
            completion_context: self.completion_context,
            ..ExecutionContext::new(self.caller, self.tree, self.config, TokenBuffer::default())
        }
    }

    pub(crate) fn bind(&mut self, address: NodeId, handler: Arc<Handler>) {
        self.address = address;
        self.handler = Some(handler);
    }

    // ── Accessors ───────────────────────────────────────────────────────

    /// Who invoked the command.
    pub fn caller(&self) -> &'a dyn Caller {
        self.caller
    }

    /// The tree being dispatched against.
    pub fn tree(&self) -> &'a AddressTree {
        self.tree
    }

    /// Dispatcher configuration.
    pub fn config(&self) -> &'a DispatchConfig {
        self.config
    }

    /// Node the handler was resolved at.
    pub fn address(&self) -> NodeId {
        self.address
    }

    /// Main keys from the root to the resolved node.
    pub fn address_keys(&self) -> Vec<&'a str> {
        self.tree.path(self.address)
    }

    /// Resolved handler, once bound.
    pub fn handler(&self) -> Option<&Arc<Handler>> {
        self.handler.as_ref()
    }

    /// Input as received.
    pub fn original(&self) -> &TokenBuffer {
        &self.original
    }

    /// Buffer used for parsing.
    pub fn buffer(&self) -> &TokenBuffer {
        &self.buffer
    }

    /// Whether this is a completion request.
    pub fn is_completing(&self) -> bool {
        self.completing
    }

    /// Host value passed through completion untouched.
    pub fn completion_context(&self) -> Option<&'a (dyn Any + Send + Sync)> {
        self.completion_context
    }

    /// Parameter a completion request targets, if one was found.
    pub fn completion_target(&self) -> Option<&CompletionTarget> {
        self.completion_target.as_ref()
    }

    /// Every bound value.
    pub fn values(&self) -> &HashMap<String, Value> {
        &self.values
    }

    /// Value bound to `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Text bound to `name`.
    pub fn get_text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Integer bound to `name`.
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    /// Boolean bound to `name`; absent counts as `false`.
    pub fn get_bool(&self, name: &str) -> bool {
        self.get(name).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Whether `name` received input rather than a default.
    pub fn was_supplied(&self, name: &str) -> bool {
        self.supplied.contains(name)
    }

    /// Whether parameters have been parsed.
    pub fn is_parsed(&self) -> bool {
        self.parsed
    }

    /// Whether the response will be suppressed.
    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Suppress (or restore) the response message.
    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    /// Send a message to the caller unless muted.
    pub fn reply(&self, message: &str) {
        if !self.muted {
            self.caller.send_message(message);
        }
    }

    // ── Parsing ─────────────────────────────────────────────────────────

    /// Bind the handler's parameters from the buffer.
    ///
    /// # Panics
    /// Panics when called a second time on the same context.
    pub fn parse_parameters(&mut self) -> Result<(), CommandError> {
        assert!(!self.parsed, "parameters already parsed for this context");
        self.parsed = true;
        let Some(handler) = self.handler.clone() else {
            return Ok(());
        };
        parser::parse(self, handler.parameters())
    }

    /// Suggestions for the parameter under the cursor.
    ///
    /// Parses first when that has not happened yet; parse errors are
    /// expected here and only shape which target is completed.
    pub fn parameter_completions(&mut self) -> Vec<String> {
        if !self.parsed
            && let Err(err) = self.parse_parameters()
        {
            trace!(error = %err, "parse stopped during completion");
        }
        let Some(handler) = self.handler.clone() else {
            return Vec::new();
        };
        let model = handler.parameters();
        let Some(target) = self.completion_target.clone() else {
            let partial = self.buffer.tokens().last().cloned().unwrap_or_default();
            return self.unsupplied_flags(model.flags(), &partial);
        };
        let Some(param) = model.get(&target.parameter) else {
            return Vec::new();
        };
        let caller = self.caller;
        let shadow = self.buffer.unaffecting_copy();
        shadow.set_cursor(target.cursor);
        let partial = shadow.peek().unwrap_or("").to_string();
        let mut out = param.kind().complete(param, caller, shadow);
        if partial.starts_with(self.config.flag_marker) {
            out.extend(self.unsupplied_flags(model.flags(), &partial));
        }
        out
    }

    fn unsupplied_flags<'p>(
        &self,
        flags: impl Iterator<Item = &'p Parameter>,
        partial: &str,
    ) -> Vec<String> {
        flags
            .filter(|f| !self.supplied.contains(f.name()))
            .filter(|f| f.permission().is_none_or(|p| self.caller.has_permission(p)))
            .filter(|f| f.name().starts_with(partial))
            .map(|f| f.name().to_string())
            .collect()
    }
}

impl std::fmt::Debug for ExecutionContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("caller", &self.caller.name())
            .field("address", &self.address)
            .field("buffer", &self.buffer)
            .field("values", &self.values)
            .field("completing", &self.completing)
            .field("completion_target", &self.completion_target)
            .finish_non_exhaustive()
    }
}
