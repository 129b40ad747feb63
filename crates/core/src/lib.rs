//! Command tree core library.
//!
//! Resolves a line of whitespace-tokenized input against a tree of command
//! addresses, binds the handler's declared parameters from the remaining
//! tokens, and runs it, or answers "what comes next" for completion. The
//! main entry points are [`TreeBuilder`] for assembling a tree and
//! [`Dispatcher::dispatch`] / [`Dispatcher::complete`] for serving requests.

#![warn(missing_docs)]

/// Cursor-addressable token buffer and quote preprocessing.
pub mod buffer;
/// Path-based tree assembly.
pub mod builder;
/// Caller descriptor.
pub mod caller;
/// Dispatcher configuration.
pub mod config;
/// Per-call execution state.
pub mod context;
/// Resolution, dispatch, and completion.
pub mod dispatch;
/// The command error type.
pub mod error;
/// Context filters and inheritable permissions.
pub mod filter;
/// Handlers, executors, and predefined handlers.
pub mod handler;
/// Parameter model, types, values, and the parser.
pub mod params;
/// Host registry label policy.
pub mod registration;
/// Command address tree.
pub mod tree;

// ── Convenience re-exports ──────────────────────────────────────────────────
// Flat imports for the most common entry points. The full module paths
// remain available for less common types.

// Building
pub use builder::TreeBuilder;
pub use config::DispatchConfig;
pub use handler::{CommandExecutor, Handler, PredefinedRegistry};
pub use params::{ParamInfo, Parameter, ParameterModel, TypeRegistry, Value, ValueKind};
pub use tree::{AddressTree, NodeId};

// Serving
pub use buffer::TokenBuffer;
pub use caller::{Caller, SenderKind, SimpleCaller};
pub use context::ExecutionContext;
pub use dispatch::{DefaultFailureHandler, Dispatcher, FailureHandler, Resolution};

// Errors
pub use error::{CommandError, ErrorKind};

// Filters
pub use filter::{ContextFilter, FilterPriority, InheritPermission, PermissionFilter};

// Registration
pub use registration::{CollisionPolicy, Label, top_level_labels};
