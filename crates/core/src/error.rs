//! The command error type.
//!
//! Every recoverable failure during resolution, filtering, parsing, or
//! execution is a [`CommandError`]. Programmer misuse (re-parsing a context,
//! re-attaching a node, mutating a finalized alias list) panics instead.

use std::error::Error as StdError;
use std::fmt;

/// Boxed cause attached to a [`CommandError`].
pub type BoxedCause = Box<dyn StdError + Send + Sync + 'static>;

/// Machine-readable classification of a [`CommandError`].
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A required parameter received no token.
    ArgumentRequired {
        /// Name of the parameter that was missing.
        parameter: String,
    },
    /// Tokens were left over after every parameter was bound.
    TooManyArguments,
    /// A token could not be parsed by the parameter's type.
    InvalidArgument {
        /// Name of the parameter being parsed.
        parameter: String,
    },
    /// The caller lacks a required permission.
    PermissionDenied {
        /// The permission that was checked.
        permission: String,
    },
    /// A context filter rejected the call for a reason other than permissions.
    Filtered,
    /// No command matched the input.
    NoCommand,
    /// The handler body failed.
    Invocation,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::ArgumentRequired { .. } => write!(f, "argument-required"),
            ErrorKind::TooManyArguments => write!(f, "too-many-arguments"),
            ErrorKind::InvalidArgument { .. } => write!(f, "invalid-argument"),
            ErrorKind::PermissionDenied { .. } => write!(f, "permission-denied"),
            ErrorKind::Filtered => write!(f, "filtered"),
            ErrorKind::NoCommand => write!(f, "no-command"),
            ErrorKind::Invocation => write!(f, "invocation"),
        }
    }
}

/// Error raised while resolving, filtering, parsing, or executing a command.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct CommandError {
    message: String,
    kind: ErrorKind,
    /// Index of the offending token in the parsed buffer, when known.
    token: Option<usize>,
    #[source]
    source: Option<BoxedCause>,
}

impl CommandError {
    /// Create a filter rejection with a free-form message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: ErrorKind::Filtered,
            token: None,
            source: None,
        }
    }

    /// Create an error with an explicit kind.
    pub fn with_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
            token: None,
            source: None,
        }
    }

    /// A required parameter had no input.
    pub fn argument_required(parameter: &str) -> Self {
        Self::with_kind(
            ErrorKind::ArgumentRequired {
                parameter: parameter.to_string(),
            },
            format!("Argument '{parameter}' is required"),
        )
    }

    /// Input continued past the last parameter.
    pub fn too_many_arguments() -> Self {
        Self::with_kind(ErrorKind::TooManyArguments, "Too many arguments")
    }

    /// A token was rejected by a parameter type.
    pub fn invalid_argument(parameter: &str, message: impl Into<String>) -> Self {
        Self::with_kind(
            ErrorKind::InvalidArgument {
                parameter: parameter.to_string(),
            },
            message,
        )
    }

    /// The caller lacks `permission`.
    pub fn permission_denied(permission: &str) -> Self {
        Self::with_kind(
            ErrorKind::PermissionDenied {
                permission: permission.to_string(),
            },
            "You do not have permission to do that",
        )
    }

    /// Nothing in the tree matched the input.
    pub fn no_command() -> Self {
        Self::with_kind(ErrorKind::NoCommand, "No such command")
    }

    /// Wrap a failure from a handler body.
    pub fn invocation(cause: impl Into<BoxedCause>) -> Self {
        Self {
            message: "An internal error occurred while executing this command".to_string(),
            kind: ErrorKind::Invocation,
            token: None,
            source: Some(cause.into()),
        }
    }

    /// Attach a cause.
    pub fn with_source(mut self, cause: impl Into<BoxedCause>) -> Self {
        self.source = Some(cause.into());
        self
    }

    /// Attach the index of the offending token, unless one is already set.
    pub fn at_token(mut self, index: usize) -> Self {
        self.token.get_or_insert(index);
        self
    }

    /// User-facing message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Classification of this error.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Index of the offending token, if known.
    pub fn token(&self) -> Option<usize> {
        self.token
    }

    /// `true` for [`ErrorKind::ArgumentRequired`] on `parameter`.
    pub fn is_argument_required(&self, parameter: &str) -> bool {
        matches!(&self.kind, ErrorKind::ArgumentRequired { parameter: p } if p == parameter)
    }
}
