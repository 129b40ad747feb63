//! Caller descriptor.
//!
//! The core never inspects who is invoking a command beyond the queries on
//! [`Caller`]: permission checks, sender kind, and message delivery.

use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Kind of entity issuing a command.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SenderKind {
    /// An interactive user.
    Player,
    /// The host's operator console.
    Console,
    /// An automated source (scripts, command blocks, schedulers).
    Automation,
}

impl fmt::Display for SenderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SenderKind::Player => write!(f, "player"),
            SenderKind::Console => write!(f, "console"),
            SenderKind::Automation => write!(f, "automation"),
        }
    }
}

/// Abstract invoker of a command.
pub trait Caller: Send + Sync {
    /// Display name used in messages and logs.
    fn name(&self) -> &str;

    /// Whether the caller holds `permission`.
    fn has_permission(&self, permission: &str) -> bool;

    /// What kind of sender this is.
    fn kind(&self) -> SenderKind;

    /// Deliver a message to the caller.
    fn send_message(&self, message: &str);
}

/// In-memory caller with an explicit permission set.
///
/// Messages sent to it are recorded and can be drained with
/// [`take_messages`](Self::take_messages). A permission of `*` grants
/// everything; `a.*` grants `a` and anything below it.
#[derive(Debug)]
pub struct SimpleCaller {
    name: String,
    kind: SenderKind,
    permissions: Vec<String>,
    messages: Mutex<Vec<String>>,
}

impl SimpleCaller {
    /// Create a caller with no permissions.
    pub fn new(name: impl Into<String>, kind: SenderKind) -> Self {
        Self {
            name: name.into(),
            kind,
            permissions: Vec::new(),
            messages: Mutex::new(Vec::new()),
        }
    }

    /// Grant a permission.
    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.push(permission.into());
        self
    }

    /// Grant several permissions.
    pub fn with_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions
            .extend(permissions.into_iter().map(Into::into));
        self
    }

    /// Drain every message delivered so far.
    pub fn take_messages(&self) -> Vec<String> {
        match self.messages.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

fn permission_matches(granted: &str, requested: &str) -> bool {
    if granted == "*" || granted == requested {
        return true;
    }
    match granted.strip_suffix(".*") {
        Some(prefix) => {
            requested == prefix
                || requested
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with('.'))
        }
        None => false,
    }
}

impl Caller for SimpleCaller {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_permission(&self, permission: &str) -> bool {
        self.permissions
            .iter()
            .any(|granted| permission_matches(granted, permission))
    }

    fn kind(&self) -> SenderKind {
        self.kind
    }

    fn send_message(&self, message: &str) {
        match self.messages.lock() {
            Ok(mut guard) => guard.push(message.to_string()),
            Err(poisoned) => poisoned.into_inner().push(message.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_permissions() {
        let caller = SimpleCaller::new("alex", SenderKind::Player)
            .with_permissions(["zone.*", "warp"]);
        assert!(caller.has_permission("zone"));
        assert!(caller.has_permission("zone.b.c"));
        assert!(!caller.has_permission("zones"));
        assert!(caller.has_permission("warp"));
        assert!(!caller.has_permission("warp.other"));

        let admin = SimpleCaller::new("root", SenderKind::Console).with_permission("*");
        assert!(admin.has_permission("anything.at.all"));
    }

    #[test]
    fn messages_are_recorded_and_drained() {
        let caller = SimpleCaller::new("alex", SenderKind::Player);
        caller.send_message("one");
        caller.send_message("two");
        assert_eq!(caller.take_messages(), vec!["one", "two"]);
        assert!(caller.take_messages().is_empty());
    }
}
