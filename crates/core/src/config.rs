//! Dispatcher configuration.

use serde::{Deserialize, Serialize};

/// Tunables shared by resolution, parsing, and completion.
///
/// Defaults:
/// - `flag_marker`: `-`
/// - `help_key`: `help`
/// - `merge_quotes`: `true`
/// - `max_suggestions`: 100
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DispatchConfig {
    /// Leading character that marks a flag parameter name.
    pub flag_marker: char,
    /// Key of the fallback child used when a resolved node has no handler.
    pub help_key: String,
    /// Merge quoted token runs into single tokens before parsing.
    pub merge_quotes: bool,
    /// Upper bound on completion suggestions returned to the host.
    pub max_suggestions: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            flag_marker: '-',
            help_key: "help".to_string(),
            merge_quotes: true,
            max_suggestions: 100,
        }
    }
}

impl DispatchConfig {
    /// Configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag marker character.
    pub fn with_flag_marker(mut self, marker: char) -> Self {
        self.flag_marker = marker;
        self
    }

    /// Set the help fallback key.
    pub fn with_help_key(mut self, key: impl Into<String>) -> Self {
        self.help_key = key.into();
        self
    }

    /// Enable or disable quote merging.
    pub fn with_merge_quotes(mut self, merge: bool) -> Self {
        self.merge_quotes = merge;
        self
    }

    /// Set the completion suggestion limit.
    pub fn with_max_suggestions(mut self, max: usize) -> Self {
        self.max_suggestions = max;
        self
    }
}
