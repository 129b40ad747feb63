//! Cursor-addressable token buffer.
//!
//! A [`TokenBuffer`] wraps an immutable, shared token array with a cursor in
//! `[0, len]`. Movement past either end yields `None` instead of failing, so
//! callers check presence before assuming a token exists.

use std::fmt;
use std::sync::Arc;

use crate::error::CommandError;

/// Cursor over an immutable token array.
pub struct TokenBuffer {
    tokens: Arc<[String]>,
    cursor: usize,
    /// Lazily created look-ahead buffer sharing `tokens`.
    shadow: Option<Box<TokenBuffer>>,
}

impl TokenBuffer {
    /// Create a buffer positioned at the first token.
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_shared(tokens.into_iter().map(Into::into).collect())
    }

    /// Split a raw input line on single spaces.
    ///
    /// Consecutive or trailing spaces produce empty tokens; a trailing empty
    /// token is what marks "complete the next argument" in completion mode.
    pub fn from_line(line: &str) -> Self {
        if line.is_empty() {
            return Self::new(Vec::<String>::new());
        }
        Self::new(line.split(' '))
    }

    fn from_shared(tokens: Arc<[String]>) -> Self {
        Self {
            tokens,
            cursor: 0,
            shadow: None,
        }
    }

    // ── Queries ─────────────────────────────────────────────────────────

    /// Total number of tokens, independent of the cursor.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// `true` when the backing array holds no tokens.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Current cursor position in `[0, len]`.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Move the cursor to `cursor`.
    ///
    /// # Panics
    /// Panics if `cursor > len`.
    pub fn set_cursor(&mut self, cursor: usize) {
        assert!(
            cursor <= self.tokens.len(),
            "cursor {cursor} out of bounds for {} tokens",
            self.tokens.len()
        );
        self.cursor = cursor;
    }

    /// Number of tokens at or after the cursor.
    pub fn remaining(&self) -> usize {
        self.tokens.len() - self.cursor
    }

    /// `true` when a token is available at the cursor.
    pub fn has_next(&self) -> bool {
        self.cursor < self.tokens.len()
    }

    /// `true` when a token is available before the cursor.
    pub fn has_previous(&self) -> bool {
        self.cursor > 0
    }

    /// Token at the cursor, without moving.
    pub fn peek(&self) -> Option<&str> {
        self.tokens.get(self.cursor).map(String::as_str)
    }

    /// Token just before the cursor, without moving.
    pub fn peek_previous(&self) -> Option<&str> {
        self.cursor
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map(String::as_str)
    }

    /// Token at an absolute index.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.tokens.get(index).map(String::as_str)
    }

    /// All tokens, ignoring the cursor.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Tokens from the cursor to the end.
    pub fn rest(&self) -> &[String] {
        &self.tokens[self.cursor..]
    }

    /// Tokens from the cursor joined with single spaces.
    pub fn rest_joined(&self) -> String {
        self.rest().join(" ")
    }

    // ── Movement ────────────────────────────────────────────────────────

    /// Return the token at the cursor and advance past it.
    pub fn next(&mut self) -> Option<&str> {
        let token = self.tokens.get(self.cursor)?;
        self.cursor += 1;
        Some(token.as_str())
    }

    /// Step back one token and return it.
    pub fn previous(&mut self) -> Option<&str> {
        let index = self.cursor.checked_sub(1)?;
        self.cursor = index;
        Some(self.tokens[index].as_str())
    }

    /// Like [`next`](Self::next), failing "argument required" for `parameter`
    /// when the buffer is exhausted.
    pub fn require_next(&mut self, parameter: &str) -> Result<&str, CommandError> {
        let cursor = self.cursor;
        self.next()
            .ok_or_else(|| CommandError::argument_required(parameter).at_token(cursor))
    }

    /// Advance by up to `n` tokens; returns how many were skipped.
    pub fn advance(&mut self, n: usize) -> usize {
        let step = n.min(self.remaining());
        self.cursor += step;
        step
    }

    /// Rewind by up to `n` tokens; returns how many were stepped back.
    pub fn rewind(&mut self, n: usize) -> usize {
        let step = n.min(self.cursor);
        self.cursor -= step;
        step
    }

    /// Move the cursor to the end of the buffer.
    pub fn skip_rest(&mut self) {
        self.cursor = self.tokens.len();
    }

    // ── Derived buffers ─────────────────────────────────────────────────

    /// Strip a trailing run of empty tokens.
    ///
    /// Skipped by the dispatcher for completion requests, where a trailing
    /// empty token marks the completion position.
    pub fn drop_trailing_empty_elements(&mut self) {
        let keep = self
            .tokens
            .iter()
            .rposition(|t| !t.is_empty())
            .map_or(0, |i| i + 1);
        if keep == self.tokens.len() {
            return;
        }
        self.tokens = self.tokens[..keep].to_vec().into();
        self.cursor = self.cursor.min(keep);
        self.shadow = None;
    }

    /// Shared look-ahead buffer synchronized to this buffer's cursor.
    ///
    /// The same instance is returned on every call; its cursor is reset to
    /// ours each time, so probing it never disturbs the primary cursor.
    pub fn unaffecting_copy(&mut self) -> &mut TokenBuffer {
        let cursor = self.cursor;
        let tokens = &self.tokens;
        let shadow = self
            .shadow
            .get_or_insert_with(|| Box::new(TokenBuffer::from_shared(Arc::clone(tokens))));
        shadow.cursor = cursor;
        shadow
    }

    /// Build a buffer where quoted runs after the cursor are merged into
    /// single tokens. Tokens before the cursor are kept verbatim and the new
    /// buffer starts at the same cursor.
    pub fn merge_quoted(&self) -> TokenBuffer {
        let mut merged: Vec<String> = self.tokens[..self.cursor].to_vec();
        merged.extend(merge_quoted_runs(&self.tokens[self.cursor..]));
        let mut out = TokenBuffer::new(merged);
        out.cursor = self.cursor;
        out
    }
}

/// Merge `"a`, `b`, `c"` into `a b c`. Unterminated quotes are left alone.
fn merge_quoted_runs(tokens: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        let token = &tokens[i];
        if let Some(rest) = token.strip_prefix('"') {
            if let Some(inner) = rest.strip_suffix('"') {
                out.push(inner.to_string());
                i += 1;
                continue;
            }
            if let Some(end) = (i + 1..tokens.len()).find(|&j| tokens[j].ends_with('"')) {
                let mut joined = rest.to_string();
                for part in &tokens[i + 1..=end] {
                    joined.push(' ');
                    joined.push_str(part);
                }
                joined.pop();
                out.push(joined);
                i = end + 1;
                continue;
            }
        }
        out.push(token.clone());
        i += 1;
    }
    out
}

impl Clone for TokenBuffer {
    fn clone(&self) -> Self {
        Self {
            tokens: Arc::clone(&self.tokens),
            cursor: self.cursor,
            shadow: None,
        }
    }
}

impl Default for TokenBuffer {
    fn default() -> Self {
        Self::new(Vec::<String>::new())
    }
}

impl fmt::Debug for TokenBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenBuffer")
            .field("tokens", &self.tokens)
            .field("cursor", &self.cursor)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buf(tokens: &[&str]) -> TokenBuffer {
        TokenBuffer::new(tokens.iter().copied())
    }

    #[test]
    fn next_and_previous_stop_at_bounds() {
        let mut b = buf(&["a", "b"]);
        assert!(!b.has_previous());
        assert_eq!(b.previous(), None);
        assert_eq!(b.next(), Some("a"));
        assert_eq!(b.next(), Some("b"));
        assert_eq!(b.next(), None);
        assert_eq!(b.cursor(), 2);
        assert!(b.has_previous());
        assert_eq!(b.previous(), Some("b"));
        assert_eq!(b.peek(), Some("b"));
        assert_eq!(b.peek_previous(), Some("a"));
    }

    #[test]
    fn require_next_fails_when_exhausted() {
        let mut b = buf(&["x"]);
        assert_eq!(b.require_next("value").unwrap(), "x");
        let err = b.require_next("value").unwrap_err();
        assert!(err.is_argument_required("value"));
        assert_eq!(err.token(), Some(1));
    }

    #[test]
    fn advance_and_rewind_are_bounded() {
        let mut b = buf(&["a", "b", "c"]);
        assert_eq!(b.advance(10), 3);
        assert!(!b.has_next());
        assert_eq!(b.rewind(2), 2);
        assert_eq!(b.rest(), ["b".to_string(), "c".to_string()]);
        assert_eq!(b.rewind(5), 1);
        assert_eq!(b.cursor(), 0);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn set_cursor_past_end_panics() {
        buf(&["a"]).set_cursor(2);
    }

    #[test]
    fn from_line_keeps_trailing_empty_token() {
        let b = TokenBuffer::from_line("greet ");
        assert_eq!(b.tokens(), ["greet".to_string(), String::new()]);
        assert!(TokenBuffer::from_line("").is_empty());
    }

    #[test]
    fn drop_trailing_empty_elements_strips_run_once() {
        let mut b = buf(&["a", "", "b", "", ""]);
        b.advance(5);
        b.drop_trailing_empty_elements();
        assert_eq!(b.len(), 3);
        assert_eq!(b.cursor(), 3);
        assert_eq!(b.get(1), Some(""));

        let mut all_empty = buf(&["", ""]);
        all_empty.drop_trailing_empty_elements();
        assert!(all_empty.is_empty());
    }

    #[test]
    fn unaffecting_copy_resyncs_to_owner_cursor() {
        let mut b = buf(&["a", "b", "c"]);
        b.next();
        {
            let shadow = b.unaffecting_copy();
            assert_eq!(shadow.next(), Some("b"));
            assert_eq!(shadow.next(), Some("c"));
        }
        assert_eq!(b.cursor(), 1);
        b.next();
        let shadow = b.unaffecting_copy();
        assert_eq!(shadow.cursor(), 2);
        assert_eq!(shadow.peek(), Some("c"));
    }

    #[test]
    fn merge_quoted_joins_runs_after_cursor() {
        let mut b = buf(&["say", "\"hello", "big", "world\"", "now"]);
        b.next();
        let merged = b.merge_quoted();
        assert_eq!(merged.cursor(), 1);
        assert_eq!(
            merged.tokens(),
            ["say", "hello big world", "now"].map(String::from)
        );
    }

    #[test]
    fn merge_quoted_single_and_unterminated() {
        let b = buf(&["\"one\"", "\"open", "rest"]);
        let merged = b.merge_quoted();
        assert_eq!(merged.tokens(), ["one", "\"open", "rest"].map(String::from));
    }

    #[test]
    fn merge_quoted_without_quotes_is_identity() {
        let b = buf(&["plain", "tokens", "", "here"]);
        assert_eq!(b.merge_quoted().tokens(), b.tokens());
    }
}
