//! Pretty error rendering using ariadne.
//!
//! A failed command is shown against its input line, with the offending
//! token underlined when the error points at one. JSON mode prints a
//! structured outcome object instead.

use std::io::{self, IsTerminal};
use std::ops::Range;

use ariadne::{Color, Config, Fmt, Label, Report, ReportKind, Source};
use cmdtree_core::{CommandError, ErrorKind};
use serde::Serialize;

// ── Output format ───────────────────────────────────────────────────────

/// Output format for command outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Format {
    /// Coloured, source-annotated output (ariadne).
    Pretty,
    /// Machine-readable JSON.
    Json,
}

impl Format {
    /// Use the explicit choice, else pretty for terminals and JSON for pipes.
    pub(crate) fn resolve_or_detect(explicit: Option<&str>) -> Self {
        match explicit {
            Some("json") => Format::Json,
            Some("pretty") => Format::Pretty,
            _ => {
                if io::stdout().is_terminal() {
                    Format::Pretty
                } else {
                    Format::Json
                }
            }
        }
    }
}

// ── Error payload ───────────────────────────────────────────────────────

/// JSON shape of a [`CommandError`].
#[derive(Debug, Serialize)]
pub(crate) struct ErrorBody {
    pub(crate) kind: String,
    pub(crate) message: String,
    pub(crate) token: Option<usize>,
}

impl From<&CommandError> for ErrorBody {
    fn from(err: &CommandError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.message().to_string(),
            token: err.token(),
        }
    }
}

fn kind_color(kind: &ErrorKind) -> Color {
    match kind {
        ErrorKind::PermissionDenied { .. } | ErrorKind::Filtered => Color::Yellow,
        ErrorKind::NoCommand => Color::Blue,
        _ => Color::Red,
    }
}

/// Byte range of token `index` in `tokens` joined by single spaces.
///
/// An index past the end points just after the line so "missing argument"
/// errors still get a caret.
pub(crate) fn token_span(tokens: &[String], index: usize) -> Range<usize> {
    let mut start = 0;
    for (i, token) in tokens.iter().enumerate() {
        if i == index {
            return start..start + token.len();
        }
        start += token.len() + 1;
    }
    let end = start.saturating_sub(1);
    end..end
}

// ── Pretty rendering ────────────────────────────────────────────────────

/// Render `err` against the input `tokens` on stderr.
pub(crate) fn render_error_pretty(tokens: &[String], err: &CommandError) {
    let line = tokens.join(" ");
    let Some(index) = err.token() else {
        eprintln!("{}: {}", err.kind().fg(kind_color(err.kind())), err.message());
        return;
    };

    let name = "input";
    let span = token_span(tokens, index);
    let label = match err.kind() {
        ErrorKind::ArgumentRequired { parameter } => format!("expected {parameter} here"),
        ErrorKind::InvalidArgument { parameter } => format!("not a valid {parameter}"),
        ErrorKind::TooManyArguments => "unexpected argument".to_string(),
        ErrorKind::NoCommand => "unknown command".to_string(),
        _ => err.message().to_string(),
    };

    let report = Report::build(ReportKind::Error, (name, span.clone()))
        .with_code(err.kind().to_string())
        .with_message(err.message())
        .with_config(Config::default().with_compact(false))
        .with_label(
            Label::new((name, span))
                .with_message(label)
                .with_color(kind_color(err.kind())),
        )
        .finish();
    let mut cache = (name, Source::from(line));
    report.eprint(&mut cache).ok();
}
