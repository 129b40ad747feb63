//! Response templates for manifest-declared commands.

use cmdtree_core::{CommandError, CommandExecutor, ExecutionContext};

/// Executor that replies with a rendered template, or nothing.
#[derive(Debug, Clone, Default)]
pub struct TemplateExecutor {
    template: Option<String>,
}

impl TemplateExecutor {
    /// Executor for `template`; `None` replies with nothing.
    pub fn new(template: Option<String>) -> Self {
        Self { template }
    }

    /// The raw template.
    pub fn template(&self) -> Option<&str> {
        self.template.as_deref()
    }
}

impl CommandExecutor for TemplateExecutor {
    fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<Option<String>, CommandError> {
        Ok(self.template.as_deref().map(|t| render_template(t, ctx)))
    }
}

/// Substitute `{name}` placeholders with bound values.
///
/// `{caller}` and `{address}` resolve to the caller's name and the handler's
/// address unless a parameter of that name is bound. Unknown placeholders
/// and unbalanced braces are copied through.
pub fn render_template(template: &str, ctx: &ExecutionContext<'_>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find(['{', '}']).filter(|&i| after.as_bytes()[i] == b'}') else {
            out.push('{');
            rest = after;
            continue;
        };
        let key = &after[..close];
        match lookup(key, ctx) {
            Some(value) => out.push_str(&value),
            None => {
                out.push('{');
                out.push_str(key);
                out.push('}');
            }
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}

fn lookup(key: &str, ctx: &ExecutionContext<'_>) -> Option<String> {
    if let Some(value) = ctx.get(key) {
        return Some(value.to_string());
    }
    match key {
        "caller" => Some(ctx.caller().name().to_string()),
        "address" => Some(ctx.tree().address(ctx.address())),
        _ => None,
    }
}
