mod render;

use std::collections::BTreeMap;
use std::fs;
use std::process;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use cmdtree_core::{
    CollisionPolicy, Dispatcher, ErrorKind, NodeId, SenderKind, SimpleCaller, TokenBuffer, Value,
    top_level_labels,
};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::render::{ErrorBody, Format, render_error_pretty};

// ── CLI definition ──────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "cmdtree",
    version,
    about = "Run, complete, and inspect command trees described by JSON manifests"
)]
struct Cli {
    /// Output mode: "pretty" for coloured terminal output, "json" for
    /// machine-readable JSON. Defaults to "pretty" when stdout is a TTY,
    /// "json" otherwise.
    #[arg(long, global = true, value_parser = ["pretty", "json"])]
    output: Option<String>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Resolve and execute a command line against a manifest.
    Run(Invocation),

    /// Print completion suggestions for the last token of a command line.
    Complete(Invocation),

    /// Print every address in the tree with its aliases.
    Tree {
        /// Path to the manifest JSON.
        manifest: String,
    },

    /// Print the top-level labels a host registry should claim.
    Labels {
        /// Path to the manifest JSON.
        manifest: String,
        /// How to treat labels already owned by someone else.
        #[arg(long, value_enum, default_value_t = PolicyArg::MainAndFallback)]
        policy: PolicyArg,
        /// Namespace for `prefix:key` fallback labels. Empty disables them.
        #[arg(long, default_value = "")]
        prefix: String,
        /// Labels already owned by another command.
        #[arg(long = "taken")]
        taken: Vec<String>,
    },
}

/// Manifest, caller and input shared by `run` and `complete`.
#[derive(Args, Debug)]
struct Invocation {
    /// Path to the manifest JSON.
    manifest: String,
    /// Permission granted to the caller. Repeatable; `*` grants everything.
    #[arg(long = "perm")]
    perms: Vec<String>,
    /// Kind of caller.
    #[arg(long, value_enum, default_value_t = KindArg::Player)]
    kind: KindArg,
    /// Caller name.
    #[arg(long, default_value = "cli")]
    name: String,
    /// Input as a single line, split on spaces.
    #[arg(long, conflicts_with = "tokens")]
    line: Option<String>,
    /// Input tokens.
    #[arg(last = true)]
    tokens: Vec<String>,
}

impl Invocation {
    fn caller(&self) -> SimpleCaller {
        SimpleCaller::new(self.name.clone(), self.kind.into()).with_permissions(self.perms.clone())
    }

    fn buffer(&self) -> TokenBuffer {
        match &self.line {
            Some(line) => TokenBuffer::from_line(line),
            None => TokenBuffer::new(self.tokens.iter().cloned()),
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    Player,
    Console,
    Automation,
}

impl From<KindArg> for SenderKind {
    fn from(k: KindArg) -> Self {
        match k {
            KindArg::Player => SenderKind::Player,
            KindArg::Console => SenderKind::Console,
            KindArg::Automation => SenderKind::Automation,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PolicyArg {
    ReplaceAll,
    MainKeyOnly,
    MainAndFallback,
    FallbackOnly,
    NeverOverride,
}

impl From<PolicyArg> for CollisionPolicy {
    fn from(p: PolicyArg) -> Self {
        match p {
            PolicyArg::ReplaceAll => CollisionPolicy::ReplaceAll,
            PolicyArg::MainKeyOnly => CollisionPolicy::MainKeyOnly,
            PolicyArg::MainAndFallback => CollisionPolicy::MainAndFallback,
            PolicyArg::FallbackOnly => CollisionPolicy::FallbackOnly,
            PolicyArg::NeverOverride => CollisionPolicy::NeverOverride,
        }
    }
}

// ── Main ────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let format = Format::resolve_or_detect(cli.output.as_deref());

    match cli.cmd {
        Cmd::Run(invocation) => cmd_run(&invocation, format)?,
        Cmd::Complete(invocation) => cmd_complete(&invocation, format)?,
        Cmd::Tree { manifest } => cmd_tree(&manifest, format)?,
        Cmd::Labels {
            manifest,
            policy,
            prefix,
            taken,
        } => cmd_labels(&manifest, policy.into(), &prefix, &taken, format)?,
    }

    Ok(())
}

// ── Commands ────────────────────────────────────────────────────────────

/// Outcome of `run`, as printed in JSON mode.
#[derive(Debug, Serialize)]
struct RunOutcome {
    attempted: bool,
    ok: bool,
    address: String,
    values: BTreeMap<String, Value>,
    response: Option<String>,
    messages: Vec<String>,
    error: Option<ErrorBody>,
}

fn cmd_run(invocation: &Invocation, format: Format) -> Result<()> {
    let dispatcher = load_dispatcher(&invocation.manifest)?;
    let caller = invocation.caller();
    let mut ctx = dispatcher.context(&caller, invocation.buffer());
    let result = dispatcher.execute(&mut ctx);

    let attempted = !matches!(&result, Err(err) if matches!(err.kind(), ErrorKind::NoCommand));
    let outcome = RunOutcome {
        attempted,
        ok: result.is_ok(),
        address: ctx.tree().address(ctx.address()),
        values: ctx
            .values()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        response: result.as_ref().ok().cloned().flatten(),
        messages: caller.take_messages(),
        error: result.as_ref().err().map(ErrorBody::from),
    };
    debug!(address = %outcome.address, ok = outcome.ok, "run finished");

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
        Format::Pretty => {
            for message in &outcome.messages {
                println!("{message}");
            }
            if let Some(response) = &outcome.response {
                println!("{response}");
            }
            if let Err(err) = &result {
                render_error_pretty(ctx.buffer().tokens(), err);
            }
        }
    }

    match (attempted, outcome.ok) {
        (false, _) => process::exit(2),
        (true, false) => process::exit(1),
        (true, true) => Ok(()),
    }
}

fn cmd_complete(invocation: &Invocation, format: Format) -> Result<()> {
    let dispatcher = load_dispatcher(&invocation.manifest)?;
    let caller = invocation.caller();
    let suggestions = dispatcher.complete(&caller, invocation.buffer(), None);
    match format {
        Format::Json => {
            let out = serde_json::json!({ "suggestions": suggestions });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Format::Pretty => {
            for suggestion in suggestions {
                println!("{suggestion}");
            }
        }
    }
    Ok(())
}

/// One node of `tree` output.
#[derive(Debug, Serialize)]
struct TreeEntry {
    address: String,
    aliases: Vec<String>,
    executable: bool,
    trailing: bool,
    usage: Option<String>,
    description: Option<String>,
}

fn cmd_tree(manifest: &str, format: Format) -> Result<()> {
    let dispatcher = load_dispatcher(manifest)?;
    let tree = dispatcher.tree();
    let entries: Vec<TreeEntry> = tree
        .descendants(NodeId::ROOT)
        .into_iter()
        .map(|node| {
            let handler = tree.handler(node);
            TreeEntry {
                address: tree.address(node),
                aliases: tree
                    .live_names(node)
                    .into_iter()
                    .skip(1)
                    .map(str::to_string)
                    .collect(),
                executable: handler.is_some(),
                trailing: tree.node(node).is_trailing(),
                usage: handler
                    .map(|h| h.parameters().usage())
                    .filter(|u| !u.is_empty()),
                description: handler.and_then(|h| h.description()).map(str::to_string),
            }
        })
        .collect();

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        Format::Pretty => {
            use ariadne::Fmt;
            for entry in &entries {
                let depth = entry.address.matches(' ').count();
                let mut line = format!("{}{}", "  ".repeat(depth), entry.address);
                if let Some(usage) = &entry.usage {
                    line.push(' ');
                    line.push_str(usage);
                }
                if !entry.aliases.is_empty() {
                    let aliases = format!("({})", entry.aliases.join(", "));
                    line.push_str(&format!(" {}", aliases.fg(ariadne::Color::Cyan)));
                }
                if entry.trailing {
                    line.push_str(" [trailing]");
                }
                if let Some(description) = &entry.description {
                    line.push_str(" - ");
                    line.push_str(description);
                }
                println!("{line}");
            }
        }
    }
    Ok(())
}

fn cmd_labels(
    manifest: &str,
    policy: CollisionPolicy,
    prefix: &str,
    taken: &[String],
    format: Format,
) -> Result<()> {
    let dispatcher = load_dispatcher(manifest)?;
    let tree = dispatcher.tree();
    let labels = top_level_labels(tree, policy, prefix, |label| {
        taken.iter().any(|t| t == label)
    });

    match format {
        Format::Json => {
            let out: Vec<_> = labels
                .iter()
                .map(|l| {
                    serde_json::json!({
                        "label": l.label,
                        "address": tree.address(l.node),
                        "fallback": l.fallback,
                    })
                })
                .collect();
            let out = serde_json::json!({ "policy": policy.to_string(), "labels": out });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Format::Pretty => {
            for l in &labels {
                println!("{} -> {}", l.label, tree.address(l.node));
            }
        }
    }
    Ok(())
}

// ── Helpers ─────────────────────────────────────────────────────────────

fn load_dispatcher(path: &str) -> Result<Dispatcher> {
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read manifest '{path}'"))?;
    let manifest = cmdtree_manifest::load_manifest_from_str(&text)
        .with_context(|| format!("failed to load manifest '{path}'"))?;
    manifest
        .build()
        .with_context(|| format!("failed to build manifest '{path}'"))
}
