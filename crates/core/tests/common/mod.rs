//! Shared fixtures for `cmdtree_core` integration tests.

#![allow(unreachable_pub, dead_code)]

use std::sync::{Arc, Mutex};

use cmdtree_core::filter::SenderKindFilter;
use cmdtree_core::handler::HELP;
use cmdtree_core::params::{ParamInfo, types};
use cmdtree_core::{
    Dispatcher, ExecutionContext, Handler, InheritPermission, Parameter, ParameterModel,
    PermissionFilter, SenderKind, SimpleCaller, TokenBuffer, TreeBuilder, Value,
};

/// Values bound by the last handler that ran, keyed by its address.
#[derive(Default, Clone)]
pub struct Recorder(Arc<Mutex<Vec<(String, Vec<(String, Value)>)>>>);

impl Recorder {
    /// Handler body that records its bound values and replies with its address.
    pub fn handler(&self) -> Handler {
        let log = Arc::clone(&self.0);
        Handler::from_fn(move |ctx: &mut ExecutionContext<'_>| {
            let address = ctx.tree().address(ctx.address());
            let mut values: Vec<(String, Value)> = ctx
                .values()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            values.sort_by(|a, b| a.0.cmp(&b.0));
            log.lock().unwrap().push((address.clone(), values));
            Ok(Some(format!("ran {address}")))
        })
    }

    /// Every recorded call in order.
    pub fn calls(&self) -> Vec<(String, Vec<(String, Value)>)> {
        self.0.lock().unwrap().clone()
    }

    /// Addresses of recorded calls.
    pub fn addresses(&self) -> Vec<String> {
        self.calls().into_iter().map(|(a, _)| a).collect()
    }

    /// Bound value of `name` in the last call.
    pub fn last_value(&self, name: &str) -> Option<Value> {
        let calls = self.calls();
        let (_, values) = calls.last()?;
        values.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone())
    }
}

/// `greet|hi <name> [-loud]`.
pub fn greet_model() -> ParameterModel {
    ParameterModel::new()
        .with(Parameter::new("name", types::string()).with_info(ParamInfo {
            choices: vec!["Bob".into(), "Alice".into(), "Bea".into()],
            ..Default::default()
        }))
        .with(Parameter::flag("-loud", types::boolean()))
        .with_required_count(1)
}

/// Tree used across most scenarios:
///
/// ```text
/// greet | hi      <name> [-loud]
/// zone            inheritable permission "zone"
///   b
///     c           inherits permission, <target>
/// admin           requires "admin"
///   reload
/// tools           group with help
///   ping
/// console-only    console callers only
/// ```
pub fn dispatcher(recorder: &Recorder) -> Dispatcher {
    let mut builder = TreeBuilder::new();
    builder.register(
        "greet",
        &["hi"],
        recorder.handler().with_parameters(greet_model()),
    );
    builder.register(
        "zone",
        &[],
        recorder
            .handler()
            .with_filter(PermissionFilter::inheritable("zone")),
    );
    builder.register(
        "zone b c",
        &[],
        recorder
            .handler()
            .with_filter(InheritPermission)
            .with_parameters(
                ParameterModel::new()
                    .with(Parameter::new("target", types::string()))
                    .with_required_count(1),
            ),
    );
    builder.register(
        "admin",
        &[],
        recorder.handler().with_filter(PermissionFilter::new("admin")),
    );
    builder.register("admin reload", &[], recorder.handler());
    builder.register("tools ping", &["pong"], recorder.handler());
    builder.add_predefined("tools", HELP);
    builder.register(
        "console-only",
        &[],
        recorder
            .handler()
            .with_filter(SenderKindFilter::new([SenderKind::Console])),
    );
    builder.build()
}

/// A player with the given permissions.
pub fn player(permissions: &[&str]) -> SimpleCaller {
    SimpleCaller::new("alex", SenderKind::Player).with_permissions(permissions.iter().copied())
}

/// Buffer over `tokens`.
pub fn tokens(tokens: &[&str]) -> TokenBuffer {
    TokenBuffer::new(tokens.iter().copied())
}
