//! Parameter parsing state machine.
//!
//! Walks the remaining tokens of an [`ExecutionContext`] against a
//! [`ParameterModel`]. At every step a declared, not yet bound flag at the
//! cursor wins; otherwise parsing moves through the indexed parameters in
//! order, optionally ending in a repeating parameter that collects every
//! remaining token.

use tracing::trace;

use super::{Parameter, ParameterModel, Value};
use crate::context::{CompletionTarget, ExecutionContext};
use crate::error::CommandError;

/// Whether the loop should keep going after binding a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

struct Parser<'c, 'a, 'm> {
    ctx: &'c mut ExecutionContext<'a>,
    model: &'m ParameterModel,
    indexed: Vec<&'m Parameter>,
    repeated: Option<&'m Parameter>,
    /// Next indexed position to visit.
    position: usize,
    /// Parameter currently collecting repeated tokens.
    repeating: Option<&'m Parameter>,
    accumulator: Vec<Value>,
}

/// Parse `model` from `ctx`'s buffer into its value map.
pub(crate) fn parse(
    ctx: &mut ExecutionContext<'_>,
    model: &ParameterModel,
) -> Result<(), CommandError> {
    let parser = Parser {
        indexed: model.indexed(),
        repeated: model.repeated(),
        model,
        ctx,
        position: 0,
        repeating: None,
        accumulator: Vec::new(),
    };
    parser.run()
}

impl<'m> Parser<'_, '_, 'm> {
    fn run(mut self) -> Result<(), CommandError> {
        loop {
            if let Some(flag) = self.flag_at_cursor() {
                if self.consume_flag(flag)? == Flow::Stop {
                    break;
                }
                continue;
            }

            let param = if let Some(param) = self.repeating {
                param
            } else if let Some(&param) = self.indexed.get(self.position) {
                self.position += 1;
                if self.is_repeated(param) {
                    trace!(parameter = param.name(), "entering repeat mode");
                    self.repeating = Some(param);
                }
                param
            } else if self.ctx.buffer.has_next() {
                if self.ctx.trailing {
                    trace!(cursor = self.ctx.buffer.cursor(), "trailing parse done");
                    break;
                }
                return Err(CommandError::too_many_arguments().at_token(self.ctx.buffer.cursor()));
            } else {
                break;
            };

            if self.repeating.is_some() && !param.kind().consumes_token(param) {
                // Reached by position; a target that reads no token is only
                // bound by its marker.
                trace!(parameter = param.name(), "repeat target reads no token");
                self.repeating = None;
                continue;
            }

            if param.kind().consumes_token(param) && !self.ctx.buffer.has_next() {
                if self.repeating.is_some() {
                    if !self.ctx.completing && self.is_required(param) && self.accumulator.is_empty()
                    {
                        return Err(CommandError::argument_required(param.name())
                            .at_token(self.ctx.buffer.cursor()));
                    }
                    break;
                }
                if self.ctx.completing {
                    continue;
                }
                if self.is_required(param) {
                    return Err(CommandError::argument_required(param.name())
                        .at_token(self.ctx.buffer.cursor()));
                }
                let value = self.default_for(param)?;
                self.ctx.values.insert(param.name().to_string(), value);
                continue;
            }

            let before = self.ctx.buffer.cursor();
            if self.bind(param)? == Flow::Stop {
                break;
            }
            if self.repeating.is_some() && self.ctx.buffer.cursor() == before {
                trace!(parameter = param.name(), "repeat bind read nothing");
                break;
            }
        }
        self.finish()
    }

    /// Declared flag at the cursor that has not been bound yet.
    fn flag_at_cursor(&self) -> Option<&'m Parameter> {
        let token = self.ctx.buffer.peek()?;
        if !token.starts_with(self.ctx.config.flag_marker) {
            return None;
        }
        let flag = self.model.flag(token)?;
        let bound = self.ctx.values.contains_key(flag.name())
            || self.repeating.is_some_and(|r| r.name() == flag.name());
        (!bound).then_some(flag)
    }

    fn consume_flag(&mut self, flag: &'m Parameter) -> Result<Flow, CommandError> {
        let start = self.ctx.buffer.cursor();
        self.ctx.buffer.next();
        trace!(flag = flag.name(), cursor = start, "flag");
        if let Some(permission) = flag.permission()
            && !self.ctx.caller.has_permission(permission)
        {
            return Err(CommandError::permission_denied(permission).at_token(start));
        }
        if self.is_repeated(flag) {
            if !self.ctx.completing {
                self.check_unbound_required()?;
            }
            self.ctx.supplied.insert(flag.name().to_string());
            self.position = self.indexed.len();
            if !flag.kind().consumes_token(flag) {
                // One value per marker occurrence.
                let value = flag
                    .kind()
                    .parse(flag, self.ctx.caller, &mut self.ctx.buffer)
                    .map_err(|err| err.at_token(start))?;
                trace!(flag = flag.name(), value = %value, "bound");
                self.accumulator.push(value);
                return Ok(Flow::Continue);
            }
            self.repeating = Some(flag);
            return Ok(Flow::Continue);
        }
        if flag.kind().consumes_token(flag) && !self.ctx.buffer.has_next() {
            if self.ctx.completing {
                return Ok(Flow::Continue);
            }
            return Err(CommandError::argument_required(flag.name())
                .at_token(self.ctx.buffer.cursor()));
        }
        self.bind(flag)
    }

    /// Entering a flag's repeat mode hands every remaining token to it, so
    /// required positional parameters still unbound can no longer be met.
    fn check_unbound_required(&self) -> Result<(), CommandError> {
        let required = self.model.required_count();
        let missing = self
            .indexed
            .iter()
            .enumerate()
            .skip(self.position)
            .take_while(|(i, _)| *i < required)
            .map(|(_, p)| *p)
            .find(|p| !p.is_flag() && !self.ctx.values.contains_key(p.name()));
        match missing {
            Some(param) => Err(CommandError::argument_required(param.name())
                .at_token(self.ctx.buffer.cursor())),
            None => Ok(()),
        }
    }

    /// Parse one value for `param` from the cursor.
    fn bind(&mut self, param: &'m Parameter) -> Result<Flow, CommandError> {
        let start = self.ctx.buffer.cursor();
        let consumes = param.kind().consumes_token(param);
        if self.ctx.completing && consumes && self.ctx.buffer.peek() == Some("") {
            trace!(parameter = param.name(), cursor = start, "completion target");
            self.set_target(param, start);
            return Ok(Flow::Stop);
        }
        let parsed = param
            .kind()
            .parse(param, self.ctx.caller, &mut self.ctx.buffer);
        let value = match parsed {
            Ok(value) => value,
            Err(err) => {
                if self.ctx.completing {
                    self.set_target(param, start);
                }
                return Err(err.at_token(start));
            }
        };
        if self.ctx.completing && consumes && !self.ctx.buffer.has_next() {
            self.set_target(param, start);
        }
        trace!(parameter = param.name(), value = %value, "bound");
        if self.repeating.is_some_and(|r| r.name() == param.name()) {
            self.accumulator.push(value);
        } else {
            self.ctx.values.insert(param.name().to_string(), value);
        }
        self.ctx.supplied.insert(param.name().to_string());
        Ok(Flow::Continue)
    }

    fn finish(mut self) -> Result<(), CommandError> {
        let model = self.model;
        for param in model.params() {
            if self.is_repeated(param) {
                continue;
            }
            if !self.ctx.values.contains_key(param.name()) {
                let value = self.default_for(param)?;
                self.ctx.values.insert(param.name().to_string(), value);
            }
        }
        if let Some(param) = self.repeated {
            let items = std::mem::take(&mut self.accumulator);
            self.ctx
                .values
                .insert(param.name().to_string(), Value::List(items));
        }
        Ok(())
    }

    fn default_for(&mut self, param: &Parameter) -> Result<Value, CommandError> {
        let caller = self.ctx.caller;
        let shadow = self.ctx.buffer.unaffecting_copy();
        param.kind().default_value(param, caller, shadow)
    }

    fn set_target(&mut self, param: &Parameter, cursor: usize) {
        self.ctx.completion_target = Some(CompletionTarget {
            parameter: param.name().to_string(),
            cursor,
        });
    }

    fn is_repeated(&self, param: &Parameter) -> bool {
        self.repeated.is_some_and(|r| r.name() == param.name())
    }

    /// Whether the indexed position of `param` lies below the required count.
    fn is_required(&self, param: &Parameter) -> bool {
        self.indexed
            .iter()
            .position(|p| p.name() == param.name())
            .is_some_and(|i| i < self.model.required_count())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::buffer::TokenBuffer;
    use crate::caller::{SenderKind, SimpleCaller};
    use crate::config::DispatchConfig;
    use crate::context::ExecutionContext;
    use crate::error::{CommandError, ErrorKind};
    use crate::handler::Handler;
    use crate::params::{ParamInfo, Parameter, ParameterModel, Value, types};
    use crate::tree::{AddressTree, NodeId};

    struct Fixture {
        caller: SimpleCaller,
        tree: AddressTree,
        config: DispatchConfig,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                caller: SimpleCaller::new("tester", SenderKind::Player),
                tree: AddressTree::new(),
                config: DispatchConfig::default(),
            }
        }

        fn context(
            &self,
            model: ParameterModel,
            tokens: &[&str],
            completing: bool,
        ) -> ExecutionContext<'_> {
            let buffer = TokenBuffer::new(tokens.iter().copied());
            let mut ctx = ExecutionContext::new(&self.caller, &self.tree, &self.config, buffer);
            ctx.completing = completing;
            let handler = Handler::from_fn(|_| Ok(None)).with_parameters(model);
            ctx.bind(NodeId::ROOT, Arc::new(handler));
            ctx
        }

        fn parse(
            &self,
            model: ParameterModel,
            tokens: &[&str],
        ) -> Result<ExecutionContext<'_>, CommandError> {
            let mut ctx = self.context(model, tokens, false);
            ctx.parse_parameters()?;
            Ok(ctx)
        }
    }

    fn greet() -> ParameterModel {
        ParameterModel::new()
            .with(Parameter::new("name", types::string()))
            .with(Parameter::flag("-loud", types::boolean()))
            .with_required_count(1)
    }

    #[test]
    fn flags_bind_anywhere() {
        let fx = Fixture::new();
        let ctx = fx.parse(greet(), &["-loud", "Bob"]).unwrap();
        assert_eq!(ctx.get_text("name"), Some("Bob"));
        assert!(ctx.get_bool("-loud"));
        assert!(ctx.was_supplied("-loud"));

        let ctx = fx.parse(greet(), &["Bob"]).unwrap();
        assert_eq!(ctx.get("-loud"), Some(&Value::Bool(false)));
        assert!(!ctx.was_supplied("-loud"));
    }

    #[test]
    fn repeated_flag_falls_through_to_positional() {
        let model = ParameterModel::new()
            .with(Parameter::flag("-loud", types::boolean()))
            .with(Parameter::new("name", types::string()));
        let fx = Fixture::new();
        let ctx = fx.parse(model, &["-loud", "-loud"]).unwrap();
        assert_eq!(ctx.get_text("name"), Some("-loud"));

        let err = fx.parse(greet(), &["-loud", "Bob", "-loud"]).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::TooManyArguments);
        assert_eq!(err.token(), Some(2));
    }

    #[test]
    fn required_count_boundaries() {
        let model = || {
            ParameterModel::new()
                .with(Parameter::new("a", types::string()))
                .with(Parameter::new("b", types::string()))
                .with(Parameter::new("c", types::string()))
                .with_required_count(2)
        };
        let fx = Fixture::new();
        let err = fx.parse(model(), &["1"]).unwrap_err();
        assert!(err.is_argument_required("b"));
        assert_eq!(err.token(), Some(1));

        let ctx = fx.parse(model(), &["1", "2"]).unwrap();
        assert!(ctx.get("c").is_some_and(Value::is_null));
        assert!(fx.parse(model(), &["1", "2", "3"]).is_ok());

        let err = fx.parse(model(), &["1", "2", "3", "4"]).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::TooManyArguments);
    }

    #[test]
    fn repeat_final_collects_tokens() {
        let model = || {
            ParameterModel::new()
                .with(Parameter::new("target", types::string()))
                .with(Parameter::new("amounts", types::integer()))
                .with_repeat_final(true)
                .with_required_count(1)
        };
        let fx = Fixture::new();
        let ctx = fx.parse(model(), &["x", "1", "2", "3"]).unwrap();
        let expected = Value::List(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]);
        assert_eq!(ctx.get("amounts"), Some(&expected));

        let ctx = fx.parse(model(), &["x"]).unwrap();
        assert_eq!(ctx.get("amounts"), Some(&Value::List(Vec::new())));
    }

    #[test]
    fn required_repeat_needs_one_token() {
        let model = ParameterModel::new()
            .with(Parameter::new("names", types::string()))
            .with_repeat_final(true)
            .with_required_count(1);
        let fx = Fixture::new();
        let err = fx.parse(model, &[]).unwrap_err();
        assert!(err.is_argument_required("names"));
    }

    #[test]
    fn flag_repeat_target() {
        let model = || {
            ParameterModel::new()
                .with(Parameter::new("target", types::string()))
                .with(Parameter::flag("-tags", types::string()))
                .with_repeat_final(true)
                .with_final_may_be_flag(true)
                .with_required_count(1)
        };
        let fx = Fixture::new();
        let ctx = fx.parse(model(), &["x", "-tags", "a", "b"]).unwrap();
        assert_eq!(
            ctx.get("-tags"),
            Some(&Value::List(vec!["a".into(), "b".into()]))
        );

        let err = fx.parse(model(), &["-tags", "a"]).unwrap_err();
        assert!(err.is_argument_required("target"));

        let ctx = fx.parse(model(), &["x", "a"]).unwrap();
        assert_eq!(ctx.get("-tags"), Some(&Value::List(vec!["a".into()])));
    }

    fn verbosity() -> ParameterModel {
        ParameterModel::new()
            .with(Parameter::new("target", types::string()))
            .with(Parameter::flag("-v", types::boolean()))
            .with_repeat_final(true)
            .with_final_may_be_flag(true)
            .with_required_count(1)
    }

    #[test]
    fn tokenless_repeat_target_reached_by_position_binds_nothing() {
        let fx = Fixture::new();
        let ctx = fx.parse(verbosity(), &["x"]).unwrap();
        assert_eq!(ctx.get_text("target"), Some("x"));
        assert_eq!(ctx.get("-v"), Some(&Value::List(Vec::new())));
        assert!(!ctx.was_supplied("-v"));

        let err = fx.parse(verbosity(), &["x", "y"]).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::TooManyArguments);
        assert_eq!(err.token(), Some(1));
    }

    #[test]
    fn tokenless_repeat_target_binds_once_per_marker() {
        let fx = Fixture::new();
        let ctx = fx.parse(verbosity(), &["x", "-v"]).unwrap();
        assert_eq!(ctx.get("-v"), Some(&Value::List(vec![Value::Bool(true)])));
        assert!(ctx.was_supplied("-v"));

        let ctx = fx.parse(verbosity(), &["x", "-v", "-v"]).unwrap();
        assert_eq!(
            ctx.get("-v"),
            Some(&Value::List(vec![Value::Bool(true), Value::Bool(true)]))
        );

        let err = fx.parse(verbosity(), &["-v"]).unwrap_err();
        assert!(err.is_argument_required("target"));
    }

    #[test]
    fn flag_permission_is_checked() {
        let model = ParameterModel::new()
            .with(Parameter::flag("-force", types::boolean()).with_permission("tool.force"));
        let fx = Fixture::new();
        let err = fx.parse(model, &["-force"]).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::PermissionDenied { permission } if permission == "tool.force"));
        assert_eq!(err.token(), Some(0));
    }

    #[test]
    fn trailing_mode_leaves_extra_tokens() {
        let fx = Fixture::new();
        let mut ctx = fx.context(greet(), &["Bob", "next", "more"], false);
        ctx.trailing = true;
        ctx.parse_parameters().unwrap();
        assert_eq!(ctx.buffer().cursor(), 1);
    }

    #[test]
    fn completion_on_empty_token_sets_target() {
        let fx = Fixture::new();
        let mut ctx = fx.context(greet(), &[""], true);
        ctx.parse_parameters().unwrap();
        let target = ctx.completion_target().unwrap();
        assert_eq!(target.parameter, "name");
        assert_eq!(target.cursor, 0);
    }

    #[test]
    fn completion_records_target_on_bad_token() {
        let model = ParameterModel::new()
            .with(Parameter::new("count", types::integer()).with_info(ParamInfo {
                min: Some(1.0),
                max: Some(3.0),
                ..Default::default()
            }));
        let fx = Fixture::new();
        let mut ctx = fx.context(model, &["x"], true);
        assert!(ctx.parse_parameters().is_err());
        assert_eq!(ctx.completion_target().unwrap().parameter, "count");
    }

    #[test]
    #[should_panic(expected = "already parsed")]
    fn parsing_twice_panics() {
        let fx = Fixture::new();
        let mut ctx = fx.context(greet(), &["Bob"], false);
        let _ = ctx.parse_parameters();
        let _ = ctx.parse_parameters();
    }
}
