//! Declarative parameter model.
//!
//! A [`ParameterModel`] lists a handler's positional parameters in order,
//! indexes every parameter (positional and flag) by name, and records how
//! many leading positional parameters are required and whether the final
//! parameter repeats.

pub mod parser;
pub mod types;
pub mod value;

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use types::{ParameterType, TypeRegistry, ValueKind};
pub use value::Value;

/// Type-specific settings attached to a parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ParamInfo {
    /// Allowed options for choice parameters; suggestions for text parameters.
    pub choices: Vec<String>,
    /// Inclusive lower bound for numeric parameters.
    pub min: Option<f64>,
    /// Inclusive upper bound for numeric parameters.
    pub max: Option<f64>,
    /// Literal parsed by the parameter's type to produce its default.
    pub default: Option<String>,
}

/// One declared parameter.
#[derive(Debug, Clone)]
pub struct Parameter {
    name: String,
    kind: Arc<dyn ParameterType>,
    info: ParamInfo,
    flag: bool,
    permission: Option<String>,
    description: Option<String>,
}

impl Parameter {
    /// A positional parameter.
    pub fn new(name: impl Into<String>, kind: Arc<dyn ParameterType>) -> Self {
        Self {
            name: name.into(),
            kind,
            info: ParamInfo::default(),
            flag: false,
            permission: None,
            description: None,
        }
    }

    /// A flag parameter. `name` includes the flag marker, e.g. `-loud`.
    pub fn flag(name: impl Into<String>, kind: Arc<dyn ParameterType>) -> Self {
        Self {
            flag: true,
            ..Self::new(name, kind)
        }
    }

    /// Attach type settings.
    pub fn with_info(mut self, info: ParamInfo) -> Self {
        self.info = info;
        self
    }

    /// Require a permission to use this flag.
    ///
    /// # Panics
    /// Panics for positional parameters.
    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        assert!(
            self.flag,
            "only flag parameters can require a permission ({})",
            self.name
        );
        self.permission = Some(permission.into());
        self
    }

    /// Attach a description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Declared name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type capability.
    pub fn kind(&self) -> &dyn ParameterType {
        self.kind.as_ref()
    }

    /// Type settings.
    pub fn info(&self) -> &ParamInfo {
        &self.info
    }

    /// Whether this is a flag.
    pub fn is_flag(&self) -> bool {
        self.flag
    }

    /// Permission required to use this flag.
    pub fn permission(&self) -> Option<&str> {
        self.permission.as_deref()
    }

    /// Description text.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

/// Ordered parameter declarations for one handler.
#[derive(Debug, Clone, Default)]
pub struct ParameterModel {
    /// Every parameter in declaration order.
    params: Vec<Parameter>,
    /// Indices into `params` of non-flag parameters.
    positional: Vec<usize>,
    by_name: HashMap<String, usize>,
    required_count: usize,
    repeat_final: bool,
    final_may_be_flag: bool,
}

impl ParameterModel {
    /// An empty model: accepts no tokens.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter.
    ///
    /// # Panics
    /// Panics if a parameter with the same name was already declared.
    pub fn with(mut self, param: Parameter) -> Self {
        self.push(param);
        self
    }

    /// Append a parameter in place. See [`with`](Self::with).
    pub fn push(&mut self, param: Parameter) {
        assert!(
            !self.by_name.contains_key(param.name()),
            "duplicate parameter name: {}",
            param.name()
        );
        let index = self.params.len();
        if !param.is_flag() {
            self.positional.push(index);
        }
        self.by_name.insert(param.name().to_string(), index);
        self.params.push(param);
    }

    /// Parameters at indexed positions below `count` must receive input.
    pub fn with_required_count(mut self, count: usize) -> Self {
        self.required_count = count;
        self
    }

    /// Let the final parameter collect every remaining token.
    pub fn with_repeat_final(mut self, repeat: bool) -> Self {
        self.repeat_final = repeat;
        self
    }

    /// Allow the last declared parameter to be the repeat target even when
    /// it is a flag.
    pub fn with_final_may_be_flag(mut self, allowed: bool) -> Self {
        self.final_may_be_flag = allowed;
        self
    }

    /// Every parameter in declaration order.
    pub fn params(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }

    /// Non-flag parameters in order.
    pub fn positional(&self) -> impl Iterator<Item = &Parameter> {
        self.positional.iter().map(|&i| &self.params[i])
    }

    /// Declared flags in order.
    pub fn flags(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter().filter(|p| p.is_flag())
    }

    /// Look up any parameter by name.
    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.by_name.get(name).map(|&i| &self.params[i])
    }

    /// Look up a flag by its full name (marker included).
    pub fn flag(&self, name: &str) -> Option<&Parameter> {
        self.get(name).filter(|p| p.is_flag())
    }

    /// Number of leading indexed parameters that require input.
    pub fn required_count(&self) -> usize {
        self.required_count
    }

    /// Whether the final parameter repeats.
    pub fn repeats_final(&self) -> bool {
        self.repeat_final
    }

    /// Whether a flag may be the repeat target.
    pub fn final_may_be_flag(&self) -> bool {
        self.final_may_be_flag
    }

    /// The parameter collecting repeated tokens, if any.
    pub fn repeated(&self) -> Option<&Parameter> {
        if !self.repeat_final {
            return None;
        }
        if self.final_may_be_flag {
            self.params.last()
        } else {
            self.positional.last().map(|&i| &self.params[i])
        }
    }

    /// Parameters reached by position: every positional parameter, followed
    /// by the repeat target when that target is a flag.
    pub fn indexed(&self) -> Vec<&Parameter> {
        let mut out: Vec<&Parameter> = self.positional().collect();
        if let Some(target) = self.repeated()
            && target.is_flag()
        {
            out.push(target);
        }
        out
    }

    /// `true` when no parameters are declared.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Number of declared parameters.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// One-line usage, e.g. `<name> [count] [-loud]`.
    pub fn usage(&self) -> String {
        let required = self.required_count;
        let repeated = self.repeated().map(Parameter::name);
        let mut parts: Vec<String> = self
            .indexed()
            .into_iter()
            .enumerate()
            .map(|(i, p)| {
                let dots = if Some(p.name()) == repeated { "..." } else { "" };
                if i < required {
                    format!("<{}{dots}>", p.name())
                } else {
                    format!("[{}{dots}]", p.name())
                }
            })
            .collect();
        parts.extend(
            self.flags()
                .filter(|p| Some(p.name()) != repeated)
                .map(|p| format!("[{}]", p.name())),
        );
        parts.join(" ")
    }
}
