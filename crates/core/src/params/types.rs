//! Parameter type capabilities and the type registry.
//!
//! A [`ParameterType`] knows how to parse one value from a [`TokenBuffer`],
//! produce a contextual default, and suggest completions. Types are looked up
//! by `(ValueKind, marker)` in a [`TypeRegistry`] owned by the builder.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{Parameter, Value};
use crate::buffer::TokenBuffer;
use crate::caller::Caller;
use crate::error::CommandError;

/// Declared value kind of a parameter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    /// Free text.
    #[serde(rename = "string")]
    Text,
    /// Whole number.
    Integer,
    /// Floating point number.
    Decimal,
    /// Boolean; flag presence for flags.
    Boolean,
    /// One of a declared set of options.
    Choice,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Text => write!(f, "string"),
            ValueKind::Integer => write!(f, "integer"),
            ValueKind::Decimal => write!(f, "decimal"),
            ValueKind::Boolean => write!(f, "boolean"),
            ValueKind::Choice => write!(f, "choice"),
        }
    }
}

/// Parsing, defaulting, and completion for one kind of parameter.
pub trait ParameterType: Send + Sync + fmt::Debug {
    /// Parse a value, consuming the tokens it uses.
    fn parse(
        &self,
        param: &Parameter,
        caller: &dyn Caller,
        buffer: &mut TokenBuffer,
    ) -> Result<Value, CommandError>;

    /// Value used when no token was supplied.
    ///
    /// The default implementation parses [`ParamInfo::default`](super::ParamInfo)
    /// when declared and yields [`Value::Null`] otherwise.
    fn default_value(
        &self,
        param: &Parameter,
        caller: &dyn Caller,
        _buffer: &mut TokenBuffer,
    ) -> Result<Value, CommandError> {
        match &param.info().default {
            Some(literal) => self.parse(param, caller, &mut TokenBuffer::new([literal.as_str()])),
            None => Ok(Value::Null),
        }
    }

    /// Suggestions for the token at the buffer's cursor.
    fn complete(
        &self,
        _param: &Parameter,
        _caller: &dyn Caller,
        _buffer: &mut TokenBuffer,
    ) -> Vec<String> {
        Vec::new()
    }

    /// Whether parsing reads a token. Boolean flags do not.
    fn consumes_token(&self, _param: &Parameter) -> bool {
        true
    }
}

/// Keep the options that start with the partial token, ignoring case.
fn matching<'a>(options: impl IntoIterator<Item = &'a String>, partial: &str) -> Vec<String> {
    let partial = partial.to_lowercase();
    options
        .into_iter()
        .filter(|o| o.to_lowercase().starts_with(&partial))
        .cloned()
        .collect()
}

fn check_bounds(param: &Parameter, token: &str, n: f64) -> Result<(), CommandError> {
    let info = param.info();
    if let Some(min) = info.min
        && n < min
    {
        return Err(CommandError::invalid_argument(
            param.name(),
            format!("'{token}' must be at least {min}"),
        ));
    }
    if let Some(max) = info.max
        && n > max
    {
        return Err(CommandError::invalid_argument(
            param.name(),
            format!("'{token}' must be at most {max}"),
        ));
    }
    Ok(())
}

// ── Built-in types ──────────────────────────────────────────────────────

/// A single token taken verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringType;

impl ParameterType for StringType {
    fn parse(
        &self,
        param: &Parameter,
        _caller: &dyn Caller,
        buffer: &mut TokenBuffer,
    ) -> Result<Value, CommandError> {
        Ok(Value::Text(buffer.require_next(param.name())?.to_string()))
    }

    fn complete(
        &self,
        param: &Parameter,
        _caller: &dyn Caller,
        buffer: &mut TokenBuffer,
    ) -> Vec<String> {
        matching(&param.info().choices, buffer.peek().unwrap_or(""))
    }
}

/// Every remaining token joined with spaces.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyStringType;

impl ParameterType for GreedyStringType {
    fn parse(
        &self,
        param: &Parameter,
        _caller: &dyn Caller,
        buffer: &mut TokenBuffer,
    ) -> Result<Value, CommandError> {
        buffer.require_next(param.name())?;
        buffer.rewind(1);
        let joined = buffer.rest_joined();
        buffer.skip_rest();
        Ok(Value::Text(joined))
    }

    fn complete(
        &self,
        param: &Parameter,
        _caller: &dyn Caller,
        buffer: &mut TokenBuffer,
    ) -> Vec<String> {
        matching(&param.info().choices, &buffer.rest_joined())
    }
}

/// A whole number, optionally bounded by `min`/`max`.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegerType;

impl ParameterType for IntegerType {
    fn parse(
        &self,
        param: &Parameter,
        _caller: &dyn Caller,
        buffer: &mut TokenBuffer,
    ) -> Result<Value, CommandError> {
        let token = buffer.require_next(param.name())?;
        let n: i64 = token.parse().map_err(|e| {
            CommandError::invalid_argument(param.name(), format!("Invalid integer: '{token}'"))
                .with_source(e)
        })?;
        check_bounds(param, token, n as f64)?;
        Ok(Value::Integer(n))
    }

    fn complete(
        &self,
        param: &Parameter,
        _caller: &dyn Caller,
        buffer: &mut TokenBuffer,
    ) -> Vec<String> {
        // Small bounded ranges are worth listing.
        let info = param.info();
        let (Some(min), Some(max)) = (info.min, info.max) else {
            return matching(&info.choices, buffer.peek().unwrap_or(""));
        };
        if max - min > 20.0 {
            return Vec::new();
        }
        let options: Vec<String> = (min.ceil() as i64..=max.floor() as i64)
            .map(|n| n.to_string())
            .collect();
        matching(&options, buffer.peek().unwrap_or(""))
    }
}

/// A floating point number, optionally bounded by `min`/`max`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecimalType;

impl ParameterType for DecimalType {
    fn parse(
        &self,
        param: &Parameter,
        _caller: &dyn Caller,
        buffer: &mut TokenBuffer,
    ) -> Result<Value, CommandError> {
        let token = buffer.require_next(param.name())?;
        let n: f64 = token
            .parse()
            .ok()
            .filter(|n: &f64| n.is_finite())
            .ok_or_else(|| {
                CommandError::invalid_argument(param.name(), format!("Invalid number: '{token}'"))
            })?;
        check_bounds(param, token, n)?;
        Ok(Value::Decimal(n))
    }
}

const TRUE_WORDS: [&str; 4] = ["true", "yes", "on", "1"];
const FALSE_WORDS: [&str; 4] = ["false", "no", "off", "0"];

/// Flags: presence means `true`. Positional: a yes/no word.
#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanType;

impl ParameterType for BooleanType {
    fn parse(
        &self,
        param: &Parameter,
        _caller: &dyn Caller,
        buffer: &mut TokenBuffer,
    ) -> Result<Value, CommandError> {
        if param.is_flag() {
            return Ok(Value::Bool(true));
        }
        let token = buffer.require_next(param.name())?;
        let lower = token.to_lowercase();
        if TRUE_WORDS.contains(&lower.as_str()) {
            Ok(Value::Bool(true))
        } else if FALSE_WORDS.contains(&lower.as_str()) {
            Ok(Value::Bool(false))
        } else {
            Err(CommandError::invalid_argument(
                param.name(),
                format!("Expected true or false, got '{token}'"),
            ))
        }
    }

    fn default_value(
        &self,
        param: &Parameter,
        caller: &dyn Caller,
        _buffer: &mut TokenBuffer,
    ) -> Result<Value, CommandError> {
        match &param.info().default {
            Some(literal) if !param.is_flag() => {
                self.parse(param, caller, &mut TokenBuffer::new([literal.as_str()]))
            }
            _ => Ok(Value::Bool(false)),
        }
    }

    fn complete(
        &self,
        param: &Parameter,
        _caller: &dyn Caller,
        buffer: &mut TokenBuffer,
    ) -> Vec<String> {
        if param.is_flag() {
            return Vec::new();
        }
        let options = ["true".to_string(), "false".to_string()];
        matching(&options, buffer.peek().unwrap_or(""))
    }

    fn consumes_token(&self, param: &Parameter) -> bool {
        !param.is_flag()
    }
}

/// One of `info.choices`, matched case-insensitively.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChoiceType;

impl ParameterType for ChoiceType {
    fn parse(
        &self,
        param: &Parameter,
        _caller: &dyn Caller,
        buffer: &mut TokenBuffer,
    ) -> Result<Value, CommandError> {
        let token = buffer.require_next(param.name())?;
        param
            .info()
            .choices
            .iter()
            .find(|c| c.eq_ignore_ascii_case(token))
            .map(|c| Value::Text(c.clone()))
            .ok_or_else(|| {
                CommandError::invalid_argument(
                    param.name(),
                    format!(
                        "'{token}' is not one of: {}",
                        param.info().choices.join(", ")
                    ),
                )
            })
    }

    fn complete(
        &self,
        param: &Parameter,
        _caller: &dyn Caller,
        buffer: &mut TokenBuffer,
    ) -> Vec<String> {
        matching(&param.info().choices, buffer.peek().unwrap_or(""))
    }
}

/// Shared [`StringType`].
pub fn string() -> Arc<dyn ParameterType> {
    Arc::new(StringType)
}

/// Shared [`GreedyStringType`].
pub fn greedy_string() -> Arc<dyn ParameterType> {
    Arc::new(GreedyStringType)
}

/// Shared [`IntegerType`].
pub fn integer() -> Arc<dyn ParameterType> {
    Arc::new(IntegerType)
}

/// Shared [`DecimalType`].
pub fn decimal() -> Arc<dyn ParameterType> {
    Arc::new(DecimalType)
}

/// Shared [`BooleanType`].
pub fn boolean() -> Arc<dyn ParameterType> {
    Arc::new(BooleanType)
}

/// Shared [`ChoiceType`].
pub fn choice() -> Arc<dyn ParameterType> {
    Arc::new(ChoiceType)
}

// ── Registry ────────────────────────────────────────────────────────────

/// Marker selecting [`GreedyStringType`] for [`ValueKind::Text`].
pub const GREEDY: &str = "greedy";

/// Lookup table from `(kind, marker)` to a parameter type.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    types: HashMap<(ValueKind, Option<String>), Arc<dyn ParameterType>>,
}

impl TypeRegistry {
    /// A registry with no entries.
    pub fn empty() -> Self {
        Self {
            types: HashMap::new(),
        }
    }

    /// A registry holding the built-in types.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(ValueKind::Text, None, string());
        registry.register(ValueKind::Text, Some(GREEDY), greedy_string());
        registry.register(ValueKind::Integer, None, integer());
        registry.register(ValueKind::Decimal, None, decimal());
        registry.register(ValueKind::Boolean, None, boolean());
        registry.register(ValueKind::Choice, None, choice());
        registry
    }

    /// Register or replace the type for `(kind, marker)`.
    pub fn register(
        &mut self,
        kind: ValueKind,
        marker: Option<&str>,
        ty: Arc<dyn ParameterType>,
    ) {
        self.types.insert((kind, marker.map(str::to_string)), ty);
    }

    /// Find the type for `(kind, marker)`, falling back to the unmarked
    /// entry when the marker has no registration of its own.
    pub fn lookup(&self, kind: ValueKind, marker: Option<&str>) -> Option<Arc<dyn ParameterType>> {
        if let Some(marker) = marker
            && let Some(ty) = self.types.get(&(kind, Some(marker.to_string())))
        {
            return Some(Arc::clone(ty));
        }
        self.types.get(&(kind, None)).map(Arc::clone)
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
