//! Declarative JSON command manifests for the cmdtree dispatcher.
//!
//! A manifest describes a whole command tree: every command path with its
//! aliases, parameters, filters and response template, the predefined
//! children to attach, and the dispatch configuration. [`Manifest::build`]
//! turns it into a ready [`Dispatcher`].
//!
//! ```
//! let manifest = cmdtree_manifest::load_manifest_from_str(r#"{
//!     "commands": [
//!         { "path": "greet", "aliases": ["hi"], "response": "Hello {name}",
//!           "parameters": [{ "name": "name", "type": "string", "required": true }] }
//!     ]
//! }"#).unwrap();
//! let dispatcher = manifest.build().unwrap();
//! assert!(dispatcher.tree().find(&["hi"]).is_some());
//! ```

mod template;

use std::collections::HashSet;
use std::sync::Arc;

use cmdtree_core::filter::SenderKindFilter;
use cmdtree_core::{
    DispatchConfig, Dispatcher, Handler, InheritPermission, ParamInfo, Parameter,
    ParameterModel, PermissionFilter, SenderKind, TreeBuilder, ValueKind,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub use template::{TemplateExecutor, render_template};

/// Errors that can occur when loading or building a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// JSON deserialization failed.
    #[error("invalid manifest JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// A parameter names a type the registry does not know.
    #[error("unknown parameter type '{kind}' for '{path}'")]
    UnknownType {
        /// Command path declaring the parameter.
        path: String,
        /// The type name as written.
        kind: String,
    },

    /// A field value breaks a structural rule.
    #[error("invalid {field}: {reason}")]
    InvalidField {
        /// Location of the offending field, e.g. `commands[2].parameters`.
        field: String,
        /// A human-readable explanation of why the value is invalid.
        reason: String,
    },

    /// Two command entries share a path.
    #[error("duplicate command path '{0}'")]
    DuplicatePath(String),

    /// A predefined attachment names no registered generator.
    #[error("unknown predefined handler '{name}' under '{path}'")]
    UnknownPredefined {
        /// Parent path of the attachment.
        path: String,
        /// Generator name as written.
        name: String,
    },
}

/// A complete command tree description.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Manifest {
    /// Dispatch configuration overrides.
    pub config: DispatchConfig,
    /// Command entries, in any order.
    pub commands: Vec<CommandSpec>,
    /// Predefined children to attach after every command is registered.
    pub predefined: Vec<PredefinedSpec>,
}

/// One command entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CommandSpec {
    /// Space-separated key path, e.g. `"zone flag set"`.
    pub path: String,
    /// Extra names for the final path segment.
    pub aliases: Vec<String>,
    /// Group only: create the node and its aliases without a handler.
    pub group: bool,
    /// Shown by the built-in help handler.
    pub description: Option<String>,
    /// Positional parameters and flags, in declaration order.
    pub parameters: Vec<ParameterSpec>,
    /// Leading positional parameters that must receive input. Derived from
    /// the `required` markers when absent.
    pub required_count: Option<usize>,
    /// The final parameter collects every remaining token.
    pub repeat_final: bool,
    /// The final parameter may be a flag when repeating.
    pub final_may_be_flag: bool,
    /// Permission the caller must hold.
    pub permission: Option<String>,
    /// Whether descendants may inherit `permission`.
    pub inheritable: bool,
    /// Index at which inheriting descendants insert their own key.
    pub insert_index: Option<usize>,
    /// Check the nearest inheritable ancestor permission.
    pub inherit_permission: bool,
    /// Restrict invocation to these caller kinds.
    pub senders: Vec<SenderKind>,
    /// Parse only this handler's own parameters and keep resolving.
    pub trailing: bool,
    /// Per-handler override of quote merging.
    pub merge_quotes: Option<bool>,
    /// Reply template with `{parameter}`, `{caller}` and `{address}`
    /// placeholders.
    pub response: Option<String>,
}

/// One declared parameter.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ParameterSpec {
    /// Parameter name; flags include the flag marker.
    pub name: String,
    /// Value kind: `string`, `integer`, `decimal`, `boolean` or `choice`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Type variant marker, e.g. `greedy` for strings.
    pub marker: Option<String>,
    /// Force flag or positional. Defaults to whether the name starts with
    /// the flag marker.
    pub flag: Option<bool>,
    /// Counts toward the derived required count.
    pub required: bool,
    /// Permission required to use a flag.
    pub permission: Option<String>,
    /// Short description for usage output.
    pub description: Option<String>,
    /// Choices, bounds and default literal.
    #[serde(flatten)]
    pub info: ParamInfo,
}

/// A predefined child attachment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PredefinedSpec {
    /// Parent path; empty for the root.
    pub path: String,
    /// Registered generator name, e.g. `help`.
    pub name: String,
}

/// Load and validate a manifest from a JSON string.
pub fn load_manifest_from_str(s: &str) -> Result<Manifest, ManifestError> {
    let manifest: Manifest = serde_json::from_str(s)?;
    manifest.validate()?;
    Ok(manifest)
}

impl Manifest {
    /// Check structural rules that do not depend on a type registry.
    pub fn validate(&self) -> Result<(), ManifestError> {
        let mut seen = HashSet::new();
        for (i, command) in self.commands.iter().enumerate() {
            let path = normalize(&command.path);
            if path.is_empty() {
                return Err(invalid(format!("commands[{i}].path"), "must not be empty"));
            }
            if !seen.insert(path.clone()) {
                return Err(ManifestError::DuplicatePath(path));
            }
            if command.group && (command.response.is_some() || !command.parameters.is_empty()) {
                return Err(invalid(
                    format!("commands[{i}].group"),
                    "a group cannot declare parameters or a response",
                ));
            }
            if command.inheritable && command.permission.is_none() {
                return Err(invalid(
                    format!("commands[{i}].inheritable"),
                    "requires a permission",
                ));
            }
            self.validate_parameters(i, command)?;
        }
        for (i, attach) in self.predefined.iter().enumerate() {
            if attach.name.trim().is_empty() {
                return Err(invalid(format!("predefined[{i}].name"), "must not be empty"));
            }
        }
        Ok(())
    }

    fn validate_parameters(&self, i: usize, command: &CommandSpec) -> Result<(), ManifestError> {
        let marker = self.config.flag_marker;
        let mut names = HashSet::new();
        let mut positional = 0usize;
        let mut optional_seen = false;
        for (j, param) in command.parameters.iter().enumerate() {
            let field = format!("commands[{i}].parameters[{j}]");
            if param.name.is_empty() {
                return Err(invalid(format!("{field}.name"), "must not be empty"));
            }
            if !names.insert(param.name.as_str()) {
                return Err(invalid(
                    format!("{field}.name"),
                    format!("duplicate parameter '{}'", param.name),
                ));
            }
            let starts_with_marker = param.name.starts_with(marker);
            let is_flag = param.flag.unwrap_or(starts_with_marker);
            if is_flag && !starts_with_marker {
                return Err(invalid(
                    format!("{field}.name"),
                    format!("flag '{}' must start with '{marker}'", param.name),
                ));
            }
            if param.permission.is_some() && !is_flag {
                return Err(invalid(
                    format!("{field}.permission"),
                    "only flags carry permissions",
                ));
            }
            if let (Some(min), Some(max)) = (param.info.min, param.info.max)
                && min > max
            {
                return Err(invalid(
                    format!("{field}.min"),
                    format!("min ({min}) > max ({max})"),
                ));
            }
            if param.kind == "choice" && param.info.choices.is_empty() {
                return Err(invalid(
                    format!("{field}.choices"),
                    "a choice parameter needs at least one choice",
                ));
            }
            if is_flag {
                continue;
            }
            positional += 1;
            if param.required {
                if optional_seen {
                    return Err(invalid(
                        format!("{field}.required"),
                        "required parameters must come before optional ones",
                    ));
                }
            } else {
                optional_seen = true;
            }
        }
        if let Some(count) = command.required_count
            && count > positional
        {
            return Err(invalid(
                format!("commands[{i}].requiredCount"),
                format!("{count} exceeds {positional} positional parameters"),
            ));
        }
        Ok(())
    }

    /// Build a dispatcher with the built-in types and predefined handlers.
    pub fn build(self) -> Result<Dispatcher, ManifestError> {
        Ok(self.into_builder(TreeBuilder::new())?.build())
    }

    /// Register everything into `builder`, which may carry host-defined
    /// types and predefined generators. The manifest's configuration
    /// replaces the builder's.
    pub fn into_builder(self, builder: TreeBuilder) -> Result<TreeBuilder, ManifestError> {
        self.validate()?;
        let mut builder = builder.with_config(self.config.clone());

        let mut commands = self.commands;
        // Parents first, so aliases land on the nodes they name.
        commands.sort_by_key(|c| c.path.split_whitespace().count());

        for command in commands {
            let path = normalize(&command.path);
            let aliases: Vec<&str> = command.aliases.iter().map(String::as_str).collect();
            if command.group {
                builder.group(&path, &aliases);
                continue;
            }
            let handler = handler_for(&builder, &path, &command)?;
            let node = builder.register(&path, &aliases, handler);
            if command.trailing {
                builder.set_trailing(node, true);
            }
            debug!(path = %path, "registered manifest command");
        }

        for attach in self.predefined {
            let path = normalize(&attach.path);
            if builder.add_predefined(&path, &attach.name).is_none() {
                return Err(ManifestError::UnknownPredefined {
                    path,
                    name: attach.name,
                });
            }
        }
        Ok(builder)
    }
}

fn handler_for(
    builder: &TreeBuilder,
    path: &str,
    command: &CommandSpec,
) -> Result<Handler, ManifestError> {
    let mut handler = Handler::new(TemplateExecutor::new(command.response.clone()))
        .with_parameters(model_for(builder, path, command)?);
    if let Some(description) = &command.description {
        handler = handler.with_description(description.clone());
    }
    if let Some(merge) = command.merge_quotes {
        handler = handler.with_merge_quotes(merge);
    }
    if let Some(permission) = &command.permission {
        let mut filter = if command.inheritable {
            PermissionFilter::inheritable(permission.clone())
        } else {
            PermissionFilter::new(permission.clone())
        };
        if let Some(index) = command.insert_index {
            filter = filter.with_insert_index(index);
        }
        handler = handler.with_filter(filter);
    }
    if command.inherit_permission {
        handler = handler.with_filter(InheritPermission);
    }
    if !command.senders.is_empty() {
        handler = handler.with_filter(SenderKindFilter::new(command.senders.iter().copied()));
    }
    Ok(handler)
}

fn model_for(
    builder: &TreeBuilder,
    path: &str,
    command: &CommandSpec,
) -> Result<ParameterModel, ManifestError> {
    let marker = builder.config().flag_marker;
    let mut model = ParameterModel::new();
    let mut derived_required = 0;
    for spec in &command.parameters {
        let unknown = || ManifestError::UnknownType {
            path: path.to_string(),
            kind: spec.kind.clone(),
        };
        let kind: ValueKind =
            serde_json::from_value(serde_json::Value::String(spec.kind.clone()))
                .map_err(|_| unknown())?;
        let ty = builder
            .types()
            .lookup(kind, spec.marker.as_deref())
            .ok_or_else(unknown)?;

        let is_flag = spec.flag.unwrap_or_else(|| spec.name.starts_with(marker));
        let mut param = if is_flag {
            Parameter::flag(spec.name.clone(), ty)
        } else {
            if spec.required {
                derived_required += 1;
            }
            Parameter::new(spec.name.clone(), ty)
        };
        param = param.with_info(spec.info.clone());
        if let Some(permission) = &spec.permission {
            param = param.with_permission(permission.clone());
        }
        if let Some(description) = &spec.description {
            param = param.with_description(description.clone());
        }
        model.push(param);
    }
    Ok(model
        .with_required_count(command.required_count.unwrap_or(derived_required))
        .with_repeat_final(command.repeat_final)
        .with_final_may_be_flag(command.final_may_be_flag))
}

fn normalize(path: &str) -> String {
    path.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ManifestError {
    ManifestError::InvalidField {
        field: field.into(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(err: ManifestError) -> String {
        match err {
            ManifestError::InvalidField { field, .. } => field,
            other => panic!("expected InvalidField, got {other:?}"),
        }
    }

    #[test]
    fn load_minimal_manifest() {
        let m = load_manifest_from_str(r#"{ "commands": [{ "path": "ping" }] }"#).unwrap();
        assert_eq!(m.commands.len(), 1);
        assert_eq!(m.config, DispatchConfig::default());
        assert!(m.predefined.is_empty());
    }

    #[test]
    fn parameter_info_is_flattened() {
        let m = load_manifest_from_str(
            r#"{ "commands": [{ "path": "roll", "parameters": [
                { "name": "sides", "type": "integer", "min": 2, "max": 100, "default": "6" }
            ] }] }"#,
        )
        .unwrap();
        let info = &m.commands[0].parameters[0].info;
        assert_eq!(info.min, Some(2.0));
        assert_eq!(info.default.as_deref(), Some("6"));
    }

    #[test]
    fn rejects_bad_json() {
        assert!(matches!(
            load_manifest_from_str("{ nope"),
            Err(ManifestError::InvalidJson(_))
        ));
    }

    #[test]
    fn rejects_duplicate_paths_after_normalizing() {
        let err = load_manifest_from_str(
            r#"{ "commands": [{ "path": "a b" }, { "path": " a  b " }] }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ManifestError::DuplicatePath(p) if p == "a b"));
    }

    #[test]
    fn rejects_required_after_optional() {
        let err = load_manifest_from_str(
            r#"{ "commands": [{ "path": "x", "parameters": [
                { "name": "a", "type": "string" },
                { "name": "b", "type": "string", "required": true }
            ] }] }"#,
        )
        .unwrap_err();
        assert_eq!(field_of(err), "commands[0].parameters[1].required");
    }

    #[test]
    fn rejects_permission_on_positional() {
        let err = load_manifest_from_str(
            r#"{ "commands": [{ "path": "x", "parameters": [
                { "name": "a", "type": "string", "permission": "p" }
            ] }] }"#,
        )
        .unwrap_err();
        assert_eq!(field_of(err), "commands[0].parameters[0].permission");
    }

    #[test]
    fn rejects_forced_flag_without_marker() {
        let err = load_manifest_from_str(
            r#"{ "commands": [{ "path": "x", "parameters": [
                { "name": "loud", "type": "boolean", "flag": true }
            ] }] }"#,
        )
        .unwrap_err();
        assert_eq!(field_of(err), "commands[0].parameters[0].name");
    }

    #[test]
    fn rejects_oversized_required_count() {
        let err = load_manifest_from_str(
            r#"{ "commands": [{ "path": "x", "requiredCount": 2, "parameters": [
                { "name": "a", "type": "string" }, { "name": "-f", "type": "boolean" }
            ] }] }"#,
        )
        .unwrap_err();
        assert_eq!(field_of(err), "commands[0].requiredCount");
    }

    #[test]
    fn rejects_inheritable_without_permission() {
        let err =
            load_manifest_from_str(r#"{ "commands": [{ "path": "x", "inheritable": true }] }"#)
                .unwrap_err();
        assert_eq!(field_of(err), "commands[0].inheritable");
    }

    #[test]
    fn rejects_empty_choice_list() {
        let err = load_manifest_from_str(
            r#"{ "commands": [{ "path": "x", "parameters": [{ "name": "c", "type": "choice" }] }] }"#,
        )
        .unwrap_err();
        assert_eq!(field_of(err), "commands[0].parameters[0].choices");
    }

    #[test]
    fn custom_flag_marker_drives_flag_detection() {
        let m = load_manifest_from_str(
            r#"{ "config": { "flagMarker": "+" }, "commands": [{ "path": "x", "parameters": [
                { "name": "-a", "type": "string", "permission": "p" }
            ] }] }"#,
        );
        // `-a` is positional under `+`, so the permission is misplaced.
        assert!(matches!(m, Err(ManifestError::InvalidField { .. })));
    }

    #[test]
    fn normalize_collapses_whitespace() {
        assert_eq!(normalize("  a   b c "), "a b c");
    }
}
