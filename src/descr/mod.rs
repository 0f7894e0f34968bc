//! Command and parameter descriptors
//!
//! Descriptors are plain records describing remote commands so a UI can paint
//! an input form for each: the command's stages, its parameters, their kinds,
//! defaults, units and help. They are validated once when loaded into a
//! [`CommandSet`] and never change afterwards.

use crate::hub::error::{DescriptorError, DescriptorResult};
use crate::hub::value::quote;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

pub mod sop;

/// Kind of value a parameter accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    /// Any integer
    Integer,
    /// Finite floating point number
    Float,
    /// Free text
    String,
    /// Non-negative integer
    Count,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ValueKind::Integer => "integer",
            ValueKind::Float => "float",
            ValueKind::String => "string",
            ValueKind::Count => "count",
        };
        write!(f, "{label}")
    }
}

/// A typed parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Integer or count
    Integer(i64),
    /// Floating point
    Float(f64),
    /// Text
    String(String),
}

impl ParamValue {
    /// True if this value is acceptable for `kind`
    pub fn fits(&self, kind: ValueKind) -> bool {
        match (self, kind) {
            (ParamValue::Integer(_), ValueKind::Integer) => true,
            (ParamValue::Integer(value), ValueKind::Count) => *value >= 0,
            (ParamValue::Integer(_), ValueKind::Float) => true,
            (ParamValue::Float(value), ValueKind::Float) => value.is_finite(),
            (ParamValue::String(_), ValueKind::String) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Integer(value) => write!(f, "{value}"),
            ParamValue::Float(value) => write!(f, "{value}"),
            ParamValue::String(value) => write!(f, "{}", quote(value)),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Integer(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Integer(i64::from(value))
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::String(value.to_string())
    }
}

/// A named phase of a multi-step command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDescriptor {
    /// Stage name as reported by the actor
    pub name: String,
    /// Display-only stage that the actor does not let you skip
    #[serde(default)]
    pub fake: bool,
}

/// Describes one parameter of a command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    /// Parameter name as used on the command line
    pub name: String,
    /// Kind of value accepted
    pub kind: ValueKind,
    /// Default value, if any
    #[serde(default)]
    pub default: Option<ParamValue>,
    /// Unit label
    #[serde(default)]
    pub units: Option<String>,
    /// Stages this parameter belongs to; empty means always visible
    #[serde(default)]
    pub stages: Vec<String>,
    /// Help text
    #[serde(default)]
    pub help: String,
}

impl ParameterDescriptor {
    /// Create a parameter of the given kind
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
            units: None,
            stages: Vec::new(),
            help: String::new(),
        }
    }

    /// Integer parameter
    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, ValueKind::Integer)
    }

    /// Float parameter
    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, ValueKind::Float)
    }

    /// String parameter
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, ValueKind::String)
    }

    /// Count parameter
    pub fn count(name: impl Into<String>) -> Self {
        Self::new(name, ValueKind::Count)
    }

    /// Set the default value
    pub fn default_value(mut self, value: impl Into<ParamValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Set the unit label
    pub fn units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    /// Set the stages from a space-separated list
    pub fn stages(mut self, stages: &str) -> Self {
        self.stages = stages.split_whitespace().map(String::from).collect();
        self
    }

    /// Set the help text
    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = help.into();
        self
    }

    /// Shown when any of `active_stages` is one of this parameter's stages
    pub fn is_visible(&self, active_stages: &[&str]) -> bool {
        self.stages.is_empty()
            || self
                .stages
                .iter()
                .any(|stage| active_stages.contains(&stage.as_str()))
    }

    /// Type-check widget input. Blank input means "leave the parameter out".
    pub fn check_input(&self, input: &str) -> DescriptorResult<Option<ParamValue>> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        let invalid = || DescriptorError::InvalidValue {
            parameter: self.name.clone(),
            kind: self.kind.to_string(),
            input: input.to_string(),
        };

        let value = match self.kind {
            ValueKind::Integer => ParamValue::Integer(trimmed.parse().map_err(|_| invalid())?),
            ValueKind::Count => {
                let count: u32 = trimmed.parse().map_err(|_| invalid())?;
                ParamValue::Integer(i64::from(count))
            }
            ValueKind::Float => {
                let value: f64 = trimmed.parse().map_err(|_| invalid())?;
                if !value.is_finite() {
                    return Err(invalid());
                }
                ParamValue::Float(value)
            }
            ValueKind::String => ParamValue::String(input.to_string()),
        };
        Ok(Some(value))
    }
}

/// Describes one remote command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandDescriptor {
    /// Actor the command is sent to
    pub actor: String,
    /// Command name
    pub name: String,
    /// Stages in execution order
    #[serde(default)]
    pub stages: Vec<StageDescriptor>,
    /// Parameters in display order
    #[serde(default)]
    pub parameters: Vec<ParameterDescriptor>,
}

impl CommandDescriptor {
    /// Create a command with no stages or parameters
    pub fn new(actor: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            name: name.into(),
            stages: Vec::new(),
            parameters: Vec::new(),
        }
    }

    /// Append real stages from a space-separated list
    pub fn real_stages(mut self, stages: &str) -> Self {
        self.push_stages(stages, false);
        self
    }

    /// Append fake (display-only) stages from a space-separated list
    pub fn fake_stages(mut self, stages: &str) -> Self {
        self.push_stages(stages, true);
        self
    }

    fn push_stages(&mut self, stages: &str, fake: bool) {
        self.stages
            .extend(stages.split_whitespace().map(|name| StageDescriptor {
                name: name.to_string(),
                fake,
            }));
    }

    /// Append a parameter
    pub fn parameter(mut self, parameter: ParameterDescriptor) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Declared stage names
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|stage| stage.name.as_str()).collect()
    }

    /// Stages as the actor reports them: a command without declared stages
    /// has a single stage named after the command.
    pub fn effective_stages(&self) -> Vec<&str> {
        if self.stages.is_empty() {
            vec![self.name.as_str()]
        } else {
            self.stage_names()
        }
    }

    /// Look up a parameter
    pub fn parameter_named(&self, name: &str) -> Option<&ParameterDescriptor> {
        self.parameters.iter().find(|param| param.name == name)
    }

    /// Parameters shown when `active_stages` are enabled
    pub fn visible_parameters(&self, active_stages: &[&str]) -> Vec<&ParameterDescriptor> {
        self.parameters
            .iter()
            .filter(|param| param.is_visible(active_stages))
            .collect()
    }

    /// Check the stage, uniqueness and default-kind invariants
    pub fn validate(&self) -> DescriptorResult<()> {
        let mut stages = HashSet::new();
        for stage in &self.stages {
            if !stages.insert(stage.name.as_str()) {
                return Err(DescriptorError::DuplicateStage {
                    command: self.name.clone(),
                    stage: stage.name.clone(),
                });
            }
        }

        let mut names = HashSet::new();
        for param in &self.parameters {
            if !names.insert(param.name.as_str()) {
                return Err(DescriptorError::DuplicateParameter {
                    command: self.name.clone(),
                    parameter: param.name.clone(),
                });
            }

            if let Some(stage) = param
                .stages
                .iter()
                .find(|stage| !stages.contains(stage.as_str()))
            {
                return Err(DescriptorError::UnknownStage {
                    command: self.name.clone(),
                    parameter: param.name.clone(),
                    stage: stage.clone(),
                });
            }

            if let Some(default) = &param.default {
                if !default.fits(param.kind) {
                    return Err(DescriptorError::DefaultKindMismatch {
                        command: self.name.clone(),
                        parameter: param.name.clone(),
                        kind: param.kind.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Format `name param=value ...` for the given values, in declaration order
    pub fn command_text(&self, values: &[(&str, ParamValue)]) -> DescriptorResult<String> {
        for (name, value) in values {
            let param = self.parameter_named(name).ok_or_else(|| {
                DescriptorError::UnknownParameter {
                    command: self.name.clone(),
                    parameter: name.to_string(),
                }
            })?;
            if !value.fits(param.kind) {
                return Err(DescriptorError::InvalidValue {
                    parameter: param.name.clone(),
                    kind: param.kind.to_string(),
                    input: value.to_string(),
                });
            }
        }

        let mut text = self.name.clone();
        for param in &self.parameters {
            if let Some((_, value)) = values.iter().find(|(name, _)| *name == param.name) {
                text.push_str(&format!(" {}={}", param.name, value));
            }
        }
        Ok(text)
    }
}

/// A validated, immutable set of command descriptors
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSet {
    commands: Vec<CommandDescriptor>,
}

impl CommandSet {
    /// Validate and load descriptors
    pub fn load(commands: Vec<CommandDescriptor>) -> DescriptorResult<Self> {
        let mut names = HashSet::new();
        for command in &commands {
            command.validate()?;
            if !names.insert((command.actor.as_str(), command.name.as_str())) {
                return Err(DescriptorError::DuplicateCommand(command.name.clone()));
            }
        }
        Ok(Self { commands })
    }

    /// Load descriptors from a JSON array
    pub fn from_json(json: &str) -> DescriptorResult<Self> {
        let commands: Vec<CommandDescriptor> = serde_json::from_str(json)?;
        Self::load(commands)
    }

    /// Look up a command by name
    pub fn get(&self, name: &str) -> DescriptorResult<&CommandDescriptor> {
        self.commands
            .iter()
            .find(|command| command.name == name)
            .ok_or_else(|| DescriptorError::UnknownCommand(name.to_string()))
    }

    /// Commands in declaration order
    pub fn commands(&self) -> &[CommandDescriptor] {
        &self.commands
    }

    /// Number of commands
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// True if the set is empty
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn goto_field() -> CommandDescriptor {
        CommandDescriptor::new("sop", "gotoField")
            .real_stages("slew calibs guider")
            .parameter(ParameterDescriptor::float("arcTime").units("sec").stages("calibs"))
            .parameter(
                ParameterDescriptor::float("guiderFlatTime")
                    .units("sec")
                    .stages("calibs guider"),
            )
            .parameter(ParameterDescriptor::string("comment"))
    }

    #[test]
    fn test_unknown_stage_rejected() {
        let command = CommandDescriptor::new("sop", "doBossCalibs")
            .fake_stages("bias dark")
            .parameter(ParameterDescriptor::count("nFlat").stages("flat"));
        assert!(matches!(
            command.validate(),
            Err(DescriptorError::UnknownStage { .. })
        ));
    }

    #[test]
    fn test_default_must_match_kind() {
        let command = CommandDescriptor::new("sop", "doBossScience")
            .parameter(ParameterDescriptor::count("nExp").default_value(-1));
        assert!(matches!(
            command.validate(),
            Err(DescriptorError::DefaultKindMismatch { .. })
        ));
    }

    #[test]
    fn test_visibility_follows_stages() {
        let command = goto_field();
        let names = |stages: &[&str]| -> Vec<String> {
            command
                .visible_parameters(stages)
                .into_iter()
                .map(|p| p.name.clone())
                .collect()
        };
        assert_eq!(names(&["slew"]), vec!["comment"]);
        assert_eq!(names(&["guider"]), vec!["guiderFlatTime", "comment"]);
        assert_eq!(names(&["calibs"]).len(), 3);
    }

    #[test]
    fn test_check_input() {
        let count = ParameterDescriptor::count("nExp");
        assert_eq!(count.check_input(" 2 ").unwrap(), Some(ParamValue::Integer(2)));
        assert!(count.check_input("-1").is_err());
        assert_eq!(count.check_input("").unwrap(), None);

        let float = ParameterDescriptor::float("expTime");
        assert_eq!(float.check_input("900").unwrap(), Some(ParamValue::Float(900.0)));
        assert!(float.check_input("nan").is_err());
        assert!(float.check_input("abc").is_err());
    }

    #[test]
    fn test_command_text_in_declaration_order() {
        let command = goto_field();
        let text = command
            .command_text(&[
                ("comment", ParamValue::from("two words")),
                ("arcTime", ParamValue::from(4.0)),
            ])
            .unwrap();
        assert_eq!(text, "gotoField arcTime=4 comment=\"two words\"");

        assert!(command.command_text(&[("bogus", ParamValue::from(1))]).is_err());
    }

    #[test]
    fn test_effective_stages_quirk() {
        let command = CommandDescriptor::new("sop", "gotoStow");
        assert_eq!(command.effective_stages(), vec!["gotoStow"]);
        assert!(command.stage_names().is_empty());
    }
}
