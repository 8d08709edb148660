//! Command definitions and their argument schemas.

use std::collections::HashSet;

use crate::{
    error::CommandError,
    raw_parser::is_valid_command_name,
    value::{TypeTag, Value},
};

#[derive(Debug, Clone, PartialEq)]
/// Declared argument of a command.
pub struct ArgumentSpec {
    pub key: String,
    pub tag: TypeTag,
    pub required: bool,
    pub default: Option<Value>,
    /// Symbolic names for `Enum` arguments, indexed by ordinal.
    pub choices: Vec<String>,
    pub description: String,
}

impl ArgumentSpec {
    pub fn required(key: impl Into<String>, tag: TypeTag) -> Self {
        Self {
            key: key.into(),
            tag,
            required: true,
            default: None,
            choices: Vec::new(),
            description: String::new(),
        }
    }

    pub fn optional(key: impl Into<String>, tag: TypeTag) -> Self {
        Self {
            required: false,
            ..Self::required(key, tag)
        }
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_choices<I, S>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.choices = choices.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Immutable description of a registered command.
pub struct CommandDefinition {
    pub name: String,
    pub description: String,
    /// Ordered set: keys are unique, declaration order is kept.
    pub arguments: Vec<ArgumentSpec>,
    /// Argument fed by the positional text, and by a predecessor's output when piped.
    pub default_key: Option<String>,
    pub input_type: TypeTag,
    pub output_type: TypeTag,
    pub require_input: bool,
    pub guild_only: bool,
    pub defer_reply: bool,
    pub ephemeral_reply: bool,
}

impl CommandDefinition {
    pub fn new(name: impl Into<String>, input_type: TypeTag, output_type: TypeTag) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            arguments: Vec::new(),
            default_key: None,
            input_type,
            output_type,
            require_input: false,
            guild_only: false,
            defer_reply: false,
            ephemeral_reply: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_argument(mut self, argument: ArgumentSpec) -> Self {
        self.arguments.push(argument);
        self
    }

    /// Adds `argument` and marks it as the default key.
    pub fn with_default_argument(mut self, argument: ArgumentSpec) -> Self {
        self.default_key = Some(argument.key.clone());
        self.arguments.push(argument);
        self
    }

    pub fn requiring_input(mut self) -> Self {
        self.require_input = true;
        self
    }

    pub fn guild_only(mut self) -> Self {
        self.guild_only = true;
        self
    }

    pub fn deferring_reply(mut self, ephemeral: bool) -> Self {
        self.defer_reply = true;
        self.ephemeral_reply = ephemeral;
        self
    }

    pub fn argument(&self, key: &str) -> Option<&ArgumentSpec> {
        self.arguments.iter().find(|argument| argument.key == key)
    }

    pub fn default_argument_spec(&self) -> Option<&ArgumentSpec> {
        self.default_key
            .as_deref()
            .and_then(|key| self.argument(key))
    }

    /// Fails with [`CommandError::WrongEnvironment`] for guild-only commands used
    /// outside a guild.
    pub fn check_environment(&self, in_guild: bool) -> Result<(), CommandError> {
        if self.guild_only && !in_guild {
            return Err(CommandError::WrongEnvironment {
                command: self.name.clone(),
            });
        }
        Ok(())
    }

    /// Checks the definition's internal consistency.
    pub fn validate(&self) -> Result<(), CommandError> {
        let invalid = |reason: String| CommandError::InvalidDefinition {
            command: self.name.clone(),
            reason,
        };
        if !is_valid_command_name(&self.name) {
            return Err(invalid("name must start with a letter".to_string()));
        }
        if self.require_input && self.input_type == TypeTag::Empty {
            return Err(invalid(
                "require_input needs a non-empty input type".to_string(),
            ));
        }

        let mut keys = HashSet::new();
        for argument in &self.arguments {
            if !keys.insert(argument.key.as_str()) {
                return Err(invalid(format!("duplicate argument '{}'", argument.key)));
            }
            if !argument.tag.is_value() {
                return Err(invalid(format!(
                    "argument '{}' has non-value type {}",
                    argument.key, argument.tag
                )));
            }
            if argument.tag == TypeTag::Enum && argument.choices.is_empty() {
                return Err(invalid(format!(
                    "enum argument '{}' declares no choices",
                    argument.key
                )));
            }
            if let Some(default) = &argument.default {
                if default.type_tag() != argument.tag {
                    return Err(invalid(format!(
                        "argument '{}' default is {} but declared {}",
                        argument.key,
                        default.type_tag(),
                        argument.tag
                    )));
                }
            }
        }

        if let Some(default_key) = &self.default_key {
            if self.argument(default_key).is_none() {
                return Err(invalid(format!(
                    "default key '{default_key}' is not a declared argument"
                )));
            }
        }
        Ok(())
    }
}
