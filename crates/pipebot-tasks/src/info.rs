//! Introspection commands: `help` and `guild`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use pipebot_command::{
    ArgumentSpec, BoundArguments, CommandDefinition, CommandTask, TaskContext, TaskData,
    TaskOutput, TypeTag, UserFacingError,
};

/// Lists the registered commands, or describes one of them.
pub struct HelpTask {
    prefix: char,
}

impl HelpTask {
    pub fn new(prefix: char) -> Self {
        Self { prefix }
    }

    pub fn definition() -> CommandDefinition {
        CommandDefinition::new("help", TypeTag::Empty, TypeTag::Text)
            .with_description("Lists commands, or shows how to use one.")
            .with_default_argument(
                ArgumentSpec::optional("command", TypeTag::Text)
                    .with_description("command to describe"),
            )
    }

    fn overview<'a>(&self, definitions: impl Iterator<Item = &'a CommandDefinition>) -> String {
        let mut lines = vec!["Commands:".to_string()];
        for definition in definitions {
            lines.push(format!(
                "`{}{}` ({} -> {}) {}",
                self.prefix,
                definition.name,
                definition.input_type,
                definition.output_type,
                definition.description
            ));
        }
        lines.push(format!(
            "Chain commands in one message, e.g. `{0}echo hi {0}upper`.",
            self.prefix
        ));
        lines.join("\n")
    }

    fn describe(&self, definition: &CommandDefinition) -> String {
        let mut lines = vec![format!(
            "`{}{}`: {}",
            self.prefix, definition.name, definition.description
        )];
        lines.push(format!(
            "Takes {}, produces {}.",
            definition.input_type, definition.output_type
        ));
        if definition.require_input {
            lines.push("Needs input from an attachment or a previous command.".to_string());
        }
        if definition.guild_only {
            lines.push("Only available in servers.".to_string());
        }
        for argument in &definition.arguments {
            let positional = definition.default_key.as_deref() == Some(argument.key.as_str());
            let mut line = if positional {
                format!("- `{}` (positional, {})", argument.key, argument.tag)
            } else {
                format!("- `-{}` ({})", argument.key, argument.tag)
            };
            if argument.required {
                line.push_str(", required");
            }
            if let Some(default) = &argument.default {
                line.push_str(&format!(", default `{default}`"));
            }
            if !argument.choices.is_empty() {
                line.push_str(&format!(", one of {}", argument.choices.join("/")));
            }
            if !argument.description.is_empty() {
                line.push_str(": ");
                line.push_str(&argument.description);
            }
            lines.push(line);
        }
        lines.join("\n")
    }
}

#[async_trait]
impl CommandTask for HelpTask {
    async fn run(
        &self,
        context: TaskContext,
        arguments: BoundArguments,
        _input: TaskData,
    ) -> Result<TaskOutput> {
        let requested = arguments
            .text("command")
            .map(|name| name.trim().trim_start_matches(self.prefix))
            .filter(|name| !name.is_empty());
        let text = match requested {
            None => self.overview(context.registry.definitions()),
            Some(name) => {
                let command = context.registry.resolve(name).ok_or_else(|| {
                    UserFacingError::new(format!("Command `{}{name}` not found.", self.prefix))
                })?;
                self.describe(&command.definition)
            }
        };
        Ok(TaskOutput::text(text))
    }
}

pub struct GuildTask;

impl GuildTask {
    pub fn definition() -> CommandDefinition {
        CommandDefinition::new("guild", TypeTag::Empty, TypeTag::Text)
            .with_description("Shows the id of the current server.")
            .guild_only()
    }
}

#[async_trait]
impl CommandTask for GuildTask {
    async fn run(
        &self,
        context: TaskContext,
        _arguments: BoundArguments,
        _input: TaskData,
    ) -> Result<TaskOutput> {
        let guild_id = context
            .guild_id
            .as_deref()
            .context("guild-only command ran outside a guild")?;
        Ok(TaskOutput::text(format!("This server's id is {guild_id}.")))
    }
}
