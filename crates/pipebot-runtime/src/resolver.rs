//! Maps raw command segments onto registered commands and stored templates.

use pipebot_command::{
    bind_arguments, is_piped, CommandConfig, CommandError, CommandRegistry, RawCommand,
    RawCommandParser, RegisteredCommand,
};

use crate::{
    error::ExecutionError,
    platform::IncomingMessage,
    store::{CommandStore, CommandTemplate},
};

pub const TEMPLATE_INPUT_PLACEHOLDER: &str = "{input}";

#[derive(Debug, Clone)]
/// A raw segment paired with the command it resolved to.
pub struct ResolvedStep {
    pub raw: RawCommand,
    pub command: RegisteredCommand,
    /// Name of the template this step was expanded from.
    pub template: Option<String>,
}

pub struct CommandResolver<'a> {
    registry: &'a CommandRegistry,
    store: &'a dyn CommandStore,
    parser: RawCommandParser,
    max_template_commands: usize,
}

impl<'a> CommandResolver<'a> {
    pub fn new(
        registry: &'a CommandRegistry,
        store: &'a dyn CommandStore,
        parser: RawCommandParser,
        max_template_commands: usize,
    ) -> Self {
        Self {
            registry,
            store,
            parser,
            max_template_commands,
        }
    }

    /// Resolves every segment in order, expanding templates in place.
    ///
    /// Unscoped names prefer built-in commands. Scoped names (`name:id`) and
    /// names unknown to the registry are looked up as templates.
    pub async fn resolve_all(
        &self,
        raws: Vec<RawCommand>,
        message: &IncomingMessage,
    ) -> Result<Vec<ResolvedStep>, ExecutionError> {
        let mut steps = Vec::with_capacity(raws.len());
        for raw in raws {
            if raw.entity_id.is_none() {
                if let Some(command) = self.registry.resolve(&raw.name) {
                    command.definition.check_environment(message.in_guild())?;
                    steps.push(ResolvedStep {
                        raw,
                        command: command.clone(),
                        template: None,
                    });
                    continue;
                }
            }

            let scope_id = raw.entity_id.as_deref().or(message.guild_id.as_deref());
            let template = self
                .store
                .find_template(&raw.name, scope_id)
                .await
                .map_err(ExecutionError::Store)?
                .ok_or_else(|| self.not_found(&raw.name))?;
            steps.extend(self.expand_template(&template, &raw, message)?);
        }
        Ok(steps)
    }

    fn expand_template(
        &self,
        template: &CommandTemplate,
        invocation: &RawCommand,
        message: &IncomingMessage,
    ) -> Result<Vec<ResolvedStep>, ExecutionError> {
        let body = template
            .body
            .replace(TEMPLATE_INPUT_PLACEHOLDER, &invocation.default_argument);
        let raws = self.parser.parse(&body).collect::<Vec<_>>();
        if raws.is_empty() {
            return Err(ExecutionError::Store(anyhow::anyhow!(
                "template '{}' contains no commands",
                template.name
            )));
        }
        if raws.len() > self.max_template_commands {
            return Err(CommandError::ChainTooLong {
                length: raws.len(),
                max: self.max_template_commands,
            }
            .into());
        }

        let mut steps = Vec::with_capacity(raws.len());
        for mut raw in raws {
            // Templates expand one level: nested templates are not resolved.
            let command = match raw.entity_id {
                None => self.registry.resolve(&raw.name),
                Some(_) => None,
            }
            .ok_or_else(|| self.not_found(&raw.name))?;
            command.definition.check_environment(message.in_guild())?;

            for (key, value) in &invocation.named_arguments {
                if command.definition.argument(key).is_some() {
                    raw.named_arguments
                        .entry(key.clone())
                        .or_insert_with(|| value.clone());
                }
            }
            steps.push(ResolvedStep {
                raw,
                command: command.clone(),
                template: Some(template.name.clone()),
            });
        }
        tracing::debug!(
            template = %template.name,
            commands = steps.len(),
            "expanded command template"
        );
        Ok(steps)
    }

    fn not_found(&self, name: &str) -> ExecutionError {
        CommandError::CommandNotFound {
            name: name.to_string(),
            prefix: self.parser.grammar().prefix,
        }
        .into()
    }
}

/// Binds every resolved step, marking value-typed steps after the first as piped.
pub fn bind_steps(steps: &[ResolvedStep]) -> Result<Vec<CommandConfig>, CommandError> {
    let definitions = steps
        .iter()
        .map(|step| step.command.definition.as_ref())
        .collect::<Vec<_>>();
    steps
        .iter()
        .enumerate()
        .map(|(index, step)| {
            let arguments =
                bind_arguments(&step.raw, &step.command.definition, is_piped(&definitions, index))?;
            Ok(CommandConfig {
                command: step.command.clone(),
                entity_id: step.raw.entity_id.clone(),
                arguments,
            })
        })
        .collect()
}
