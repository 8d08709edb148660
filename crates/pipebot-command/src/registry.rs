//! Startup-time command registry.
//!
//! The registry is built once from the full command set and never mutated
//! afterwards, so it is shared behind an `Arc` without locking.

use std::{collections::BTreeMap, fmt, sync::Arc};

use crate::{definition::CommandDefinition, error::CommandError, task::CommandTask};

#[derive(Clone)]
/// A command definition paired with the task that implements it.
pub struct RegisteredCommand {
    pub definition: Arc<CommandDefinition>,
    pub task: Arc<dyn CommandTask>,
}

impl RegisteredCommand {
    pub fn new(definition: CommandDefinition, task: Arc<dyn CommandTask>) -> Self {
        Self {
            definition: Arc::new(definition),
            task,
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }
}

impl fmt::Debug for RegisteredCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredCommand")
            .field("definition", &self.definition)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct CommandRegistry {
    commands: BTreeMap<String, RegisteredCommand>,
}

impl CommandRegistry {
    /// Builds the registry, failing on the first duplicate name or invalid definition.
    pub fn new<I>(commands: I) -> Result<Self, CommandError>
    where
        I: IntoIterator<Item = RegisteredCommand>,
    {
        let mut registry = BTreeMap::new();
        for command in commands {
            command.definition.validate()?;
            let name = command.name().to_string();
            if registry.contains_key(&name) {
                return Err(CommandError::DuplicateCommand(name));
            }
            registry.insert(name, command);
        }
        Ok(Self { commands: registry })
    }

    /// Case-sensitive exact lookup.
    pub fn resolve(&self, name: &str) -> Option<&RegisteredCommand> {
        self.commands.get(name)
    }

    /// Definitions sorted by name.
    pub fn definitions(&self) -> impl Iterator<Item = &CommandDefinition> {
        self.commands
            .values()
            .map(|command| command.definition.as_ref())
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
