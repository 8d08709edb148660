//! Built-in command bodies for pipebot.
//!
//! Every command here is an ordinary [`CommandTask`] paired with its
//! [`CommandDefinition`]; [`builtin_registry`] assembles the startup registry.

pub mod delay;
pub mod files;
pub mod info;
pub mod numeric;
pub mod text;

use std::sync::Arc;

use pipebot_command::{
    CommandDefinition, CommandError, CommandRegistry, CommandTask, GrammarConfig,
    RegisteredCommand,
};

pub use delay::DelayTask;
pub use files::{CatTask, DuplicateTask, HashTask, WriteTask};
pub use info::{GuildTask, HelpTask};
pub use numeric::AddTask;
pub use text::{CaseTask, EchoTask, LengthTask, RepeatTask, ReverseTask, UpperTask};

fn register(definition: CommandDefinition, task: impl CommandTask + 'static) -> RegisteredCommand {
    RegisteredCommand::new(definition, Arc::new(task))
}

/// The full built-in command set, in no particular order.
pub fn builtin_commands(grammar: GrammarConfig) -> Vec<RegisteredCommand> {
    vec![
        register(EchoTask::definition(), EchoTask),
        register(UpperTask::definition(), UpperTask),
        register(ReverseTask::definition(), ReverseTask),
        register(CaseTask::definition(), CaseTask),
        register(RepeatTask::definition(), RepeatTask),
        register(LengthTask::definition(), LengthTask),
        register(AddTask::definition(), AddTask),
        register(WriteTask::definition(), WriteTask),
        register(CatTask::definition(), CatTask),
        register(DuplicateTask::definition(), DuplicateTask),
        register(HashTask::definition(), HashTask),
        register(HelpTask::definition(), HelpTask::new(grammar.prefix)),
        register(GuildTask::definition(), GuildTask),
        register(DelayTask::definition(), DelayTask),
    ]
}

/// Builds the registry of built-in commands plus `extra` commands.
pub fn builtin_registry<I>(grammar: GrammarConfig, extra: I) -> Result<CommandRegistry, CommandError>
where
    I: IntoIterator<Item = RegisteredCommand>,
{
    CommandRegistry::new(builtin_commands(grammar).into_iter().chain(extra))
}
