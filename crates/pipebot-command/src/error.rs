use thiserror::Error;

use crate::value::TypeTag;

/// Enumerates resolution, binding, and chain-validation failures.
///
/// Every variant is raised before any task runs.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("command '{0}' is registered more than once")]
    DuplicateCommand(String),
    #[error("command '{command}' has an invalid definition: {reason}")]
    InvalidDefinition { command: String, reason: String },
    #[error("command '{prefix}{name}' not found")]
    CommandNotFound { name: String, prefix: char },
    #[error("command '{command}' can only be used inside a guild")]
    WrongEnvironment { command: String },
    #[error("command '{command}' is missing required argument '{key}'")]
    MissingArgument { command: String, key: String },
    #[error("command '{command}' argument '{key}' expected {expected}, got '{value}'")]
    InvalidArgument {
        command: String,
        key: String,
        value: String,
        expected: TypeTag,
    },
    #[error("cannot chain '{from}' ({output}) into '{to}' ({input})")]
    IncompatibleChain {
        from: String,
        output: TypeTag,
        to: String,
        input: TypeTag,
    },
    #[error("command '{command}' expects input but '{previous}' produces none")]
    MissingInput { command: String, previous: String },
    #[error("command '{command}' requires input and cannot start a chain")]
    InputRequired { command: String },
    #[error("chain has {length} commands (max {max})")]
    ChainTooLong { length: usize, max: usize },
}

impl CommandError {
    /// Name of the command the error is attributed to, when there is one.
    pub fn command_name(&self) -> Option<&str> {
        match self {
            Self::DuplicateCommand(name) | Self::CommandNotFound { name, .. } => Some(name),
            Self::InvalidDefinition { command, .. }
            | Self::WrongEnvironment { command }
            | Self::MissingArgument { command, .. }
            | Self::InvalidArgument { command, .. }
            | Self::MissingInput { command, .. }
            | Self::InputRequired { command } => Some(command),
            Self::IncompatibleChain { to, .. } => Some(to),
            Self::ChainTooLong { .. } => None,
        }
    }
}
