//! Chain failure taxonomy and its translation into user-facing text.

use pipebot_command::{CommandError, UserFacingError};
use thiserror::Error;

const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong. Please try again later.";

/// Enumerates every way a chain can fail once its text parsed into commands.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("command '{command}' failed: {source:#}")]
    Task {
        command: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("command '{command}' timed out after {timeout_ms}ms")]
    StepTimeout { command: String, timeout_ms: u64 },
    #[error("chain execution cancelled")]
    Cancelled,
    #[error("command '{command}' produced {actual} but declares {declared}")]
    OutputTypeMismatch {
        command: String,
        actual: pipebot_command::TypeTag,
        declared: pipebot_command::TypeTag,
    },
    #[error("response text has {length} characters (max {max})")]
    MessageTooLong { length: usize, max: usize },
    #[error("response has {count} files (max {max})")]
    TooManyFiles { count: usize, max: usize },
    #[error("file '{file_name}' is {size_bytes} bytes (max {max_bytes})")]
    FileTooLarge {
        file_name: String,
        size_bytes: u64,
        max_bytes: u64,
    },
    #[error("messaging platform error: {0:#}")]
    Platform(anyhow::Error),
    #[error("command store error: {0:#}")]
    Store(anyhow::Error),
    #[error("chain storage error: {0:#}")]
    Storage(anyhow::Error),
}

impl ExecutionError {
    /// Stable machine-readable code used in logs and chain reports.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Command(error) => match error {
                CommandError::DuplicateCommand(_) | CommandError::InvalidDefinition { .. } => {
                    "invalid_registry"
                }
                CommandError::CommandNotFound { .. } => "command_not_found",
                CommandError::WrongEnvironment { .. } => "wrong_environment",
                CommandError::MissingArgument { .. } => "missing_argument",
                CommandError::InvalidArgument { .. } => "invalid_argument",
                CommandError::IncompatibleChain { .. } => "incompatible_chain",
                CommandError::MissingInput { .. } => "missing_input",
                CommandError::InputRequired { .. } => "input_required",
                CommandError::ChainTooLong { .. } => "chain_too_long",
            },
            Self::Task { .. } => "task_failed",
            Self::StepTimeout { .. } => "step_timeout",
            Self::Cancelled => "cancelled",
            Self::OutputTypeMismatch { .. } => "output_type_mismatch",
            Self::MessageTooLong { .. } => "message_too_long",
            Self::TooManyFiles { .. } => "too_many_files",
            Self::FileTooLarge { .. } => "file_too_large",
            Self::Platform(_) => "platform_error",
            Self::Store(_) => "store_error",
            Self::Storage(_) => "storage_error",
        }
    }

    /// True for failures caused by what the user typed rather than by a fault.
    pub fn is_user_error(&self) -> bool {
        match self {
            Self::Command(error) => !matches!(
                error,
                CommandError::DuplicateCommand(_) | CommandError::InvalidDefinition { .. }
            ),
            Self::MessageTooLong { .. } | Self::TooManyFiles { .. } | Self::FileTooLarge { .. } => {
                true
            }
            _ => false,
        }
    }
}

/// Renders the single reply text shown for `error`.
pub fn render_user_error(error: &ExecutionError, prefix: char) -> String {
    match error {
        ExecutionError::Command(error) => render_command_error(error, prefix),
        ExecutionError::Task { command, source } => source
            .chain()
            .find_map(|cause| cause.downcast_ref::<UserFacingError>())
            .map(|user_error| user_error.message.clone())
            .unwrap_or_else(|| format!("Something went wrong while running `{prefix}{command}`.")),
        ExecutionError::StepTimeout { command, .. } => {
            format!("`{prefix}{command}` took too long and was stopped.")
        }
        ExecutionError::Cancelled => "The command was cancelled.".to_string(),
        ExecutionError::OutputTypeMismatch { command, .. } => {
            format!("Something went wrong while running `{prefix}{command}`.")
        }
        ExecutionError::MessageTooLong { length, max } => {
            format!("The response is too long to send ({length} characters, max {max}).")
        }
        ExecutionError::TooManyFiles { count, max } => {
            format!("The response has too many files to send ({count}, max {max}).")
        }
        ExecutionError::FileTooLarge {
            file_name,
            size_bytes,
            max_bytes,
        } => format!(
            "`{file_name}` is too large to send ({}, max {}).",
            format_size(*size_bytes),
            format_size(*max_bytes)
        ),
        ExecutionError::Platform(_) | ExecutionError::Store(_) | ExecutionError::Storage(_) => {
            GENERIC_FAILURE_MESSAGE.to_string()
        }
    }
}

fn render_command_error(error: &CommandError, prefix: char) -> String {
    match error {
        CommandError::CommandNotFound { name, prefix } => format!(
            "Command `{prefix}{name}` not found. Use `{prefix}help` to list commands."
        ),
        CommandError::WrongEnvironment { command } => {
            format!("`{prefix}{command}` can only be used in a server.")
        }
        CommandError::MissingArgument { command, key } => {
            format!("Missing argument `{key}` for `{prefix}{command}`.")
        }
        CommandError::InvalidArgument {
            command,
            key,
            value,
            expected,
        } => format!(
            "Invalid value `{value}` for argument `{key}` of `{prefix}{command}`: expected {expected}."
        ),
        CommandError::IncompatibleChain {
            from,
            output,
            to,
            input,
        } => format!(
            "Cannot chain `{prefix}{from}` into `{prefix}{to}`: `{prefix}{from}` outputs {output} but `{prefix}{to}` expects {input}."
        ),
        CommandError::MissingInput { command, previous } => format!(
            "`{prefix}{command}` needs input, but `{prefix}{previous}` produces nothing."
        ),
        CommandError::InputRequired { command } => format!(
            "`{prefix}{command}` needs input. Attach a file or chain it after another command."
        ),
        CommandError::ChainTooLong { length, max } => {
            format!("Too many chained commands ({length}, max {max}).")
        }
        CommandError::DuplicateCommand(_) | CommandError::InvalidDefinition { .. } => {
            GENERIC_FAILURE_MESSAGE.to_string()
        }
    }
}

fn format_size(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    if bytes >= MIB {
        format!("{:.1} MB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}
