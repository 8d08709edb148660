//! Command grammar, typed argument binding, and chain type checking for pipebot.
//!
//! Message text flows through this crate as
//! [`RawCommandParser`] -> [`CommandRegistry`] -> [`bind_arguments`] ->
//! [`validate_chain`]. The [`CommandTask`] trait is the seam through which the
//! runtime invokes command bodies.

pub mod binder;
pub mod compat;
pub mod definition;
pub mod error;
pub mod raw_parser;
pub mod registry;
pub mod task;
pub mod typed_form;
pub mod value;

pub use binder::{bind_arguments, BoundArguments};
pub use compat::{
    is_compatible, is_piped, validate_chain, validate_definitions, CommandConfig,
};
pub use definition::{ArgumentSpec, CommandDefinition};
pub use error::CommandError;
pub use raw_parser::{
    is_valid_command_name, GrammarConfig, RawCommand, RawCommandParser, RawCommands,
    DEFAULT_COMMAND_PREFIX, DEFAULT_NAMED_ARGUMENT_PREFIX, ENTITY_SEPARATOR,
};
pub use registry::{CommandRegistry, RegisteredCommand};
pub use task::{
    map_files_parallel, CommandTask, TaskContext, TaskData, TaskOutput, TextMode,
    UserFacingError,
};
pub use typed_form::typed_form;
pub use value::{coerce_value, TypeTag, Value};
