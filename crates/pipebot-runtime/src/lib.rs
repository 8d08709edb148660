//! Chain runtime for pipebot: turns an incoming chat message into a validated
//! command chain, runs it step by step, and replies through a
//! [`MessagingPlatform`].
//!
//! Temporary files created while a chain runs are released exactly once after
//! the reply is dispatched, whatever the outcome.

pub mod cancellation;
pub mod config;
pub mod error;
pub mod executor;
pub mod platform;
pub mod resolver;
pub mod response;
pub mod runtime;
pub mod store;

pub use cancellation::CooperativeCancellationToken;
pub use config::{
    ChainRuntimeConfig, DEFAULT_MAX_CHAIN_LENGTH, DEFAULT_MAX_TEMPLATE_COMMANDS,
    DEFAULT_STEP_TIMEOUT_MS,
};
pub use error::{render_user_error, ExecutionError};
pub use executor::{ChainEnvironment, ChainExecutor, ChainOutput, ChainState, StepSummary};
pub use platform::{
    Attachment, IncomingMessage, MessagingPlatform, OutboundFile, PlatformLimits,
    ResponsePayload, DEFAULT_MAX_FILES_PER_MESSAGE, DEFAULT_MAX_FILE_SIZE_BYTES,
    DEFAULT_MAX_MESSAGE_CONTENT_LENGTH,
};
pub use resolver::{bind_steps, CommandResolver, ResolvedStep, TEMPLATE_INPUT_PLACEHOLDER};
pub use response::{merge_step_text, ResponseAssembler, EMPTY_RESPONSE_TEXT};
pub use runtime::{
    ChainFailure, ChainReport, ChainRuntime, CleanupCounts, IgnoreReason, ReplyKind,
};
pub use store::{CommandStore, CommandTemplate, InMemoryCommandStore};
