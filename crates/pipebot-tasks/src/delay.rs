use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use pipebot_command::{
    ArgumentSpec, BoundArguments, CommandDefinition, CommandTask, TaskContext, TaskData,
    TaskOutput, TypeTag, UserFacingError, Value,
};

use crate::text::{bound_text, text_argument};

const DEFAULT_DELAY_MS: i64 = 1_000;
const MAX_DELAY_MS: i64 = 60_000;

/// `delay`: waits, then passes its text through and appends a note to the reply.
///
/// Requests a deferred reply so the platform acknowledges the message while
/// the chain is still running.
pub struct DelayTask;

impl DelayTask {
    pub fn definition() -> CommandDefinition {
        CommandDefinition::new("delay", TypeTag::Text, TypeTag::Text)
            .with_description("Waits before passing text on.")
            .with_default_argument(text_argument())
            .with_argument(
                ArgumentSpec::optional("ms", TypeTag::Long)
                    .with_default(Value::Long(DEFAULT_DELAY_MS))
                    .with_description("milliseconds to wait, up to 60000"),
            )
            .deferring_reply(false)
    }
}

#[async_trait]
impl CommandTask for DelayTask {
    async fn run(
        &self,
        context: TaskContext,
        arguments: BoundArguments,
        _input: TaskData,
    ) -> Result<TaskOutput> {
        let text = bound_text(&arguments, "text")?.to_string();
        let ms = arguments.integer("ms").unwrap_or(DEFAULT_DELAY_MS);
        if !(0..=MAX_DELAY_MS).contains(&ms) {
            return Err(UserFacingError::new(format!(
                "`ms` must be between 0 and {MAX_DELAY_MS}."
            ))
            .into());
        }
        tracing::debug!(chain_id = %context.chain_id, ms, "delaying chain step");
        tokio::time::sleep(Duration::from_millis(ms as u64)).await;
        Ok(TaskOutput::text(text)
            .with_message(format!("(waited {ms}ms)"))
            .appending())
    }
}
