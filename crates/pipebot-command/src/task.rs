//! Task contract implemented by every command body.

use std::{future::Future, sync::Arc};

use async_trait::async_trait;
use pipebot_core::{FileHandle, TempFileStore};
use thiserror::Error;

use crate::{
    binder::BoundArguments,
    definition::CommandDefinition,
    registry::CommandRegistry,
    value::{TypeTag, Value},
};

/// Data flowing from one chain step into the next.
#[derive(Debug, PartialEq)]
pub enum TaskData {
    Empty,
    Value(Value),
    Files(Vec<FileHandle>),
}

impl TaskData {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Value(Value::Text(text.into()))
    }

    pub fn type_tag(&self) -> TypeTag {
        match self {
            Self::Empty => TypeTag::Empty,
            Self::Value(value) => value.type_tag(),
            Self::Files(_) => TypeTag::Files,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Takes the files out of a `Files` payload; other payloads yield none.
    pub fn into_files(self) -> Vec<FileHandle> {
        match self {
            Self::Files(files) => files,
            _ => Vec::new(),
        }
    }

    pub fn file_count(&self) -> usize {
        match self {
            Self::Files(files) => files.len(),
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
/// How a step's text combines with the text accumulated so far.
pub enum TextMode {
    #[default]
    Replace,
    Append,
}

/// Result of one task run.
#[derive(Debug, PartialEq)]
pub struct TaskOutput {
    pub data: TaskData,
    /// Reply text; falls back to the rendered value when absent.
    pub message: Option<String>,
    pub text_mode: TextMode,
    pub suppress_embeds: bool,
}

impl TaskOutput {
    pub fn new(data: TaskData) -> Self {
        Self {
            data,
            message: None,
            text_mode: TextMode::Replace,
            suppress_embeds: false,
        }
    }

    pub fn empty() -> Self {
        Self::new(TaskData::Empty)
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(TaskData::text(text))
    }

    pub fn value(value: Value) -> Self {
        Self::new(TaskData::Value(value))
    }

    pub fn files(files: Vec<FileHandle>) -> Self {
        Self::new(TaskData::Files(files))
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn appending(mut self) -> Self {
        self.text_mode = TextMode::Append;
        self
    }

    pub fn suppressing_embeds(mut self) -> Self {
        self.suppress_embeds = true;
        self
    }

    /// Text this step contributes to the reply.
    pub fn response_text(&self) -> Option<String> {
        self.message
            .clone()
            .or_else(|| self.data.as_value().map(Value::render))
    }
}

/// Error whose message is safe to show to the user verbatim.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct UserFacingError {
    pub message: String,
}

impl UserFacingError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Per-step environment handed to a task.
#[derive(Clone)]
pub struct TaskContext {
    pub chain_id: String,
    pub definition: Arc<CommandDefinition>,
    pub guild_id: Option<String>,
    pub author_id: String,
    pub files: TempFileStore,
    pub registry: Arc<CommandRegistry>,
}

/// Trait contract for command bodies.
///
/// `input` is the predecessor's output (or the message attachments for the
/// first step); ownership of its files moves into the task.
#[async_trait]
pub trait CommandTask: Send + Sync {
    async fn run(
        &self,
        context: TaskContext,
        arguments: BoundArguments,
        input: TaskData,
    ) -> anyhow::Result<TaskOutput>;
}

/// Runs `operation` over every file concurrently, preserving input order.
///
/// The first failure drops the remaining futures. Files they already allocated
/// stay registered with the chain's cleanup tracker.
pub async fn map_files_parallel<T, F, Fut>(
    files: Vec<FileHandle>,
    operation: F,
) -> anyhow::Result<Vec<T>>
where
    F: Fn(usize, FileHandle) -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    futures_util::future::try_join_all(
        files
            .into_iter()
            .enumerate()
            .map(|(index, file)| operation(index, file)),
    )
    .await
}
