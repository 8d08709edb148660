//! File-set commands: `write`, `cat`, `duplicate`, `hash`.

use anyhow::Result;
use async_trait::async_trait;
use pipebot_command::{
    map_files_parallel, ArgumentSpec, BoundArguments, CommandDefinition, CommandTask,
    TaskContext, TaskData, TaskOutput, TypeTag, UserFacingError, Value,
};
use sha2::{Digest, Sha256};

use crate::text::{bound_text, text_argument};

const DEFAULT_OUTPUT_FILE_NAME: &str = "output.txt";
const MAX_DUPLICATE_COUNT: i64 = 5;

pub struct WriteTask;

impl WriteTask {
    pub fn definition() -> CommandDefinition {
        CommandDefinition::new("write", TypeTag::Text, TypeTag::Files)
            .with_description("Writes text into a file.")
            .with_default_argument(text_argument())
            .with_argument(
                ArgumentSpec::optional("name", TypeTag::Text)
                    .with_default(Value::Text(DEFAULT_OUTPUT_FILE_NAME.to_string())),
            )
    }
}

#[async_trait]
impl CommandTask for WriteTask {
    async fn run(
        &self,
        context: TaskContext,
        arguments: BoundArguments,
        _input: TaskData,
    ) -> Result<TaskOutput> {
        let text = bound_text(&arguments, "text")?;
        let name = arguments
            .text("name")
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(DEFAULT_OUTPUT_FILE_NAME);
        let file = context.files.write(name, text.as_bytes()).await?;
        Ok(TaskOutput::files(vec![file]))
    }
}

/// `cat`: concatenates text files.
pub struct CatTask;

impl CatTask {
    pub fn definition() -> CommandDefinition {
        CommandDefinition::new("cat", TypeTag::Files, TypeTag::Text)
            .with_description("Shows the contents of text files.")
            .requiring_input()
    }
}

#[async_trait]
impl CommandTask for CatTask {
    async fn run(
        &self,
        _context: TaskContext,
        _arguments: BoundArguments,
        input: TaskData,
    ) -> Result<TaskOutput> {
        let mut parts = Vec::new();
        for file in input.into_files() {
            let bytes = file.read().await?;
            let text = String::from_utf8(bytes).map_err(|_| {
                UserFacingError::new(format!("`{}` is not a text file.", file.file_name()))
            })?;
            parts.push(text);
        }
        Ok(TaskOutput::text(parts.join("\n")))
    }
}

pub struct DuplicateTask;

impl DuplicateTask {
    pub fn definition() -> CommandDefinition {
        CommandDefinition::new("duplicate", TypeTag::Files, TypeTag::Files)
            .with_description("Copies every file several times.")
            .with_argument(
                ArgumentSpec::optional("count", TypeTag::Integer)
                    .with_default(Value::Integer(2))
                    .with_description("copies per file, 1 to 5"),
            )
    }
}

#[async_trait]
impl CommandTask for DuplicateTask {
    async fn run(
        &self,
        context: TaskContext,
        arguments: BoundArguments,
        input: TaskData,
    ) -> Result<TaskOutput> {
        let count = arguments.integer("count").unwrap_or(2);
        if !(1..=MAX_DUPLICATE_COUNT).contains(&count) {
            return Err(UserFacingError::new(format!(
                "`count` must be between 1 and {MAX_DUPLICATE_COUNT}."
            ))
            .into());
        }

        let store = &context.files;
        let copies = map_files_parallel(input.into_files(), |_, file| async move {
            let bytes = file.read().await?;
            let mut copies = Vec::with_capacity(count as usize);
            for copy in 1..=count {
                copies.push(
                    store
                        .write(&format!("{copy}-{}", file.file_name()), &bytes)
                        .await?,
                );
            }
            Ok(copies)
        })
        .await?;
        Ok(TaskOutput::files(copies.into_iter().flatten().collect()))
    }
}

pub struct HashTask;

impl HashTask {
    pub fn definition() -> CommandDefinition {
        CommandDefinition::new("hash", TypeTag::Files, TypeTag::Text)
            .with_description("Prints the SHA-256 digest of every file.")
            .requiring_input()
    }
}

#[async_trait]
impl CommandTask for HashTask {
    async fn run(
        &self,
        _context: TaskContext,
        _arguments: BoundArguments,
        input: TaskData,
    ) -> Result<TaskOutput> {
        let lines = map_files_parallel(input.into_files(), |_, file| async move {
            let bytes = file.read().await?;
            let checksum = format!("{:x}", Sha256::digest(&bytes));
            Ok(format!("{checksum}  {}", file.file_name()))
        })
        .await?;
        Ok(TaskOutput::text(lines.join("\n")))
    }
}
