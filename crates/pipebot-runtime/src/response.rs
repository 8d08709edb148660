//! Folds step outputs into one reply and enforces platform limits.

use pipebot_command::TextMode;

use crate::{
    error::ExecutionError,
    executor::{ChainOutput, StepSummary},
    platform::{OutboundFile, PlatformLimits, ResponsePayload},
};

pub const EMPTY_RESPONSE_TEXT: &str = "Done.";

#[derive(Debug, Clone, Copy)]
pub struct ResponseAssembler {
    limits: PlatformLimits,
}

impl ResponseAssembler {
    pub fn new(limits: PlatformLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> PlatformLimits {
        self.limits
    }

    /// Builds the reply for a finished chain.
    ///
    /// Only the final step's files are attached. Oversized replies fail instead
    /// of being truncated.
    pub async fn assemble(
        &self,
        output: ChainOutput,
        reply_to: Option<String>,
        ephemeral: bool,
    ) -> Result<ResponsePayload, ExecutionError> {
        let suppress_embeds = output.steps.iter().any(|step| step.suppress_embeds);
        let files = output.data.into_files();
        if files.len() > self.limits.max_files_per_message {
            return Err(ExecutionError::TooManyFiles {
                count: files.len(),
                max: self.limits.max_files_per_message,
            });
        }

        let mut outbound = Vec::with_capacity(files.len());
        for file in files {
            let size_bytes = file.size_bytes().await.map_err(ExecutionError::Storage)?;
            if size_bytes > self.limits.max_file_size {
                return Err(ExecutionError::FileTooLarge {
                    file_name: file.file_name().to_string(),
                    size_bytes,
                    max_bytes: self.limits.max_file_size,
                });
            }
            outbound.push(OutboundFile {
                file_name: file.file_name().to_string(),
                path: file.path().to_path_buf(),
                size_bytes,
            });
        }

        let mut content = merge_step_text(&output.steps);
        let length = content.chars().count();
        if length > self.limits.max_message_content_length {
            return Err(ExecutionError::MessageTooLong {
                length,
                max: self.limits.max_message_content_length,
            });
        }
        if content.trim().is_empty() && outbound.is_empty() {
            content = EMPTY_RESPONSE_TEXT.to_string();
        }

        Ok(ResponsePayload {
            content,
            files: outbound,
            suppress_embeds,
            reply_to,
            ephemeral,
        })
    }
}

/// Replace-mode steps overwrite what came before, including with nothing when
/// they produce no text. Append-mode text is joined on a new line.
pub fn merge_step_text(steps: &[StepSummary]) -> String {
    let mut merged = String::new();
    for step in steps {
        match (step.text_mode, step.text.as_deref()) {
            (TextMode::Replace, text) => {
                merged.clear();
                merged.push_str(text.unwrap_or_default());
            }
            (TextMode::Append, None) => {}
            (TextMode::Append, Some(text)) => {
                if !merged.is_empty() && !text.is_empty() {
                    merged.push('\n');
                }
                merged.push_str(text);
            }
        }
    }
    merged
}
