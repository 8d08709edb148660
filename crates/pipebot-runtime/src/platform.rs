//! Messaging platform seam: incoming messages, outgoing payloads, and the
//! transport operations the chain runtime needs.

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use pipebot_core::{FileHandle, TempFileStore};

pub const DEFAULT_MAX_MESSAGE_CONTENT_LENGTH: usize = 2_000;
pub const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 8 * 1024 * 1024;
pub const DEFAULT_MAX_FILES_PER_MESSAGE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Hard limits a response must satisfy before it is dispatched.
pub struct PlatformLimits {
    /// Counted in characters, not bytes.
    pub max_message_content_length: usize,
    pub max_file_size: u64,
    pub max_files_per_message: usize,
}

impl Default for PlatformLimits {
    fn default() -> Self {
        Self {
            max_message_content_length: DEFAULT_MAX_MESSAGE_CONTENT_LENGTH,
            max_file_size: DEFAULT_MAX_FILE_SIZE_BYTES,
            max_files_per_message: DEFAULT_MAX_FILES_PER_MESSAGE,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attachment {
    pub id: String,
    pub file_name: String,
    pub url: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// A chat message as delivered by the platform.
pub struct IncomingMessage {
    pub message_id: String,
    pub channel_id: String,
    /// Absent for direct messages.
    pub guild_id: Option<String>,
    pub author_id: String,
    pub content: String,
    pub attachments: Vec<Attachment>,
}

impl IncomingMessage {
    pub fn in_guild(&self) -> bool {
        self.guild_id.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFile {
    pub file_name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Final reply of a chain, already checked against [`PlatformLimits`].
pub struct ResponsePayload {
    pub content: String,
    pub files: Vec<OutboundFile>,
    pub suppress_embeds: bool,
    /// Message the reply references, when sent as a new message.
    pub reply_to: Option<String>,
    /// Only honoured for replies to a deferred acknowledgement.
    pub ephemeral: bool,
}

impl ResponsePayload {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }
}

/// Transport operations used by the chain runtime.
///
/// Implementations own retries and rate limiting; the runtime calls each
/// operation at most once per chain.
#[async_trait]
pub trait MessagingPlatform: Send + Sync {
    fn limits(&self) -> PlatformLimits;

    async fn send_typing(&self, channel_id: &str) -> Result<()>;

    async fn stop_typing(&self, channel_id: &str) -> Result<()>;

    async fn create_message(&self, channel_id: &str, payload: ResponsePayload) -> Result<()>;

    /// Acknowledges `message` so that a later [`reply`](Self::reply) can complete it.
    async fn defer_reply(&self, message: &IncomingMessage, ephemeral: bool) -> Result<()>;

    /// Completes a deferred acknowledgement, or sends a follow-up to it.
    async fn reply(&self, message: &IncomingMessage, payload: ResponsePayload) -> Result<()>;

    /// Fetches the message's attachments into `store`, in attachment order.
    async fn download_attachments(
        &self,
        message: &IncomingMessage,
        store: &TempFileStore,
    ) -> Result<Vec<FileHandle>>;
}
