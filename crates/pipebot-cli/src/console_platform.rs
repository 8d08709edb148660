//! Messaging platform that replies on a console writer.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use pipebot_core::{sanitize_file_name, FileHandle, TempFileStore};
use pipebot_runtime::{IncomingMessage, MessagingPlatform, PlatformLimits, ResponsePayload};
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::Mutex,
};

/// Prints replies as text and copies reply files into `output_dir`.
///
/// Attachment urls are read as local paths.
pub(crate) struct ConsolePlatform<W> {
    limits: PlatformLimits,
    output_dir: Option<PathBuf>,
    writer: Mutex<W>,
}

impl<W: AsyncWrite + Unpin + Send> ConsolePlatform<W> {
    pub(crate) fn new(limits: PlatformLimits, output_dir: Option<PathBuf>, writer: W) -> Self {
        Self {
            limits,
            output_dir,
            writer: Mutex::new(writer),
        }
    }

    /// Writes one reply block; the lock is held until it is flushed.
    async fn write_block(&self, block: &str) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer
            .write_all(format!("{block}\n").as_bytes())
            .await
            .context("failed to write console reply")?;
        writer.flush().await.context("failed to flush console reply")
    }

    async fn deliver(&self, header: &str, payload: ResponsePayload) -> Result<()> {
        let mut block = format!("{header}\n{}", payload.content);
        for file in &payload.files {
            let saved = match &self.output_dir {
                Some(dir) => Some(copy_out(dir, &file.file_name, &file.path).await?),
                None => None,
            };
            block.push_str(&format!("\n[file] {} ({} bytes)", file.file_name, file.size_bytes));
            if let Some(saved) = saved {
                block.push_str(&format!(" -> {}", saved.display()));
            }
        }
        self.write_block(&block).await
    }
}

async fn copy_out(dir: &Path, file_name: &str, source: &Path) -> Result<PathBuf> {
    let destination = dir.join(sanitize_file_name(file_name));
    tokio::fs::copy(source, &destination)
        .await
        .with_context(|| {
            format!(
                "failed to copy {} to {}",
                source.display(),
                destination.display()
            )
        })?;
    Ok(destination)
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> MessagingPlatform for ConsolePlatform<W> {
    fn limits(&self) -> PlatformLimits {
        self.limits
    }

    async fn send_typing(&self, channel_id: &str) -> Result<()> {
        tracing::debug!(channel_id, "typing");
        Ok(())
    }

    async fn stop_typing(&self, channel_id: &str) -> Result<()> {
        tracing::debug!(channel_id, "stopped typing");
        Ok(())
    }

    async fn create_message(&self, _channel_id: &str, payload: ResponsePayload) -> Result<()> {
        let header = match &payload.reply_to {
            Some(message_id) => format!("[reply to {message_id}]"),
            None => "[message]".to_string(),
        };
        self.deliver(&header, payload).await
    }

    async fn defer_reply(&self, message: &IncomingMessage, ephemeral: bool) -> Result<()> {
        let visibility = if ephemeral { " (only you)" } else { "" };
        self.write_block(&format!(
            "[{}] pipebot is thinking...{visibility}",
            message.message_id
        ))
        .await
    }

    async fn reply(&self, message: &IncomingMessage, payload: ResponsePayload) -> Result<()> {
        self.deliver(&format!("[deferred reply to {}]", message.message_id), payload)
            .await
    }

    async fn download_attachments(
        &self,
        message: &IncomingMessage,
        store: &TempFileStore,
    ) -> Result<Vec<FileHandle>> {
        let mut files = Vec::with_capacity(message.attachments.len());
        for attachment in &message.attachments {
            files.push(
                store
                    .import(&attachment.file_name, Path::new(&attachment.url))
                    .await?,
            );
        }
        Ok(files)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{
        pin::Pin,
        sync::{Arc, Mutex as StdMutex},
        task::{Context as TaskContext, Poll},
    };

    use pipebot_runtime::{Attachment, OutboundFile};

    use super::*;

    /// Cloneable in-memory writer for inspecting console output.
    ///
    /// A trickling buffer accepts one byte per write and returns `Pending` before
    /// each byte, so writers interleave unless something serializes them.
    #[derive(Clone, Default)]
    pub(crate) struct SharedBuffer {
        bytes: Arc<StdMutex<Vec<u8>>>,
        trickle: bool,
        yielded: bool,
    }

    impl SharedBuffer {
        pub(crate) fn trickling() -> Self {
            Self {
                trickle: true,
                ..Self::default()
            }
        }

        pub(crate) fn contents(&self) -> String {
            String::from_utf8_lossy(&self.bytes.lock().expect("buffer lock")).into_owned()
        }
    }

    impl AsyncWrite for SharedBuffer {
        fn poll_write(
            mut self: Pin<&mut Self>,
            cx: &mut TaskContext<'_>,
            bytes: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            let accepted = if self.trickle {
                if !self.yielded {
                    self.yielded = true;
                    cx.waker().wake_by_ref();
                    return Poll::Pending;
                }
                self.yielded = false;
                bytes.len().min(1)
            } else {
                bytes.len()
            };
            self.bytes
                .lock()
                .expect("buffer lock")
                .extend_from_slice(&bytes[..accepted]);
            Poll::Ready(Ok(accepted))
        }

        fn poll_flush(
            self: Pin<&mut Self>,
            _cx: &mut TaskContext<'_>,
        ) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(
            self: Pin<&mut Self>,
            _cx: &mut TaskContext<'_>,
        ) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn functional_reply_prints_text_and_copies_files() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let output_dir = tempdir.path().join("out");
        std::fs::create_dir_all(&output_dir).expect("output dir");
        let source = tempdir.path().join("source.txt");
        std::fs::write(&source, "payload").expect("source");

        let buffer = SharedBuffer::default();
        let platform =
            ConsolePlatform::new(PlatformLimits::default(), Some(output_dir.clone()), buffer.clone());
        platform
            .create_message(
                "console",
                ResponsePayload {
                    content: "done".to_string(),
                    files: vec![OutboundFile {
                        file_name: "result.txt".to_string(),
                        path: source,
                        size_bytes: 7,
                    }],
                    reply_to: Some("m1".to_string()),
                    ..ResponsePayload::default()
                },
            )
            .await
            .expect("create");

        let printed = buffer.contents();
        assert!(printed.starts_with("[reply to m1]\ndone\n[file] result.txt (7 bytes) -> "));
        assert_eq!(
            std::fs::read_to_string(output_dir.join("result.txt")).expect("copied"),
            "payload"
        );
    }

    #[tokio::test]
    async fn functional_attachments_are_imported_from_local_paths() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let source = tempdir.path().join("photo.png");
        std::fs::write(&source, [1_u8, 2, 3]).expect("source");
        let store = TempFileStore::open(&tempdir.path().join("chains"), "c1")
            .await
            .expect("store");

        let platform = ConsolePlatform::new(PlatformLimits::default(), None, SharedBuffer::default());
        let message = IncomingMessage {
            message_id: "m1".to_string(),
            attachments: vec![Attachment {
                id: "a1".to_string(),
                file_name: "photo.png".to_string(),
                url: source.display().to_string(),
                size_bytes: 3,
            }],
            ..IncomingMessage::default()
        };
        let files = platform
            .download_attachments(&message, &store)
            .await
            .expect("download");
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].read().await.expect("read"), vec![1, 2, 3]);
        assert!(store.release_all().await.is_balanced());
    }

    #[tokio::test]
    async fn unit_deferral_marks_ephemeral_replies() {
        let buffer = SharedBuffer::default();
        let platform = ConsolePlatform::new(PlatformLimits::default(), None, buffer.clone());
        let message = IncomingMessage {
            message_id: "m7".to_string(),
            ..IncomingMessage::default()
        };
        platform.defer_reply(&message, true).await.expect("defer");
        assert_eq!(buffer.contents(), "[m7] pipebot is thinking... (only you)\n");
    }

    #[tokio::test]
    async fn regression_concurrent_replies_print_whole_blocks() {
        let buffer = SharedBuffer::trickling();
        let platform = ConsolePlatform::new(PlatformLimits::default(), None, buffer.clone());
        let first = IncomingMessage {
            message_id: "m1".to_string(),
            ..IncomingMessage::default()
        };
        let second = IncomingMessage {
            message_id: "m2".to_string(),
            ..IncomingMessage::default()
        };

        let (first_result, second_result) = tokio::join!(
            platform.defer_reply(&first, false),
            platform.defer_reply(&second, true)
        );
        first_result.expect("first defer");
        second_result.expect("second defer");

        let first_block = "[m1] pipebot is thinking...\n";
        let second_block = "[m2] pipebot is thinking... (only you)\n";
        let printed = buffer.contents();
        assert!(
            printed == format!("{first_block}{second_block}")
                || printed == format!("{second_block}{first_block}"),
            "{printed:?}"
        );
    }
}
