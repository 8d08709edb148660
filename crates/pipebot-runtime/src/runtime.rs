//! Per-message chain orchestration: parse, resolve, validate, execute, reply,
//! and release.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use pipebot_command::{
    CommandConfig, CommandRegistry, RawCommand, RawCommandParser, TaskData, TypeTag,
};
use pipebot_core::{current_unix_timestamp_ms, CleanupReport, TempFileStore};
use serde::Serialize;
use tracing::instrument;

use crate::{
    cancellation::CooperativeCancellationToken,
    config::ChainRuntimeConfig,
    error::{render_user_error, ExecutionError},
    executor::{ChainEnvironment, ChainExecutor, ChainState},
    platform::{IncomingMessage, MessagingPlatform, ResponsePayload},
    resolver::{bind_steps, CommandResolver},
    response::ResponseAssembler,
    store::CommandStore,
};

static CHAIN_SEQUENCE: AtomicU64 = AtomicU64::new(0);

const ATTACHMENT_DOWNLOAD: &str = "attachment download";

fn next_chain_id() -> String {
    format!(
        "chain-{}-{}",
        current_unix_timestamp_ms(),
        CHAIN_SEQUENCE.fetch_add(1, Ordering::Relaxed)
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    NoCommands,
    Banned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
/// How the chain's reply reached the platform.
pub enum ReplyKind {
    None,
    Message,
    Deferred,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupCounts {
    pub created: usize,
    pub released: usize,
    pub failed: usize,
}

impl From<CleanupReport> for CleanupCounts {
    fn from(report: CleanupReport) -> Self {
        Self {
            created: report.created,
            released: report.released,
            failed: report.failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainFailure {
    pub reason_code: &'static str,
    /// Text that was shown to the user.
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
/// Outcome of handling one incoming message.
pub struct ChainReport {
    pub chain_id: String,
    pub state: ChainState,
    pub commands: Vec<String>,
    pub steps_run: usize,
    pub reply: ReplyKind,
    pub ignored: Option<IgnoreReason>,
    pub failure: Option<ChainFailure>,
    pub cleanup: CleanupCounts,
}

impl ChainReport {
    fn new(chain_id: String, raws: &[RawCommand]) -> Self {
        Self {
            chain_id,
            state: ChainState::Parsed,
            commands: raws.iter().map(|raw| raw.name.clone()).collect(),
            steps_run: 0,
            reply: ReplyKind::None,
            ignored: None,
            failure: None,
            cleanup: CleanupCounts::default(),
        }
    }

    fn transition(&mut self, state: ChainState) {
        tracing::debug!(
            chain_id = %self.chain_id,
            from = ?self.state,
            to = ?state,
            "chain state transition"
        );
        self.state = state;
    }

    pub fn is_completed(&self) -> bool {
        self.state == ChainState::Completed
    }
}

pub struct ChainRuntime {
    config: ChainRuntimeConfig,
    parser: RawCommandParser,
    registry: Arc<CommandRegistry>,
    executor: ChainExecutor,
    assembler: ResponseAssembler,
    platform: Arc<dyn MessagingPlatform>,
    store: Arc<dyn CommandStore>,
    cancellation: CooperativeCancellationToken,
}

impl ChainRuntime {
    pub fn new(
        config: ChainRuntimeConfig,
        registry: Arc<CommandRegistry>,
        platform: Arc<dyn MessagingPlatform>,
        store: Arc<dyn CommandStore>,
    ) -> Self {
        let executor = ChainExecutor::new(
            Arc::clone(&registry),
            config.grammar,
            config.max_chain_length,
            config.step_timeout_ms,
        );
        Self {
            parser: RawCommandParser::new(config.grammar),
            assembler: ResponseAssembler::new(platform.limits()),
            config,
            registry,
            executor,
            platform,
            store,
            cancellation: CooperativeCancellationToken::new(),
        }
    }

    pub fn with_cancellation_token(mut self, token: CooperativeCancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Token that aborts every in-flight chain when cancelled.
    pub fn cancellation_token(&self) -> CooperativeCancellationToken {
        self.cancellation.clone()
    }

    pub fn config(&self) -> &ChainRuntimeConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    /// Handles one message end to end. Never fails: every error is turned into
    /// a reply and recorded in the returned report.
    #[instrument(
        name = "chain",
        skip_all,
        fields(message_id = %message.message_id, channel_id = %message.channel_id)
    )]
    pub async fn handle_message(&self, message: &IncomingMessage) -> ChainReport {
        let raws = self.parser.parse(&message.content).collect::<Vec<_>>();
        let mut report = ChainReport::new(next_chain_id(), &raws);
        if raws.is_empty() {
            report.ignored = Some(IgnoreReason::NoCommands);
            return report;
        }

        match self
            .store
            .is_banned(&message.author_id, message.guild_id.as_deref())
            .await
        {
            Ok(true) => {
                tracing::info!(
                    author_id = %message.author_id,
                    guild_id = ?message.guild_id,
                    "ignoring message from banned author or guild"
                );
                report.ignored = Some(IgnoreReason::Banned);
                return report;
            }
            Ok(false) => {}
            Err(error) => {
                self.fail(&mut report, message, &ExecutionError::Store(error), false)
                    .await;
                return report;
            }
        }

        let chain = match self.prepare(raws, message, &mut report).await {
            Ok(chain) => chain,
            Err(error) => {
                self.fail(&mut report, message, &error, false).await;
                return report;
            }
        };

        let files = match TempFileStore::open(&self.config.temp_root, &report.chain_id).await {
            Ok(files) => files,
            Err(error) => {
                self.fail(&mut report, message, &ExecutionError::Storage(error), false)
                    .await;
                return report;
            }
        };
        self.run_chain(chain, message, &files, &mut report).await;

        let cleanup = files.release_all().await;
        if !cleanup.is_balanced() {
            tracing::warn!(
                chain_id = %report.chain_id,
                created = cleanup.created,
                released = cleanup.released,
                failed = cleanup.failed,
                "chain cleanup left files behind"
            );
        }
        report.cleanup = cleanup.into();
        tracing::info!(
            chain_id = %report.chain_id,
            state = ?report.state,
            steps_run = report.steps_run,
            "chain finished"
        );
        report
    }

    async fn prepare(
        &self,
        raws: Vec<RawCommand>,
        message: &IncomingMessage,
        report: &mut ChainReport,
    ) -> Result<Vec<CommandConfig>, ExecutionError> {
        let resolver = CommandResolver::new(
            &self.registry,
            self.store.as_ref(),
            self.parser,
            self.config.max_template_commands,
        );
        let steps = resolver.resolve_all(raws, message).await?;
        report.commands = steps
            .iter()
            .map(|step| step.command.name().to_string())
            .collect();
        report.transition(ChainState::Resolved);

        let chain = bind_steps(&steps)?;
        let seed = attachments_seed(&chain, message).then_some(TypeTag::Files);
        self.executor.validate(&chain, seed)?;
        report.transition(ChainState::Validated);
        Ok(chain)
    }

    async fn run_chain(
        &self,
        chain: Vec<CommandConfig>,
        message: &IncomingMessage,
        files: &TempFileStore,
        report: &mut ChainReport,
    ) {
        let defer = chain.iter().any(|config| config.definition().defer_reply);
        let ephemeral = chain.iter().any(|config| config.definition().ephemeral_reply);
        let download = attachments_seed(&chain, message);
        let environment = ChainEnvironment {
            chain_id: report.chain_id.clone(),
            guild_id: message.guild_id.clone(),
            author_id: message.author_id.clone(),
            files: files.clone(),
            cancellation: Some(self.cancellation.clone()),
        };

        if !defer {
            if let Err(error) = self.platform.send_typing(&message.channel_id).await {
                tracing::warn!(error = %error, "failed to send typing indicator");
            }
        }
        report.transition(ChainState::Executing);

        let mut steps_run = 0;
        let acknowledge = async {
            if defer {
                Some(self.platform.defer_reply(message, ephemeral).await)
            } else {
                None
            }
        };
        let work = async {
            let seed = if download {
                self.download_seed(message, files).await?
            } else {
                TaskData::Empty
            };
            self.executor
                .execute(chain, seed, &environment, &mut steps_run)
                .await
        };
        let (acknowledged, outcome) = tokio::join!(acknowledge, work);
        report.steps_run = steps_run;

        let deferred = match acknowledged {
            Some(Ok(())) => true,
            Some(Err(error)) => {
                tracing::warn!(error = %error, "deferred acknowledgement failed");
                false
            }
            None => false,
        };
        if !defer {
            if let Err(error) = self.platform.stop_typing(&message.channel_id).await {
                tracing::warn!(error = %error, "failed to stop typing indicator");
            }
        }

        let payload = match outcome {
            Ok(output) => {
                let reply_to = (!deferred).then(|| message.message_id.clone());
                self.assembler
                    .assemble(output, reply_to, ephemeral && deferred)
                    .await
            }
            Err(error) => Err(error),
        };
        let payload = match payload {
            Ok(payload) => payload,
            Err(error) => {
                self.fail(report, message, &error, deferred).await;
                return;
            }
        };

        match self.dispatch(message, payload, deferred).await {
            Ok(reply) => {
                report.reply = reply;
                report.transition(ChainState::Completed);
            }
            Err(error) => {
                self.fail(report, message, &ExecutionError::Platform(error), deferred)
                    .await;
            }
        }
    }

    /// Downloads the message attachments under the runtime's cancellation token
    /// and the per-step timeout.
    async fn download_seed(
        &self,
        message: &IncomingMessage,
        files: &TempFileStore,
    ) -> Result<TaskData, ExecutionError> {
        if self.cancellation.is_cancelled() {
            return Err(ExecutionError::Cancelled);
        }
        let bounded = async {
            let download = self.platform.download_attachments(message, files);
            let downloaded = match self.config.step_timeout_ms {
                Some(timeout_ms) => {
                    tokio::time::timeout(Duration::from_millis(timeout_ms), download)
                        .await
                        .map_err(|_| ExecutionError::StepTimeout {
                            command: ATTACHMENT_DOWNLOAD.to_string(),
                            timeout_ms,
                        })?
                }
                None => download.await,
            };
            downloaded.map_err(ExecutionError::Platform)
        };
        tokio::select! {
            _ = self.cancellation.cancelled() => Err(ExecutionError::Cancelled),
            attachments = bounded => attachments.map(TaskData::Files),
        }
    }

    async fn dispatch(
        &self,
        message: &IncomingMessage,
        payload: ResponsePayload,
        deferred: bool,
    ) -> anyhow::Result<ReplyKind> {
        if deferred {
            self.platform.reply(message, payload).await?;
            Ok(ReplyKind::Deferred)
        } else {
            self.platform
                .create_message(&message.channel_id, payload)
                .await?;
            Ok(ReplyKind::Message)
        }
    }

    /// Records `error` and sends its user-facing rendering as the reply.
    async fn fail(
        &self,
        report: &mut ChainReport,
        message: &IncomingMessage,
        error: &ExecutionError,
        deferred: bool,
    ) {
        let text = render_user_error(error, self.config.grammar.prefix);
        if error.is_user_error() {
            tracing::info!(
                chain_id = %report.chain_id,
                reason = error.reason_code(),
                "chain rejected"
            );
        } else {
            tracing::warn!(
                chain_id = %report.chain_id,
                reason = error.reason_code(),
                error = %error,
                "chain failed"
            );
        }
        report.transition(ChainState::Failed);
        report.failure = Some(ChainFailure {
            reason_code: error.reason_code(),
            message: text.clone(),
        });

        let payload = ResponsePayload {
            content: text,
            reply_to: (!deferred).then(|| message.message_id.clone()),
            ..ResponsePayload::default()
        };
        match self.dispatch(message, payload, deferred).await {
            Ok(reply) => report.reply = reply,
            Err(dispatch_error) => {
                tracing::warn!(
                    chain_id = %report.chain_id,
                    error = %dispatch_error,
                    "failed to deliver error reply"
                );
            }
        }
    }
}

/// Whether the message attachments seed the chain's first step.
fn attachments_seed(chain: &[CommandConfig], message: &IncomingMessage) -> bool {
    !message.attachments.is_empty()
        && chain
            .first()
            .is_some_and(|config| config.definition().input_type == TypeTag::Files)
}
