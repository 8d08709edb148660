use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
};

use anyhow::Result;
use async_trait::async_trait;
use pipebot_command::GrammarConfig;
use pipebot_core::{FileHandle, TempFileStore};
use pipebot_runtime::{
    Attachment, ChainReport, ChainRuntime, ChainRuntimeConfig, ChainState, CommandTemplate,
    IgnoreReason, InMemoryCommandStore, IncomingMessage, MessagingPlatform, PlatformLimits,
    ReplyKind, ResponsePayload,
};
use pipebot_tasks::builtin_registry;

#[derive(Debug, Clone, PartialEq, Eq)]
enum PlatformCall {
    Typing,
    StopTyping,
    Create(ResponsePayload),
    Defer { ephemeral: bool },
    Reply(ResponsePayload),
}

/// Records every platform call; attachment urls double as file contents.
struct ScriptedPlatform {
    limits: PlatformLimits,
    calls: Mutex<Vec<PlatformCall>>,
    sent_files: Mutex<Vec<PathBuf>>,
}

impl ScriptedPlatform {
    fn new(limits: PlatformLimits) -> Self {
        Self {
            limits,
            calls: Mutex::new(Vec::new()),
            sent_files: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<PlatformCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn record(&self, call: PlatformCall) {
        self.calls.lock().expect("calls lock").push(call);
    }

    fn remember_files(&self, payload: &ResponsePayload) {
        for file in &payload.files {
            assert!(file.path.exists(), "{} must exist at send time", file.file_name);
            self.sent_files
                .lock()
                .expect("files lock")
                .push(file.path.clone());
        }
    }

    fn sent_reply(&self) -> Option<ResponsePayload> {
        self.calls().into_iter().find_map(|call| match call {
            PlatformCall::Create(payload) | PlatformCall::Reply(payload) => Some(payload),
            _ => None,
        })
    }
}

#[async_trait]
impl MessagingPlatform for ScriptedPlatform {
    fn limits(&self) -> PlatformLimits {
        self.limits
    }

    async fn send_typing(&self, _channel_id: &str) -> Result<()> {
        self.record(PlatformCall::Typing);
        Ok(())
    }

    async fn stop_typing(&self, _channel_id: &str) -> Result<()> {
        self.record(PlatformCall::StopTyping);
        Ok(())
    }

    async fn create_message(&self, _channel_id: &str, payload: ResponsePayload) -> Result<()> {
        self.remember_files(&payload);
        self.record(PlatformCall::Create(payload));
        Ok(())
    }

    async fn defer_reply(&self, _message: &IncomingMessage, ephemeral: bool) -> Result<()> {
        self.record(PlatformCall::Defer { ephemeral });
        Ok(())
    }

    async fn reply(&self, _message: &IncomingMessage, payload: ResponsePayload) -> Result<()> {
        self.remember_files(&payload);
        self.record(PlatformCall::Reply(payload));
        Ok(())
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
                    .write(&attachment.file_name, attachment.url.as_bytes())
                    .await?,
            );
        }
        Ok(files)
    }
}

struct Fixture {
    _tempdir: tempfile::TempDir,
    platform: Arc<ScriptedPlatform>,
    runtime: ChainRuntime,
}

impl Fixture {
    fn new() -> Self {
        Self::with(PlatformLimits::default(), InMemoryCommandStore::new())
    }

    fn with(limits: PlatformLimits, store: InMemoryCommandStore) -> Self {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let platform = Arc::new(ScriptedPlatform::new(limits));
        let config = ChainRuntimeConfig {
            temp_root: tempdir.path().join("chains"),
            ..ChainRuntimeConfig::default()
        };
        let registry =
            builtin_registry(GrammarConfig::default(), Vec::new()).expect("builtin registry");
        let runtime = ChainRuntime::new(
            config,
            Arc::new(registry),
            platform.clone(),
            Arc::new(store),
        );
        Self {
            _tempdir: tempdir,
            platform,
            runtime,
        }
    }

    async fn send(&self, content: &str) -> ChainReport {
        self.send_message(message(content)).await
    }

    async fn send_message(&self, message: IncomingMessage) -> ChainReport {
        let report = self.runtime.handle_message(&message).await;
        assert_eq!(
            report.cleanup.created, report.cleanup.released,
            "every temp file is released: {report:?}"
        );
        assert_eq!(report.cleanup.failed, 0);
        report
    }

    fn reply_text(&self) -> String {
        self.platform
            .sent_reply()
            .map(|payload| payload.content)
            .unwrap_or_default()
    }
}

fn message(content: &str) -> IncomingMessage {
    IncomingMessage {
        message_id: "m1".to_string(),
        channel_id: "c1".to_string(),
        author_id: "u1".to_string(),
        content: content.to_string(),
        ..IncomingMessage::default()
    }
}

fn attachment(file_name: &str, contents: &str) -> Attachment {
    Attachment {
        id: format!("a-{file_name}"),
        file_name: file_name.to_string(),
        url: contents.to_string(),
        size_bytes: contents.len() as u64,
    }
}

#[tokio::test]
async fn integration_text_chain_pipes_each_output_forward() {
    let fixture = Fixture::new();
    let report = fixture.send("%echo hello world %upper %reverse").await;

    assert!(report.is_completed(), "{report:?}");
    assert_eq!(report.commands, vec!["echo", "upper", "reverse"]);
    assert_eq!(report.steps_run, 3);
    assert_eq!(report.reply, ReplyKind::Message);

    let calls = fixture.platform.calls();
    assert_eq!(calls[0], PlatformCall::Typing);
    assert_eq!(calls[1], PlatformCall::StopTyping);
    let PlatformCall::Create(payload) = &calls[2] else {
        panic!("expected a created message, got {calls:?}");
    };
    assert_eq!(payload.content, "DLROW OLLEH");
    assert_eq!(payload.reply_to.as_deref(), Some("m1"));
    assert!(payload.suppress_embeds);
    assert!(!payload.ephemeral);
}

#[tokio::test]
async fn integration_explicit_text_wins_over_piped_value() {
    let fixture = Fixture::new();
    let report = fixture.send("%echo ignored %upper shout %repeat -times 3 -separator ,").await;
    assert!(report.is_completed(), "{report:?}");
    assert_eq!(fixture.reply_text(), "SHOUT,SHOUT,SHOUT");
}

#[tokio::test]
async fn integration_incompatible_chain_is_rejected_before_any_step_runs() {
    let fixture = Fixture::new();
    let report = fixture.send("%echo hi %hash").await;

    assert_eq!(report.state, ChainState::Failed);
    assert_eq!(report.steps_run, 0);
    let failure = report.failure.expect("failure");
    assert_eq!(failure.reason_code, "incompatible_chain");
    assert_eq!(
        failure.message,
        "Cannot chain `%echo` into `%hash`: `%echo` outputs text but `%hash` expects files."
    );
    assert_eq!(report.cleanup.created, 0);
    assert!(!fixture.platform.calls().contains(&PlatformCall::Typing));
}

#[tokio::test]
async fn integration_require_input_command_first_without_attachment_is_rejected() {
    let fixture = Fixture::new();
    let report = fixture.send("%hash").await;

    let failure = report.failure.expect("failure");
    assert_eq!(failure.reason_code, "input_required");
    assert_eq!(
        fixture.reply_text(),
        "`%hash` needs input. Attach a file or chain it after another command."
    );
}

#[tokio::test]
async fn integration_attachments_seed_a_files_chain() {
    let fixture = Fixture::new();
    let mut incoming = message("%hash");
    incoming.attachments = vec![attachment("abc.txt", "abc")];
    let report = fixture.send_message(incoming).await;

    assert!(report.is_completed(), "{report:?}");
    assert_eq!(report.cleanup.created, 1);
    assert_eq!(
        fixture.reply_text(),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad  abc.txt"
    );
}

#[tokio::test]
async fn integration_file_outputs_are_sent_then_released() {
    let fixture = Fixture::new();
    let report = fixture
        .send("%write hello -name note.txt %duplicate -count 2")
        .await;

    assert!(report.is_completed(), "{report:?}");
    let payload = fixture.platform.sent_reply().expect("reply");
    let names = payload
        .files
        .iter()
        .map(|file| file.file_name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["1-note.txt", "2-note.txt"]);
    assert_eq!(payload.content, "");
    assert_eq!(report.cleanup.created, 3);

    let sent = fixture.platform.sent_files.lock().expect("files lock").clone();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|path| !path.exists()), "released after send");
}

#[tokio::test]
async fn integration_textless_last_command_drops_earlier_text() {
    let fixture = Fixture::new();
    let report = fixture.send("%echo secret %write").await;

    assert!(report.is_completed(), "{report:?}");
    let payload = fixture.platform.sent_reply().expect("reply");
    assert_eq!(payload.content, "");
    assert_eq!(payload.files.len(), 1);
    assert_eq!(payload.files[0].file_name, "output.txt");
}

#[tokio::test]
async fn integration_text_survives_a_file_round_trip() {
    let fixture = Fixture::new();
    let report = fixture.send("%write round trip %cat").await;
    assert!(report.is_completed(), "{report:?}");
    assert_eq!(fixture.reply_text(), "round trip");
}

#[tokio::test]
async fn integration_templates_expand_with_scope_fallback() {
    let store = InMemoryCommandStore::new()
        .with_template(CommandTemplate {
            name: "shout".to_string(),
            scope_id: None,
            body: "%echo {input} %upper".to_string(),
        })
        .with_template(CommandTemplate {
            name: "shout".to_string(),
            scope_id: Some("g1".to_string()),
            body: "%echo {input} %reverse".to_string(),
        });
    let fixture = Fixture::with(PlatformLimits::default(), store);

    let report = fixture.send("%shout hey").await;
    assert!(report.is_completed(), "{report:?}");
    assert_eq!(report.commands, vec!["echo", "upper"]);
    assert_eq!(fixture.reply_text(), "HEY");

    let fixture_in_guild = Fixture::with(
        PlatformLimits::default(),
        InMemoryCommandStore::new().with_template(CommandTemplate {
            name: "shout".to_string(),
            scope_id: Some("g1".to_string()),
            body: "%echo {input} %reverse".to_string(),
        }),
    );
    let mut incoming = message("%shout hey");
    incoming.guild_id = Some("g1".to_string());
    let report = fixture_in_guild.send_message(incoming).await;
    assert!(report.is_completed(), "{report:?}");
    assert_eq!(fixture_in_guild.reply_text(), "yeh");
}

#[tokio::test]
async fn integration_banned_authors_are_ignored_silently() {
    let fixture = Fixture::with(
        PlatformLimits::default(),
        InMemoryCommandStore::new().with_banned_user("u1"),
    );
    let report = fixture.send("%echo hi").await;

    assert_eq!(report.ignored, Some(IgnoreReason::Banned));
    assert_eq!(report.reply, ReplyKind::None);
    assert!(fixture.platform.calls().is_empty());
}

#[tokio::test]
async fn integration_plain_text_and_bare_prefix_are_ignored() {
    let fixture = Fixture::new();
    for content in ["just chatting", "%", "100% sure", "%%"] {
        let report = fixture.send(content).await;
        assert_eq!(report.ignored, Some(IgnoreReason::NoCommands), "{content}");
    }
    assert!(fixture.platform.calls().is_empty());
}

#[tokio::test]
async fn integration_unknown_command_names_the_prefix() {
    let fixture = Fixture::new();
    let report = fixture.send("%echo hi %nope").await;

    assert_eq!(report.failure.expect("failure").reason_code, "command_not_found");
    assert_eq!(
        fixture.reply_text(),
        "Command `%nope` not found. Use `%help` to list commands."
    );
}

#[tokio::test]
async fn integration_deferred_commands_acknowledge_then_reply() {
    let fixture = Fixture::new();
    let report = fixture.send("%echo hi %delay -ms 5").await;

    assert!(report.is_completed(), "{report:?}");
    assert_eq!(report.reply, ReplyKind::Deferred);
    let calls = fixture.platform.calls();
    assert_eq!(calls[0], PlatformCall::Defer { ephemeral: false });
    assert!(!calls.contains(&PlatformCall::Typing));
    let PlatformCall::Reply(payload) = &calls[1] else {
        panic!("expected a deferred reply, got {calls:?}");
    };
    assert_eq!(payload.content, "hi\n(waited 5ms)");
    assert_eq!(payload.reply_to, None);
}

#[tokio::test]
async fn integration_guild_only_command_rejected_in_direct_messages() {
    let fixture = Fixture::new();
    let report = fixture.send("%guild").await;
    assert_eq!(report.failure.expect("failure").reason_code, "wrong_environment");
    assert_eq!(fixture.reply_text(), "`%guild` can only be used in a server.");

    let fixture = Fixture::new();
    let mut incoming = message("%guild");
    incoming.guild_id = Some("g7".to_string());
    let report = fixture.send_message(incoming).await;
    assert!(report.is_completed(), "{report:?}");
    assert_eq!(fixture.reply_text(), "This server's id is g7.");
}

#[tokio::test]
async fn integration_task_errors_reach_the_user_verbatim() {
    let fixture = Fixture::new();
    let report = fixture.send("%echo 5 %repeat -times 0").await;

    assert_eq!(report.failure.expect("failure").reason_code, "task_failed");
    assert_eq!(report.steps_run, 1);
    assert!(fixture.reply_text().contains("`times`"));
}

#[tokio::test]
async fn integration_platform_limits_reject_oversized_replies() {
    let limits = PlatformLimits {
        max_message_content_length: 5,
        ..PlatformLimits::default()
    };
    let fixture = Fixture::with(limits, InMemoryCommandStore::new());
    let report = fixture.send("%echo far too long").await;

    let failure = report.failure.expect("failure");
    assert_eq!(failure.reason_code, "message_too_long");
    assert_eq!(
        fixture.reply_text(),
        "The response is too long to send (12 characters, max 5)."
    );
}

#[tokio::test]
async fn integration_report_serializes_for_diagnostics() {
    let fixture = Fixture::new();
    let report = fixture.send("%echo hi %length").await;
    assert_eq!(fixture.reply_text(), "2");

    let rendered = serde_json::to_value(&report).expect("json");
    assert_eq!(rendered["state"], "completed");
    assert_eq!(rendered["reply"], "message");
    assert_eq!(rendered["commands"], serde_json::json!(["echo", "length"]));
    assert!(rendered["chain_id"]
        .as_str()
        .is_some_and(|id| id.starts_with("chain-")));
}
