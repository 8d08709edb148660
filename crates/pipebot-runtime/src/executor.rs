//! Sequential chain execution.

use std::{panic::AssertUnwindSafe, sync::Arc, time::Duration};

use futures_util::FutureExt;
use pipebot_command::{
    typed_form, validate_chain, CommandConfig, CommandError, CommandRegistry, GrammarConfig,
    TaskContext, TaskData, TaskOutput, TextMode, TypeTag,
};
use pipebot_core::TempFileStore;
use serde::Serialize;

use crate::{cancellation::CooperativeCancellationToken, error::ExecutionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
/// Lifecycle of one chain. `Completed` and `Failed` are terminal.
pub enum ChainState {
    Parsed,
    Resolved,
    Validated,
    Executing,
    Completed,
    Failed,
}

impl ChainState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Per-chain environment shared by every step.
#[derive(Debug, Clone)]
pub struct ChainEnvironment {
    pub chain_id: String,
    pub guild_id: Option<String>,
    pub author_id: String,
    pub files: TempFileStore,
    pub cancellation: Option<CooperativeCancellationToken>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Reply-relevant part of one finished step.
pub struct StepSummary {
    pub command: String,
    pub text: Option<String>,
    pub text_mode: TextMode,
    pub suppress_embeds: bool,
    pub elapsed_ms: u64,
}

#[derive(Debug)]
/// Everything a completed chain hands to the response assembler.
pub struct ChainOutput {
    pub steps: Vec<StepSummary>,
    /// Output of the final step.
    pub data: TaskData,
}

pub struct ChainExecutor {
    registry: Arc<CommandRegistry>,
    grammar: GrammarConfig,
    max_chain_length: usize,
    step_timeout: Option<Duration>,
}

impl ChainExecutor {
    pub fn new(
        registry: Arc<CommandRegistry>,
        grammar: GrammarConfig,
        max_chain_length: usize,
        step_timeout_ms: Option<u64>,
    ) -> Self {
        Self {
            registry,
            grammar,
            max_chain_length,
            step_timeout: step_timeout_ms.map(Duration::from_millis),
        }
    }

    /// Type-checks `chain` against the data it will start from.
    pub fn validate(
        &self,
        chain: &[CommandConfig],
        seed: Option<TypeTag>,
    ) -> Result<(), ExecutionError> {
        validate_chain(chain, seed, self.max_chain_length)?;
        Ok(())
    }

    /// Runs `chain` step by step, feeding each output into the next step.
    ///
    /// The chain is validated first; a rejected chain runs nothing. The first
    /// failing step aborts the chain. `steps_completed` is advanced after every
    /// successful step so callers can report progress of failed chains.
    pub async fn execute(
        &self,
        chain: Vec<CommandConfig>,
        seed: TaskData,
        environment: &ChainEnvironment,
        steps_completed: &mut usize,
    ) -> Result<ChainOutput, ExecutionError> {
        let seed_type = match seed.type_tag() {
            TypeTag::Empty => None,
            tag => Some(tag),
        };
        self.validate(&chain, seed_type)?;

        let mut data = seed;
        let mut steps = Vec::with_capacity(chain.len());
        for (index, config) in chain.into_iter().enumerate() {
            if environment
                .cancellation
                .as_ref()
                .is_some_and(CooperativeCancellationToken::is_cancelled)
            {
                return Err(ExecutionError::Cancelled);
            }

            let definition = Arc::clone(&config.command.definition);
            let mut arguments = config.arguments;
            if index > 0 && definition.input_type.is_value() {
                if let TaskData::Value(piped) = &data {
                    arguments.apply_piped_value(&definition, piped)?;
                }
            }
            if let Some(spec) = definition.default_argument_spec() {
                if spec.required && arguments.get(&spec.key).is_none() {
                    return Err(CommandError::MissingArgument {
                        command: definition.name.clone(),
                        key: spec.key.clone(),
                    }
                    .into());
                }
            }

            let input = std::mem::replace(&mut data, TaskData::Empty);
            if definition.require_input && input.type_tag() != definition.input_type {
                return Err(CommandError::InputRequired {
                    command: definition.name.clone(),
                }
                .into());
            }

            tracing::debug!(
                chain_id = %environment.chain_id,
                step = index,
                invocation = %typed_form(
                    self.grammar,
                    &definition,
                    config.entity_id.as_deref(),
                    &arguments
                ),
                input = %input.type_tag(),
                "running chain step"
            );
            let context = TaskContext {
                chain_id: environment.chain_id.clone(),
                definition: Arc::clone(&definition),
                guild_id: environment.guild_id.clone(),
                author_id: environment.author_id.clone(),
                files: environment.files.clone(),
                registry: Arc::clone(&self.registry),
            };
            let started = tokio::time::Instant::now();
            let output = self
                .run_step(
                    &definition.name,
                    config.command.task.run(context, arguments, input),
                    environment.cancellation.as_ref(),
                )
                .await?;

            let actual = output.data.type_tag();
            if actual != definition.output_type {
                return Err(ExecutionError::OutputTypeMismatch {
                    command: definition.name.clone(),
                    actual,
                    declared: definition.output_type,
                });
            }

            steps.push(StepSummary {
                command: definition.name.clone(),
                text: output.response_text(),
                text_mode: output.text_mode,
                suppress_embeds: output.suppress_embeds,
                elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            });
            data = output.data;
            *steps_completed += 1;
        }

        Ok(ChainOutput { steps, data })
    }

    async fn run_step<F>(
        &self,
        command: &str,
        task: F,
        cancellation: Option<&CooperativeCancellationToken>,
    ) -> Result<TaskOutput, ExecutionError>
    where
        F: std::future::Future<Output = anyhow::Result<TaskOutput>>,
    {
        let guarded = async {
            let caught = AssertUnwindSafe(task).catch_unwind();
            let result = match self.step_timeout {
                Some(timeout) => tokio::time::timeout(timeout, caught).await.map_err(|_| {
                    ExecutionError::StepTimeout {
                        command: command.to_string(),
                        timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    }
                })?,
                None => caught.await,
            };
            match result {
                Ok(Ok(output)) => Ok(output),
                Ok(Err(source)) => Err(ExecutionError::Task {
                    command: command.to_string(),
                    source,
                }),
                Err(_) => Err(ExecutionError::Task {
                    command: command.to_string(),
                    source: anyhow::anyhow!("task panicked"),
                }),
            }
        };

        match cancellation {
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => Err(ExecutionError::Cancelled),
                    result = guarded => result,
                }
            }
            None => guarded.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::bail;
    use async_trait::async_trait;
    use pipebot_command::{
        bind_arguments, ArgumentSpec, BoundArguments, CommandDefinition, CommandTask,
        RawCommandParser, RegisteredCommand, Value,
    };

    use super::*;

    #[derive(Default)]
    struct Counters {
        runs: AtomicUsize,
    }

    struct EchoTask(Arc<Counters>);

    #[async_trait]
    impl CommandTask for EchoTask {
        async fn run(
            &self,
            _context: TaskContext,
            arguments: BoundArguments,
            _input: TaskData,
        ) -> anyhow::Result<TaskOutput> {
            self.0.runs.fetch_add(1, Ordering::SeqCst);
            Ok(TaskOutput::text(arguments.text("text").unwrap_or_default()))
        }
    }

    struct UpperTask(Arc<Counters>);

    #[async_trait]
    impl CommandTask for UpperTask {
        async fn run(
            &self,
            _context: TaskContext,
            arguments: BoundArguments,
            _input: TaskData,
        ) -> anyhow::Result<TaskOutput> {
            self.0.runs.fetch_add(1, Ordering::SeqCst);
            Ok(TaskOutput::text(
                arguments.text("text").unwrap_or_default().to_uppercase(),
            ))
        }
    }

    struct WriteTask(Arc<Counters>);

    #[async_trait]
    impl CommandTask for WriteTask {
        async fn run(
            &self,
            context: TaskContext,
            arguments: BoundArguments,
            _input: TaskData,
        ) -> anyhow::Result<TaskOutput> {
            self.0.runs.fetch_add(1, Ordering::SeqCst);
            let text = arguments.text("text").unwrap_or_default().to_string();
            let file = context.files.write("out.txt", text.as_bytes()).await?;
            Ok(TaskOutput::files(vec![file]))
        }
    }

    struct FailTask;

    #[async_trait]
    impl CommandTask for FailTask {
        async fn run(
            &self,
            _context: TaskContext,
            _arguments: BoundArguments,
            _input: TaskData,
        ) -> anyhow::Result<TaskOutput> {
            bail!("fail task exploded")
        }
    }

    struct SleepTask;

    #[async_trait]
    impl CommandTask for SleepTask {
        async fn run(
            &self,
            _context: TaskContext,
            _arguments: BoundArguments,
            _input: TaskData,
        ) -> anyhow::Result<TaskOutput> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(TaskOutput::text("late"))
        }
    }

    struct LiarTask;

    #[async_trait]
    impl CommandTask for LiarTask {
        async fn run(
            &self,
            _context: TaskContext,
            _arguments: BoundArguments,
            _input: TaskData,
        ) -> anyhow::Result<TaskOutput> {
            Ok(TaskOutput::value(Value::Integer(1)))
        }
    }

    struct Fixture {
        registry: Arc<CommandRegistry>,
        counters: Arc<Counters>,
        _tempdir: tempfile::TempDir,
        files: TempFileStore,
    }

    async fn fixture() -> Fixture {
        let counters = Arc::new(Counters::default());
        let text = || ArgumentSpec::required("text", TypeTag::Text);
        let commands = vec![
            RegisteredCommand::new(
                CommandDefinition::new("echo", TypeTag::Empty, TypeTag::Text)
                    .with_default_argument(text()),
                Arc::new(EchoTask(Arc::clone(&counters))),
            ),
            RegisteredCommand::new(
                CommandDefinition::new("upper", TypeTag::Text, TypeTag::Text)
                    .with_default_argument(text()),
                Arc::new(UpperTask(Arc::clone(&counters))),
            ),
            RegisteredCommand::new(
                CommandDefinition::new("write", TypeTag::Text, TypeTag::Files)
                    .with_default_argument(text()),
                Arc::new(WriteTask(Arc::clone(&counters))),
            ),
            RegisteredCommand::new(
                CommandDefinition::new("gif", TypeTag::Files, TypeTag::Files).requiring_input(),
                Arc::new(WriteTask(Arc::clone(&counters))),
            ),
            RegisteredCommand::new(
                CommandDefinition::new("fail", TypeTag::Text, TypeTag::Text),
                Arc::new(FailTask),
            ),
            RegisteredCommand::new(
                CommandDefinition::new("sleep", TypeTag::Empty, TypeTag::Text),
                Arc::new(SleepTask),
            ),
            RegisteredCommand::new(
                CommandDefinition::new("liar", TypeTag::Empty, TypeTag::Text),
                Arc::new(LiarTask),
            ),
        ];
        let tempdir = tempfile::tempdir().expect("tempdir");
        let files = TempFileStore::open(tempdir.path(), "chain-test")
            .await
            .expect("store");
        Fixture {
            registry: Arc::new(CommandRegistry::new(commands).expect("registry")),
            counters,
            _tempdir: tempdir,
            files,
        }
    }

    impl Fixture {
        fn chain(&self, text: &str) -> Vec<CommandConfig> {
            let parser = RawCommandParser::new(GrammarConfig::default());
            parser
                .parse(text)
                .enumerate()
                .map(|(index, raw)| {
                    let command = self.registry.resolve(&raw.name).expect("known").clone();
                    let piped = index > 0 && command.definition.input_type.is_value();
                    let arguments =
                        bind_arguments(&raw, &command.definition, piped).expect("bind");
                    CommandConfig {
                        command,
                        entity_id: raw.entity_id,
                        arguments,
                    }
                })
                .collect()
        }

        fn executor(&self, step_timeout_ms: Option<u64>) -> ChainExecutor {
            ChainExecutor::new(
                Arc::clone(&self.registry),
                GrammarConfig::default(),
                10,
                step_timeout_ms,
            )
        }

        fn environment(&self, cancellation: Option<CooperativeCancellationToken>) -> ChainEnvironment {
            ChainEnvironment {
                chain_id: "chain-test".to_string(),
                guild_id: None,
                author_id: "u1".to_string(),
                files: self.files.clone(),
                cancellation,
            }
        }
    }

    #[tokio::test]
    async fn functional_outputs_pipe_into_default_keys() {
        let fixture = fixture().await;
        let mut completed = 0;
        let output = fixture
            .executor(None)
            .execute(
                fixture.chain("%echo hello %upper"),
                TaskData::Empty,
                &fixture.environment(None),
                &mut completed,
            )
            .await
            .expect("execute");
        assert_eq!(completed, 2);
        assert_eq!(output.data, TaskData::text("HELLO"));
        let texts = output
            .steps
            .iter()
            .map(|step| step.text.as_deref())
            .collect::<Vec<_>>();
        assert_eq!(texts, vec![Some("hello"), Some("HELLO")]);
    }

    #[tokio::test]
    async fn functional_explicit_text_wins_over_piped_value() {
        let fixture = fixture().await;
        let mut completed = 0;
        let output = fixture
            .executor(None)
            .execute(
                fixture.chain("%echo hello %upper typed"),
                TaskData::Empty,
                &fixture.environment(None),
                &mut completed,
            )
            .await
            .expect("execute");
        assert_eq!(output.data, TaskData::text("TYPED"));
    }

    #[tokio::test]
    async fn functional_incompatible_chain_runs_nothing() {
        let fixture = fixture().await;
        let mut completed = 0;
        let error = fixture
            .executor(None)
            .execute(
                fixture.chain("%echo hi %upper %gif"),
                TaskData::Empty,
                &fixture.environment(None),
                &mut completed,
            )
            .await
            .expect_err("incompatible");
        assert_eq!(error.reason_code(), "incompatible_chain");
        assert_eq!(completed, 0);
        assert_eq!(fixture.counters.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn functional_require_input_first_step_without_seed_fails() {
        let fixture = fixture().await;
        let mut completed = 0;
        let error = fixture
            .executor(None)
            .execute(
                fixture.chain("%gif"),
                TaskData::Empty,
                &fixture.environment(None),
                &mut completed,
            )
            .await
            .expect_err("input required");
        assert!(matches!(
            error,
            ExecutionError::Command(CommandError::InputRequired { ref command }) if command == "gif"
        ));
        assert_eq!(fixture.counters.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn functional_files_flow_between_steps() {
        let fixture = fixture().await;
        let mut completed = 0;
        let output = fixture
            .executor(None)
            .execute(
                fixture.chain("%echo data %write %gif"),
                TaskData::Empty,
                &fixture.environment(None),
                &mut completed,
            )
            .await
            .expect("execute");
        assert_eq!(completed, 3);
        assert_eq!(output.data.file_count(), 1);
        let report = fixture.files.release_all().await;
        assert_eq!(report.created, 2);
        assert!(report.is_balanced());
    }

    #[tokio::test]
    async fn functional_first_failure_aborts_remaining_steps() {
        let fixture = fixture().await;
        let mut completed = 0;
        let error = fixture
            .executor(None)
            .execute(
                fixture.chain("%echo hi %fail %upper"),
                TaskData::Empty,
                &fixture.environment(None),
                &mut completed,
            )
            .await
            .expect_err("fail");
        assert!(matches!(error, ExecutionError::Task { ref command, .. } if command == "fail"));
        assert_eq!(completed, 1);
        assert_eq!(fixture.counters.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn functional_step_timeout_is_reported() {
        let fixture = fixture().await;
        let mut completed = 0;
        let error = fixture
            .executor(Some(50))
            .execute(
                fixture.chain("%sleep"),
                TaskData::Empty,
                &fixture.environment(None),
                &mut completed,
            )
            .await
            .expect_err("timeout");
        assert!(matches!(
            error,
            ExecutionError::StepTimeout { timeout_ms: 50, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn regression_step_elapsed_follows_the_monotonic_clock() {
        let fixture = fixture().await;
        let mut completed = 0;
        let output = fixture
            .executor(None)
            .execute(
                fixture.chain("%sleep"),
                TaskData::Empty,
                &fixture.environment(None),
                &mut completed,
            )
            .await
            .expect("sleep completes");
        assert_eq!(output.steps.len(), 1);
        assert_eq!(output.steps[0].elapsed_ms, 30_000);
    }

    #[tokio::test]
    async fn functional_cancellation_stops_running_step() {
        let fixture = fixture().await;
        let token = CooperativeCancellationToken::new();
        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                token.cancel();
            })
        };
        let mut completed = 0;
        let error = fixture
            .executor(None)
            .execute(
                fixture.chain("%sleep"),
                TaskData::Empty,
                &fixture.environment(Some(token.clone())),
                &mut completed,
            )
            .await
            .expect_err("cancelled");
        canceller.await.expect("join");
        assert!(matches!(error, ExecutionError::Cancelled));

        let error = fixture
            .executor(None)
            .execute(
                fixture.chain("%echo hi"),
                TaskData::Empty,
                &fixture.environment(Some(token)),
                &mut completed,
            )
            .await
            .expect_err("already cancelled");
        assert!(matches!(error, ExecutionError::Cancelled));
    }

    #[tokio::test]
    async fn regression_output_type_must_match_declaration() {
        let fixture = fixture().await;
        let mut completed = 0;
        let error = fixture
            .executor(None)
            .execute(
                fixture.chain("%liar"),
                TaskData::Empty,
                &fixture.environment(None),
                &mut completed,
            )
            .await
            .expect_err("mismatch");
        assert!(matches!(
            error,
            ExecutionError::OutputTypeMismatch {
                actual: TypeTag::Integer,
                declared: TypeTag::Text,
                ..
            }
        ));
    }

    #[test]
    fn unit_terminal_states() {
        assert!(ChainState::Completed.is_terminal());
        assert!(ChainState::Failed.is_terminal());
        assert!(!ChainState::Executing.is_terminal());
    }
}
