use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use pipebot_runtime::{
    Attachment, ChainReport, ChainRuntime, CooperativeCancellationToken, IncomingMessage,
};
use pipebot_tasks::builtin_registry;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::{cli_args::Cli, config_file::load_config_file, console_platform::ConsolePlatform};

const CONSOLE_CHANNEL_ID: &str = "console";

/// Builds a message as the console user typed it.
pub(crate) fn console_message(
    cli: &Cli,
    sequence: u64,
    content: &str,
    attachments: &[PathBuf],
) -> Result<IncomingMessage> {
    let attachments = attachments
        .iter()
        .enumerate()
        .map(|(index, path)| attachment_for_path(index, path))
        .collect::<Result<Vec<_>>>()?;
    Ok(IncomingMessage {
        message_id: format!("console-{sequence}"),
        channel_id: CONSOLE_CHANNEL_ID.to_string(),
        guild_id: cli.guild.clone(),
        author_id: cli.author.clone(),
        content: content.to_string(),
        attachments,
    })
}

fn attachment_for_path(index: usize, path: &Path) -> Result<Attachment> {
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("failed to read attachment {}", path.display()))?;
    if !metadata.is_file() {
        bail!("attachment {} is not a file", path.display());
    }
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("attachment-{index}"));
    Ok(Attachment {
        id: format!("attachment-{index}"),
        file_name,
        url: path.display().to_string(),
        size_bytes: metadata.len(),
    })
}

fn print_report(report: &ChainReport) -> Result<()> {
    let rendered =
        serde_json::to_string_pretty(report).context("failed to render chain report")?;
    eprintln!("{rendered}");
    Ok(())
}

pub(crate) async fn run_cli(cli: Cli) -> Result<()> {
    let settings = load_config_file(cli.config.as_deref())?.resolve(&cli);
    if let Some(output_dir) = &cli.output_dir {
        tokio::fs::create_dir_all(output_dir)
            .await
            .with_context(|| format!("failed to create {}", output_dir.display()))?;
    }

    let registry = builtin_registry(settings.runtime.grammar, Vec::new())
        .context("failed to register built-in commands")?;
    let platform =
        ConsolePlatform::new(settings.limits, cli.output_dir.clone(), tokio::io::stdout());
    let runtime = ChainRuntime::new(
        settings.runtime,
        Arc::new(registry),
        Arc::new(platform),
        Arc::new(settings.store),
    );

    let cancellation = runtime.cancellation_token();
    let shutdown = {
        let cancellation = cancellation.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown requested");
                cancellation.cancel();
            }
        })
    };

    let result = match &cli.message {
        Some(content) => run_once(&cli, &runtime, content).await,
        None => run_interactive(&cli, &runtime, &cancellation).await,
    };
    shutdown.abort();
    result
}

async fn run_once(cli: &Cli, runtime: &ChainRuntime, content: &str) -> Result<()> {
    let message = console_message(cli, 1, content, &cli.attach)?;
    let report = runtime.handle_message(&message).await;
    if cli.report {
        print_report(&report)?;
    }
    if let Some(failure) = &report.failure {
        bail!("chain failed: {}", failure.reason_code);
    }
    Ok(())
}

async fn run_interactive(
    cli: &Cli,
    runtime: &ChainRuntime,
    cancellation: &CooperativeCancellationToken,
) -> Result<()> {
    let prefix = runtime.config().grammar.prefix;
    let banner = format!("pipebot ready; type `{prefix}help` for commands, Ctrl-D to quit.\n");
    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(banner.as_bytes())
        .await
        .context("failed to write banner")?;
    stdout.flush().await.context("failed to flush banner")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut sequence = 0_u64;
    loop {
        let line = tokio::select! {
            _ = cancellation.cancelled() => break,
            line = lines.next_line() => line.context("failed to read stdin")?,
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        sequence += 1;
        let message = console_message(cli, sequence, &line, &[])?;
        let report = runtime.handle_message(&message).await;
        if cli.report {
            print_report(&report)?;
        }
        if cancellation.is_cancelled() {
            break;
        }
    }
    Ok(())
}
