use std::path::PathBuf;

use clap::Parser;
use tracing::level_filters::LevelFilter;

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_log_level(value: &str) -> Result<LevelFilter, String> {
    value
        .trim()
        .parse::<LevelFilter>()
        .map_err(|_| format!("unknown log level '{value}' (expected off|error|warn|info|debug|trace)"))
}

#[derive(Debug, Parser)]
#[command(
    name = "pipebot",
    about = "Runs chained chat commands from the console",
    version
)]
pub(crate) struct Cli {
    #[arg(
        long,
        env = "PIPEBOT_CONFIG",
        help = "Optional TOML config file with [grammar], [runtime], [limits], [[templates]] and [bans] sections."
    )]
    pub(crate) config: Option<PathBuf>,

    #[arg(
        long,
        short = 'm',
        help = "Handle a single message and exit. Without it, each stdin line is handled as a message."
    )]
    pub(crate) message: Option<String>,

    #[arg(
        long = "attach",
        value_name = "PATH",
        requires = "message",
        help = "Local file attached to --message. Repeatable."
    )]
    pub(crate) attach: Vec<PathBuf>,

    #[arg(
        long = "output-dir",
        env = "PIPEBOT_OUTPUT_DIR",
        help = "Directory that receives a copy of every file sent in a reply."
    )]
    pub(crate) output_dir: Option<PathBuf>,

    #[arg(long, help = "Guild id to simulate; omit to act as a direct message.")]
    pub(crate) guild: Option<String>,

    #[arg(long, default_value = "console-user", help = "Author id of console messages.")]
    pub(crate) author: String,

    #[arg(long = "temp-root", help = "Parent directory for per-chain temporary files.")]
    pub(crate) temp_root: Option<PathBuf>,

    #[arg(
        long = "max-chain-length",
        value_parser = parse_positive_usize,
        help = "Maximum number of commands in one message."
    )]
    pub(crate) max_chain_length: Option<usize>,

    #[arg(
        long = "step-timeout-ms",
        help = "Per-command timeout in milliseconds; 0 disables the timeout."
    )]
    pub(crate) step_timeout_ms: Option<u64>,

    #[arg(long, help = "Print the chain report as JSON on stderr after each message.")]
    pub(crate) report: bool,

    #[arg(
        long = "log-level",
        env = "PIPEBOT_LOG_LEVEL",
        value_parser = parse_log_level,
        help = "Default log level when RUST_LOG is unset."
    )]
    pub(crate) log_level: Option<LevelFilter>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_one_shot_flags_parse() {
        let cli = Cli::try_parse_from([
            "pipebot",
            "--message",
            "%echo hi",
            "--attach",
            "a.png",
            "--attach",
            "b.png",
            "--guild",
            "g1",
            "--step-timeout-ms",
            "0",
            "--log-level",
            "debug",
        ])
        .expect("parse");
        assert_eq!(cli.message.as_deref(), Some("%echo hi"));
        assert_eq!(cli.attach, vec![PathBuf::from("a.png"), PathBuf::from("b.png")]);
        assert_eq!(cli.guild.as_deref(), Some("g1"));
        assert_eq!(cli.step_timeout_ms, Some(0));
        assert_eq!(cli.log_level, Some(LevelFilter::DEBUG));
        assert_eq!(cli.author, "console-user");
    }

    #[test]
    fn regression_attach_requires_message_and_positive_limits() {
        assert!(Cli::try_parse_from(["pipebot", "--attach", "a.png"]).is_err());
        assert!(Cli::try_parse_from(["pipebot", "--max-chain-length", "0"]).is_err());
        assert!(Cli::try_parse_from(["pipebot", "--log-level", "loud"]).is_err());
    }
}
