//! Console front end for pipebot: handles one message from the command line,
//! or one message per stdin line.

mod bootstrap_helpers;
mod cli_args;
mod config_file;
mod console_platform;
mod startup;

use anyhow::Result;
use clap::Parser;

use crate::{bootstrap_helpers::init_tracing, cli_args::Cli, startup::run_cli};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level);
    run_cli(cli).await
}
