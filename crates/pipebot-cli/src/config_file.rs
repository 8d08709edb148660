//! TOML config file for the console binary.

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use pipebot_command::{is_valid_command_name, GrammarConfig};
use pipebot_runtime::{ChainRuntimeConfig, CommandTemplate, InMemoryCommandStore, PlatformLimits};
use serde::Deserialize;

use crate::cli_args::Cli;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct PipebotConfigFile {
    #[serde(default)]
    grammar: GrammarConfig,
    #[serde(default)]
    runtime: RuntimeSection,
    #[serde(default)]
    limits: LimitsSection,
    #[serde(default)]
    templates: Vec<CommandTemplate>,
    #[serde(default)]
    bans: BansSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuntimeSection {
    temp_root: Option<PathBuf>,
    max_chain_length: Option<usize>,
    /// `0` disables the per-step timeout.
    step_timeout_ms: Option<u64>,
    max_template_commands: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LimitsSection {
    max_message_content_length: Option<usize>,
    max_file_size: Option<u64>,
    max_files_per_message: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct BansSection {
    #[serde(default)]
    users: Vec<String>,
    #[serde(default)]
    guilds: Vec<String>,
}

/// Effective settings after merging the config file with CLI flags.
#[derive(Debug)]
pub(crate) struct ResolvedSettings {
    pub(crate) runtime: ChainRuntimeConfig,
    pub(crate) limits: PlatformLimits,
    pub(crate) store: InMemoryCommandStore,
}

/// Reads `path`; a missing path yields the defaults.
pub(crate) fn load_config_file(path: Option<&Path>) -> Result<PipebotConfigFile> {
    let Some(path) = path else {
        return Ok(PipebotConfigFile::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read pipebot config {}", path.display()))?;
    parse_config_file(&raw)
        .with_context(|| format!("failed to parse pipebot config {}", path.display()))
}

pub(crate) fn parse_config_file(raw: &str) -> Result<PipebotConfigFile> {
    let parsed = toml::from_str::<PipebotConfigFile>(raw)?;
    validate_config_file(&parsed)?;
    Ok(parsed)
}

fn validate_config_file(config: &PipebotConfigFile) -> Result<()> {
    let grammar = config.grammar;
    if grammar.prefix == grammar.named_prefix {
        bail!(
            "grammar prefix and named_prefix must differ (both are '{}')",
            grammar.prefix
        );
    }
    if grammar.prefix.is_whitespace() || grammar.named_prefix.is_whitespace() {
        bail!("grammar prefixes cannot be whitespace");
    }
    if config.runtime.max_chain_length == Some(0) {
        bail!("runtime.max_chain_length must be greater than 0");
    }
    if config.runtime.max_template_commands == Some(0) {
        bail!("runtime.max_template_commands must be greater than 0");
    }

    let mut seen = BTreeSet::new();
    for template in &config.templates {
        if !is_valid_command_name(&template.name) {
            bail!("template name '{}' is not a valid command name", template.name);
        }
        if template.body.trim().is_empty() {
            bail!("template '{}' has an empty body", template.name);
        }
        if !seen.insert((template.name.as_str(), template.scope_id.as_deref())) {
            bail!(
                "duplicate template '{}' for scope {}",
                template.name,
                template.scope_id.as_deref().unwrap_or("global")
            );
        }
    }
    Ok(())
}

impl PipebotConfigFile {
    /// Applies CLI overrides on top of the file values.
    pub(crate) fn resolve(self, cli: &Cli) -> ResolvedSettings {
        let defaults = ChainRuntimeConfig::default();
        let step_timeout_ms = cli
            .step_timeout_ms
            .or(self.runtime.step_timeout_ms)
            .map_or(defaults.step_timeout_ms, |timeout| {
                (timeout > 0).then_some(timeout)
            });
        let runtime = ChainRuntimeConfig {
            grammar: self.grammar,
            temp_root: cli
                .temp_root
                .clone()
                .or(self.runtime.temp_root)
                .unwrap_or(defaults.temp_root),
            max_chain_length: cli
                .max_chain_length
                .or(self.runtime.max_chain_length)
                .unwrap_or(defaults.max_chain_length),
            step_timeout_ms,
            max_template_commands: self
                .runtime
                .max_template_commands
                .unwrap_or(defaults.max_template_commands),
        };

        let default_limits = PlatformLimits::default();
        let limits = PlatformLimits {
            max_message_content_length: self
                .limits
                .max_message_content_length
                .unwrap_or(default_limits.max_message_content_length),
            max_file_size: self
                .limits
                .max_file_size
                .unwrap_or(default_limits.max_file_size),
            max_files_per_message: self
                .limits
                .max_files_per_message
                .unwrap_or(default_limits.max_files_per_message),
        };

        let mut store = InMemoryCommandStore::new();
        for user in self.bans.users {
            store = store.with_banned_user(user);
        }
        for guild in self.bans.guilds {
            store = store.with_banned_guild(guild);
        }
        for template in self.templates {
            store = store.with_template(template);
        }

        ResolvedSettings {
            runtime,
            limits,
            store,
        }
    }
}
