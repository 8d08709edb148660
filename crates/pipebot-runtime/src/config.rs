use std::path::PathBuf;

use pipebot_command::GrammarConfig;

pub const DEFAULT_MAX_CHAIN_LENGTH: usize = 10;
pub const DEFAULT_STEP_TIMEOUT_MS: u64 = 120_000;
pub const DEFAULT_MAX_TEMPLATE_COMMANDS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Runtime knobs for [`crate::ChainRuntime`].
pub struct ChainRuntimeConfig {
    pub grammar: GrammarConfig,
    /// Parent directory of every chain's temporary directory.
    pub temp_root: PathBuf,
    pub max_chain_length: usize,
    /// Per-step deadline; `None` disables it.
    pub step_timeout_ms: Option<u64>,
    /// Upper bound on commands a single template invocation may expand into.
    pub max_template_commands: usize,
}

impl Default for ChainRuntimeConfig {
    fn default() -> Self {
        Self {
            grammar: GrammarConfig::default(),
            temp_root: std::env::temp_dir().join("pipebot"),
            max_chain_length: DEFAULT_MAX_CHAIN_LENGTH,
            step_timeout_ms: Some(DEFAULT_STEP_TIMEOUT_MS),
            max_template_commands: DEFAULT_MAX_TEMPLATE_COMMANDS,
        }
    }
}
