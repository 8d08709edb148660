use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. Logs go to stderr so replies own stdout.
pub(crate) fn init_tracing(log_level: Option<LevelFilter>) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(log_level.unwrap_or(LevelFilter::WARN).into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
