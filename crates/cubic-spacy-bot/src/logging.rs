use anyhow::{anyhow, Context, Result};
use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

/// Install the process-wide stderr subscriber.
///
/// # Errors
/// Returns an error for an unparsable filter directive or when a subscriber
/// is already installed.
pub fn init(config: &LogConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.level)
        .with_context(|| format!("invalid log level `{}`", config.level))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(config.color)
        .with_target(false)
        .with_writer(std::io::stderr);

    let installed =
        if config.timestamps { builder.try_init() } else { builder.without_time().try_init() };
    installed.map_err(|err| anyhow!("failed to install log subscriber: {err}"))
}
