use anyhow::{Context, Result};
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber.
///
/// RUST_LOG wins; otherwise `-v` picks debug or trace, and without `-v` the
/// config file's `log_level` applies before the "info" default.
pub fn init(verbose: u8, config_level: Option<&str>) -> Result<()> {
    let default_level = match verbose {
        0 => config_level.unwrap_or("info"),
        1 => "debug",
        _ => "trace",
    };

    let filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => EnvFilter::try_new(default_level)
            .with_context(|| format!("Invalid log level {default_level:?}"))?,
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    Ok(())
}
