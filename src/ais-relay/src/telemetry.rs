use snafu::ResultExt;
use tracing_subscriber::{EnvFilter, util::SubscriberInitExt};

use crate::{
    error::{Result, error::TracingSnafu},
    settings::LogLevel,
};

/// Installs the global fmt subscriber. `RUST_LOG` takes precedence over `level`.
pub fn init_tracer(level: LogLevel) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_ref()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .finish()
        .try_init()
        .context(TracingSnafu)
}
