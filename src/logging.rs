//! Tracing subscriber setup shared by the binaries.

use anyhow::{anyhow, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LogArgs;

/// Installs the global subscriber. `RUST_LOG` takes precedence over
/// `--log-level`. Logs go to stderr so stdout stays free for command output.
pub fn init(args: &LogArgs) -> Result<()> {
    let filter = build_filter(&args.log_level)?;
    let registry = tracing_subscriber::registry().with(filter);
    let installed = if args.log_json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };
    installed.map_err(|err| anyhow!("failed to install tracing subscriber: {err}"))
}

fn build_filter(default_level: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(default_level)
        .map_err(|err| anyhow!("invalid log level '{default_level}': {err}"))
}
