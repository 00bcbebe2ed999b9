//! Tracing subscriber setup for the CLI.

use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, thiserror::Error)]
#[error("failed to initialize tracing: {0}")]
pub struct TracingInitError(String);

/// Install the global subscriber, writing to stderr.
///
/// `verbose` lowers the default level from `warn` to `debug`; `RUST_LOG`
/// overrides either. `json` switches to one JSON object per event.
pub fn init_tracing(verbose: bool, json: bool) -> Result<(), TracingInitError> {
    let default_level = if verbose { "debug" } else { "warn" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if json {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .try_init()
            .map_err(|e| TracingInitError(e.to_string()))
    } else {
        fmt()
            .compact()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init()
            .map_err(|e| TracingInitError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_fails() {
        let _ = init_tracing(false, false);
        assert!(init_tracing(false, false).is_err());
    }
}
