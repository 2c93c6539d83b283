//! JSON log output for applications embedding impera.
//!
//! Installs a global `tracing` subscriber writing one JSON object per event.
//! The `IMPERA_LOG` environment variable, when set, takes precedence over
//! the filter passed to [`init`].

use std::fmt;

use tracing_subscriber::EnvFilter;

/// Environment variable consulted before the default filter.
pub const ENV_FILTER_VAR: &str = "IMPERA_LOG";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoggingError {
    /// The filter directive could not be parsed.
    Filter(String),
    /// A global subscriber is already installed.
    AlreadyInitialized,
}

impl fmt::Display for LoggingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Filter(msg) => write!(f, "invalid log filter: {msg}"),
            Self::AlreadyInitialized => write!(f, "a global tracing subscriber is already set"),
        }
    }
}

impl std::error::Error for LoggingError {}

/// Build the effective filter: `IMPERA_LOG` if set and valid, else `default_filter`.
pub fn filter(default_filter: &str) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_env(ENV_FILTER_VAR) {
        return Ok(filter);
    }
    EnvFilter::try_new(default_filter).map_err(|err| LoggingError::Filter(err.to_string()))
}

/// Install the JSON subscriber, e.g. `init("impera_core=debug")`.
pub fn init(default_filter: &str) -> Result<(), LoggingError> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter(default_filter)?)
        .with_current_span(true)
        .try_init()
        .map_err(|_| LoggingError::AlreadyInitialized)?;
    tracing::debug!(filter = default_filter, "json logging installed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_directive_is_rejected() {
        if std::env::var_os(ENV_FILTER_VAR).is_some() {
            return;
        }
        assert!(matches!(
            filter("impera_core=notalevel"),
            Err(LoggingError::Filter(_))
        ));
    }

    #[test]
    fn second_init_fails() {
        // Ignore the first outcome: another test binary may share the process.
        let _ = init("impera_core=debug");
        assert_eq!(init("info"), Err(LoggingError::AlreadyInitialized));
    }
}
