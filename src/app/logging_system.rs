use super::config::LogLevel;
use std::sync::OnceLock;
use thiserror::Error;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log filter '{filter}': {source}")]
    InvalidFilter {
        filter: String,
        source: tracing_subscriber::filter::ParseError,
    },
    #[error("Failed to set global tracing subscriber: {0}")]
    SetGlobal(#[from] tracing::subscriber::SetGlobalDefaultError),
    #[error("Logging system initialization failed")]
    AlreadyFailed,
}

/// Targets that are only interesting when something is wrong.
const QUIET_TARGETS: &[&str] = &["hyper", "hyper_util", "reqwest", "h2", "rustls"];

pub fn build_filter_string(level: LogLevel) -> String {
    let mut parts = Vec::with_capacity(QUIET_TARGETS.len() + 1);
    parts.push(level.as_str().to_string());
    for target in QUIET_TARGETS {
        parts.push(format!("{target}=warn"));
    }
    parts.join(",")
}

fn install(level: LogLevel, json: bool) -> Result<(), LoggingError> {
    let filter = build_filter_string(level);
    let env_filter = EnvFilter::try_new(&filter).map_err(|source| LoggingError::InvalidFilter {
        filter: filter.clone(),
        source,
    })?;

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(json.then(|| fmt::layer().json().with_target(true)))
        .with((!json).then(|| {
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .compact()
        }));

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Installs the global subscriber once per process. Later calls report the
/// outcome of the first one.
pub fn setup_logging(level: LogLevel, json: bool) -> Result<(), LoggingError> {
    static INIT: OnceLock<bool> = OnceLock::new();

    let installed = *INIT.get_or_init(|| match install(level, json) {
        Ok(()) => true,
        Err(e) => {
            eprintln!("Warning: {e}");
            false
        }
    });

    if installed {
        Ok(())
    } else {
        Err(LoggingError::AlreadyFailed)
    }
}
