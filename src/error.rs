//! Error types
//!
//! Gateway and sink errors never reach the participant: the gateway wrapper
//! and the background writer turn them into fallbacks and log lines.

use thiserror::Error;

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(String),

    #[error("expected {expected} phases, found {found}")]
    PhaseCount { expected: usize, found: usize },

    #[error("phase {0} has an empty name")]
    EmptyPhaseName(usize),
}

/// Categorization gateway failures
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("categorization gateway is offline")]
    Offline,

    #[error("missing API key in ${0}")]
    MissingApiKey(String),

    #[error("gateway transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("gateway returned status {0}")]
    Status(u16),

    #[error("gateway reply was empty")]
    EmptyReply,

    #[error("malformed gateway reply: {0}")]
    Malformed(String),
}

/// Persistence failures
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("file sink error: {0}")]
    Io(#[from] std::io::Error),

    #[error("remote sink transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("remote sink returned status {0}")]
    Status(u16),
}

/// Contract violations by the session driver
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    #[error("all phases are complete")]
    Completed,

    #[error("phase {0} has not been started")]
    PhaseNotStarted(usize),
}
