use std::path::PathBuf;
use thiserror::Error;

/// Failures of the line transport.
///
/// Mid-stream read faults are never returned from here: the reader task turns
/// them into a `TransportEvent::Disconnected` instead.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to connect to {addr}: {reason}")]
    Connection { addr: String, reason: String },

    #[error("Not connected")]
    NotConnected,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The record log could not be created or appended to.
#[derive(Error, Debug)]
pub enum CorrelateError {
    #[error("Failed to write correlation log {path}: {reason}")]
    Persistence { path: PathBuf, reason: String },
}

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Image directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("Failed to list {path}: {source}")]
    Listing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid image pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Crate-wide error, used where several concerns meet (the session loop).
#[derive(Error, Debug)]
pub enum LinkError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Correlate(#[from] CorrelateError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

pub type Result<T> = std::result::Result<T, LinkError>;
