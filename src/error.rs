//! Error types for the engine pipe, the IRC socket, and configuration.
//!
//! Each unit fails with its own error type. The supervisor treats any of
//! them as fatal to the current incarnation and restarts the unit.

// Rust guideline compliant 2026-02

use std::path::PathBuf;
use std::time::Duration;

/// Errors raised by the engine transport.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The engine executable could not be started.
    #[error("failed to launch engine `{command}`: {source}")]
    Launch {
        /// Command line that was attempted.
        command: String,
        /// Underlying spawn error.
        #[source]
        source: std::io::Error,
    },
    /// Reading from the engine's output failed.
    #[error("engine read failed: {0}")]
    Read(#[source] std::io::Error),
    /// Writing to the engine's input failed.
    #[error("engine write failed: {0}")]
    Write(#[source] std::io::Error),
    /// The engine closed its output pipe.
    #[error("engine closed its output pipe")]
    Closed,
    /// No reply arrived within the configured bound.
    #[error("engine did not reply within {0:?}")]
    Timeout(Duration),
    /// The transport has no running process.
    #[error("engine is not running")]
    NotRunning,
}

/// Errors raised by the IRC connection endpoint.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// The TCP connection could not be established.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        /// `host:port` that was dialled.
        addr: String,
        /// Underlying socket error.
        #[source]
        source: std::io::Error,
    },
    /// Reading from the socket failed.
    #[error("socket read failed: {0}")]
    Read(#[source] std::io::Error),
    /// Writing to the socket failed.
    #[error("socket write failed: {0}")]
    Write(#[source] std::io::Error),
    /// The server closed the connection.
    #[error("connection closed by peer")]
    Closed,
    /// Nothing was received within the configured bound.
    #[error("no data from server within {0:?}")]
    Timeout(Duration),
}

/// Errors returned to callers of engine requests.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// The engine unit's mailbox is closed or dropped the request.
    #[error("engine unit unavailable")]
    Unavailable,
    /// The engine failed while producing the reply.
    #[error("engine failed: {0}")]
    Engine(String),
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// Path of the config file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The config file is not valid JSON for [`crate::Config`].
    #[error("failed to parse config {path}: {source}")]
    Parse {
        /// Path of the config file.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },
    /// A required field is empty.
    #[error("config field `{0}` must not be empty")]
    Missing(&'static str),
}
