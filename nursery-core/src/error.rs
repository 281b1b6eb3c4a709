// src/error.rs
//! Error taxonomy for the Federation engine.
//!
//! One `thiserror` variant per failure domain (Config / Trust /
//! Transport / Protocol / Action / NotFound), each mapping to a
//! distinct process exit code at the binary boundary.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Missing/malformed input document, missing required field, value out of range.
    #[error("config error: {0}")]
    Config(String),

    /// Cert/key load/parse, signature, or write failure.
    #[error("trust material error: {0}")]
    Trust(String),

    /// TLS handshake refused, connect refused, timeout.
    #[error("transport error: {0}")]
    Transport(String),

    /// Body decode failure, unknown state string, unknown action name.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Exec failure, non-zero exit captured into a run's output.
    #[error("action error: {0}")]
    Action(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Exit code to use when this error is fatal at process startup.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Config(_) => 1,
            Error::Trust(_) => 2,
            _ => 1,
        }
    }
}
