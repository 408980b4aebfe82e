//! Error taxonomy for jacques-core (spec §7).
//!
//! There is no FFI boundary in this daemon, so unlike the tiered
//! FFI-safe/internal split some siblings use, a single rich enum is used
//! at every boundary this crate owns; HTTP/WS layers map it to their own
//! wire shapes via `From`.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("session already ended: {session_id}")]
    AlreadyEnded { session_id: String },

    #[error("malformed input: {0}")]
    Malformed(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }

    pub fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        Error::Json {
            context: context.into(),
            source,
        }
    }

    pub fn file_not_found(path: &PathBuf) -> Self {
        Error::NotFound(path.to_string_lossy().to_string())
    }

    /// HTTP status code per spec §7's propagation policy.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::NotFound(_) => 404,
            Error::AlreadyEnded { .. } => 409,
            Error::Malformed(_) => 400,
            Error::Unavailable(_) => 503,
            Error::Conflict(_) => 409,
            Error::Io { .. } | Error::Json { .. } | Error::Internal(_) => 500,
        }
    }

    /// The error-category string used on WS control responses
    /// (`{success:false, error:<category>, detail:<string>}`).
    pub fn category(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "not_found",
            Error::AlreadyEnded { .. } => "already_ended",
            Error::Malformed(_) => "malformed",
            Error::Unavailable(_) => "unavailable",
            Error::Conflict(_) => "conflict",
            Error::Io { .. } | Error::Json { .. } | Error::Internal(_) => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
