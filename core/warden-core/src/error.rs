//! Error types for warden-core operations.

use std::path::PathBuf;

// ═══════════════════════════════════════════════════════════════════════════════
// Transport Errors (status check could not complete)
// ═══════════════════════════════════════════════════════════════════════════════

/// The auth status check did not produce an answer.
///
/// This is the only error that counts as a failed check. An authoritative
/// "not authenticated" is `Ok(false)`, never a `TransportError`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("auth check request failed: {0}")]
    Request(String),

    #[error("auth service unavailable (HTTP {status})")]
    ServiceUnavailable { status: u16 },
}

// ═══════════════════════════════════════════════════════════════════════════════
// Internal Error
// ═══════════════════════════════════════════════════════════════════════════════

/// All errors that can occur in warden-core operations.
#[derive(Debug, thiserror::Error)]
pub enum WardenError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON parsing error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Status persistence failed: {0}")]
    Persistence(String),

    // ─────────────────────────────────────────────────────────────────────
    // Surface Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Surface control failed: {name}: {details}")]
    Surface { name: String, details: String },
}

/// Convenience type alias for Results using WardenError.
pub type Result<T> = std::result::Result<T, WardenError>;

impl From<WardenError> for String {
    fn from(err: WardenError) -> String {
        err.to_string()
    }
}
