//! Unified error types for the seccheck workspace.
//!
//! Each higher-level crate defines its own domain-specific error enum that wraps
//! these common variants when appropriate.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum SeccheckError {
    /// An I/O operation on a filesystem path failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A socket operation failed.
    #[error("{op} failed: {source}")]
    Socket {
        /// Name of the failing operation (`socket`, `connect`, `bind`, ...).
        op: &'static str,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A checker vetoed the checked operation.
    ///
    /// The instrumented call site fails the operation with `errno`.
    #[error("denied ({errno}): {reason}")]
    Denied {
        /// Error number the checked operation fails with.
        errno: i32,
        /// Human-readable reason for the veto.
        reason: String,
    },
}

impl SeccheckError {
    /// Builds a [`SeccheckError::Socket`] from any error convertible to
    /// [`std::io::Error`], such as `nix::errno::Errno`.
    pub fn socket(op: &'static str, source: impl Into<std::io::Error>) -> Self {
        Self::Socket {
            op,
            source: source.into(),
        }
    }

    /// Builds a [`SeccheckError::Denied`] veto.
    pub fn denied(errno: i32, reason: impl Into<String>) -> Self {
        Self::Denied {
            errno,
            reason: reason.into(),
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, SeccheckError>;
