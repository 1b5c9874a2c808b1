//! Domain-specific error types using `thiserror`.
//!
//! This module defines the playback error taxonomy shared by the backends,
//! the playback controller and the queue coordinator.

use std::result::Result as StdResult;

use {anyhow::Error, thiserror::Error};

/// Failure to open, probe or decode an audio file.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to load {path}: {reason}")]
pub struct LoadError {
    /// Path of the audio file that could not be loaded.
    pub path: String,
    /// Human-readable cause reported by the backend.
    pub reason: String,
}

impl LoadError {
    /// Creates a new `LoadError`.
    ///
    /// # Arguments
    ///
    /// * `path` - Path of the audio file.
    /// * `reason` - Cause of the failure.
    ///
    /// # Returns
    ///
    /// A new `LoadError`.
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Playback-related errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlaybackError {
    /// The audio path is unreachable or the format is unsupported.
    #[error("Load error: {0}")]
    Load(#[from] LoadError),
    /// The native audio service could not be started or did not answer.
    #[error("Audio backend unavailable: {reason}")]
    BackendUnavailable { reason: String },
    /// A playback operation failed inside the backend.
    #[error("Transport error: {message}")]
    Transport { message: String },
    /// The native audio service exited unexpectedly.
    #[error("Native audio service closed")]
    ServiceClosed,
}

impl PlaybackError {
    /// Creates a new `BackendUnavailable` error.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            reason: reason.into(),
        }
    }

    /// Creates a new `Transport` error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Returns the audio path involved in the failure, if the error carries one.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::Load(e) => Some(&e.path),
            _ => None,
        }
    }
}

/// Operational error context propagation with `anyhow`.
///
/// This type is used for operational errors that need rich context
/// but don't require specific handling logic.
pub type Result<T> = StdResult<T, Error>;
