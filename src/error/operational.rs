//! Operational error context propagation with `anyhow`.
//!
//! This module provides extension traits and utilities for enhancing
//! error context and centralized reporting of best-effort failures.

use std::{error::Error as StdError, fmt::Display};

use {
    anyhow::{Context, Error, Result as AnyhowResult},
    tracing::{error, warn},
};

use crate::error::domain::PlaybackError;

/// Extension trait for enhanced error context.
///
/// This trait provides methods to add contextual information to errors,
/// making startup failures and best-effort failures easier to diagnose.
pub trait ResultExt<T, E> {
    /// Adds context to an error with a static string.
    fn add_context(self, context: &'static str) -> AnyhowResult<T>
    where
        E: StdError + Send + Sync + 'static;

    /// Adds context to an error with a formatted string.
    fn add_contextf(self, format: impl Display) -> AnyhowResult<T>
    where
        E: StdError + Send + Sync + 'static;
}

impl<T, E> ResultExt<T, E> for Result<T, E> {
    fn add_context(self, context: &'static str) -> AnyhowResult<T>
    where
        E: StdError + Send + Sync + 'static,
    {
        self.context(context)
    }

    fn add_contextf(self, format: impl Display) -> AnyhowResult<T>
    where
        E: StdError + Send + Sync + 'static,
    {
        self.context(format.to_string())
    }
}

/// Centralized reporting for failures that must not interrupt playback.
///
/// Listening-time accounting and other bookkeeping are best-effort: their
/// failures are logged through here and otherwise ignored.
pub struct ErrorReporter;

impl ErrorReporter {
    /// Reports a recoverable failure.
    pub fn warn(error: &Error, context: &str) {
        warn!(context = context, error = %format!("{error:#}"), "Recoverable failure");
    }

    /// Reports a non-recoverable failure.
    pub fn error(error: &Error, context: &str) {
        error!(context = context, error = %format!("{error:#}"), "Unrecoverable failure");
    }

    /// Converts an error to a one-line message for the terminal.
    ///
    /// Playback errors get a short, user-facing wording, even when wrapped
    /// in context; anything else falls back to the top-level message.
    pub fn to_user_message(error: &Error) -> String {
        match error.downcast_ref::<PlaybackError>() {
            Some(PlaybackError::Load(e)) => format!("Cannot play {}: {}", e.path, e.reason),
            Some(PlaybackError::BackendUnavailable { .. }) => {
                "Audio output is not available".to_string()
            }
            Some(PlaybackError::Transport { message }) => format!("Playback failed: {message}"),
            Some(PlaybackError::ServiceClosed) => {
                "The audio service stopped; restart the player".to_string()
            }
            None => error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        error::Error,
        fmt::{Display, Formatter, Result as FmtResult},
    };

    use anyhow::{Error as AnyhowError, anyhow};

    use crate::error::{
        domain::{LoadError, PlaybackError},
        operational::{ErrorReporter, ResultExt},
    };

    #[derive(Debug)]
    struct TestError;

    impl Display for TestError {
        fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
            write!(f, "Test error")
        }
    }

    impl Error for TestError {}

    #[test]
    fn test_result_ext_with_context() {
        let result: Result<i32, TestError> = Err(TestError);
        let error = result.add_context("Opening ledger").unwrap_err();
        assert!(error.to_string().contains("Opening ledger"));
    }

    #[test]
    fn test_result_ext_with_contextf() {
        let result: Result<i32, TestError> = Err(TestError);
        let error = result.add_contextf(format!("Track {}", 7)).unwrap_err();
        assert!(error.to_string().contains("Track 7"));
    }

    #[test]
    fn test_user_message_for_load_error() {
        let error = AnyhowError::new(PlaybackError::from(LoadError::new("/x.ogg", "not found")));
        assert_eq!(
            ErrorReporter::to_user_message(&error),
            "Cannot play /x.ogg: not found"
        );
    }

    #[test]
    fn test_user_message_sees_through_context() {
        let result: Result<(), PlaybackError> = Err(PlaybackError::ServiceClosed);
        let error = result.add_context("Failed to initialize playback").unwrap_err();
        assert_eq!(
            ErrorReporter::to_user_message(&error),
            "The audio service stopped; restart the player"
        );
    }

    #[test]
    fn test_user_message_fallback() {
        let error = anyhow!("Test error message");
        assert_eq!(ErrorReporter::to_user_message(&error), "Test error message");
    }
}
