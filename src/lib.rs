//! Segue - Gapless Playback Engine
//!
//! A playback engine for music players that produces gapless playback across
//! an out-of-process native audio service or an in-process dual-buffer
//! fallback, and accounts listening time per track for history and
//! long-term statistics.

pub mod audio;
pub mod config;
pub mod error;
pub mod session;
pub mod state;

#[cfg(test)]
mod test_support;

// Re-export key types for convenience
pub use {
    audio::{
        backend::{Backend, BackendEvent, BackendKind, SpectrumFrame},
        engine::{EngineEvent, EnginePhase, PlaybackController, PlaybackState, PreloadSlot},
        queue_coordinator::{Command, QueueCoordinator},
        track::{PlaybackQueue, Track},
    },
    config::{EngineSettings, SettingsManager},
    error::{LoadError, PlaybackError},
    session::{CeilingPolicy, SessionTracker, SqliteLedger},
    state::{AppState, AppStateEvent},
};
