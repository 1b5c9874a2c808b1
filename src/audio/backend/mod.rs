//! Playback backends behind one transport contract.
//!
//! Two implementations exist: [`native::NativeBackend`], which drives an
//! out-of-process audio service, and [`dual_buffer::DualBufferBackend`],
//! which alternates between two in-process media handles. Both report
//! progress through the same [`BackendEvent`] vocabulary so the playback
//! controller never needs to know which one is active.

pub mod dual_buffer;
pub mod native;
pub mod protocol;

use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};

use crate::{audio::track::Track, error::PlaybackError};

/// Which backend implementation is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Out-of-process audio service.
    Native,
    /// In-process pair of media handles.
    DualBuffer,
}

impl Display for BackendKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Native => write!(f, "native"),
            Self::DualBuffer => write!(f, "dual-buffer"),
        }
    }
}

/// Visualizer frame pushed by the native audio service.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SpectrumFrame {
    /// Magnitude per frequency band.
    pub bands: Vec<f32>,
    /// Root-mean-square level.
    pub rms: f32,
    /// Peak level.
    pub peak: f32,
}

/// Notifications emitted by a backend.
///
/// Backends never call into the controller directly; they push these on the
/// channel handed to them at construction and the controller drains it.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    /// The current track finished loading and its duration is known.
    Loaded {
        track_id: i64,
        duration: f64,
        playing: bool,
    },
    /// The next track is prepared and can be switched to without a gap.
    Preloaded { track_id: i64 },
    /// Periodic progress report for the current track.
    Tick {
        current_time: f64,
        duration: f64,
        playing: bool,
    },
    /// The current track played to its end with nothing ready to follow.
    ///
    /// The native service may omit the id.
    TrackEnded { track_id: Option<i64> },
    /// The backend switched to the preloaded track on its own.
    TrackChanged { track_id: i64, duration: f64 },
    /// A load or transport operation failed.
    Error {
        track_id: Option<i64>,
        error: PlaybackError,
    },
    /// Visualizer data.
    Spectrum(SpectrumFrame),
    /// The native audio service went away.
    ServiceClosed,
}

/// Uniform transport contract implemented by every backend.
///
/// All calls return immediately; completion and failures are reported as
/// [`BackendEvent`]s. Implementations must tolerate any call order, including
/// transport controls with nothing loaded.
pub trait Backend {
    /// Which implementation this is.
    fn kind(&self) -> BackendKind;

    /// Starts loading `track` as the current track, replacing anything
    /// current or preloaded.
    ///
    /// # Arguments
    ///
    /// * `track` - Track to load
    /// * `auto_play` - Whether playback starts as soon as loading completes
    fn load(&mut self, track: &Track, auto_play: bool);

    /// Resumes playback of the current track.
    fn play(&mut self);

    /// Pauses playback of the current track.
    fn pause(&mut self);

    /// Moves the playhead of the current track to `position` seconds.
    fn seek(&mut self, position: f64);

    /// Sets the output volume in `[0, 1]`.
    fn set_volume(&mut self, volume: f32);

    /// Prepares `track` as the next track, or cancels preparation with `None`.
    ///
    /// Repeating the call with the same track must not restart a finished
    /// preparation.
    fn preload(&mut self, track: Option<&Track>);

    /// Switches to the preloaded track.
    ///
    /// Does nothing if no preload is ready.
    fn play_next(&mut self);

    /// Releases current and preloaded media.
    fn stop(&mut self);

    /// Sets the visualizer sync offset in seconds.
    fn set_lookahead(&mut self, _seconds: f64) {}

    /// Advances internal state that is not event driven.
    ///
    /// Called periodically by the owner; backends that push their own events
    /// leave this empty.
    fn poll(&mut self) {}
}
