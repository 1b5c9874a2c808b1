//! Observable player state with reactive update mechanisms.
//!
//! This module provides the `AppState` container that mirrors what the
//! playback engine and queue coordinator know, for consumption by a UI or
//! any other observer, with thread-safe access and change notifications.

use std::sync::Arc;

use {
    parking_lot::RwLock,
    tokio::sync::broadcast::{Receiver, Sender, channel},
};

use crate::audio::{
    backend::SpectrumFrame,
    engine::ErrorInfo,
    track::{PlaybackQueue, Track},
};

/// Everything an observer can display about the player.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSnapshot {
    pub is_playing: bool,
    pub current_track: Option<Track>,
    pub current_time: f64,
    pub duration: f64,
    pub volume: f32,
    /// Tracks in the queue, in order.
    pub queue: Vec<Track>,
    /// Index of the current queue entry.
    pub position: usize,
    /// Most recent playback failure, cleared when a new track starts.
    pub last_error: Option<ErrorInfo>,
    /// Latest visualizer frame.
    pub spectrum: Option<SpectrumFrame>,
}

impl Default for PlayerSnapshot {
    fn default() -> Self {
        Self {
            is_playing: false,
            current_track: None,
            current_time: 0.0,
            duration: 0.0,
            volume: 1.0,
            queue: Vec::new(),
            position: 0,
            last_error: None,
            spectrum: None,
        }
    }
}

/// Application state change events.
#[derive(Debug, Clone, PartialEq)]
pub enum AppStateEvent {
    /// Play flag or current track changed.
    PlaybackChanged {
        is_playing: bool,
        track: Option<Track>,
    },
    /// Progress changed.
    ProgressChanged { current_time: f64, duration: f64 },
    /// Queue contents or position changed.
    QueueChanged { length: usize, position: usize },
    /// A playback error was raised.
    ErrorRaised(ErrorInfo),
    /// Volume changed.
    VolumeChanged(f32),
    /// New visualizer frame.
    SpectrumUpdated(SpectrumFrame),
}

/// Central state container with thread-safe access.
#[derive(Debug, Clone)]
pub struct AppState {
    snapshot: Arc<RwLock<PlayerSnapshot>>,
    /// Broadcast channel for state change notifications.
    state_tx: Sender<AppStateEvent>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    /// Creates a new application state instance.
    ///
    /// # Returns
    ///
    /// A new `AppState` instance.
    #[must_use]
    pub fn new() -> Self {
        let (state_tx, _) = channel(64);

        Self {
            snapshot: Arc::new(RwLock::new(PlayerSnapshot::default())),
            state_tx,
        }
    }

    /// Updates the play flag and current track and notifies subscribers.
    ///
    /// A new current track clears the last error.
    ///
    /// # Arguments
    ///
    /// * `is_playing` - Whether audio is playing.
    /// * `track` - Current track, if any.
    pub fn update_playback(&self, is_playing: bool, track: Option<Track>) {
        {
            let mut snapshot = self.snapshot.write();
            if track.is_some() && track != snapshot.current_track {
                snapshot.last_error = None;
            }
            snapshot.is_playing = is_playing;
            snapshot.current_track = track.clone();
        }
        self.notify(AppStateEvent::PlaybackChanged { is_playing, track });
    }

    /// Updates progress and notifies subscribers.
    pub fn update_progress(&self, current_time: f64, duration: f64) {
        {
            let mut snapshot = self.snapshot.write();
            snapshot.current_time = current_time;
            snapshot.duration = duration;
        }
        self.notify(AppStateEvent::ProgressChanged {
            current_time,
            duration,
        });
    }

    /// Mirrors the queue and notifies subscribers.
    pub fn update_queue(&self, queue: &PlaybackQueue) {
        {
            let mut snapshot = self.snapshot.write();
            snapshot.queue = queue.tracks.clone();
            snapshot.position = queue.position;
        }
        self.notify(AppStateEvent::QueueChanged {
            length: queue.len(),
            position: queue.position,
        });
    }

    /// Records a playback error and notifies subscribers.
    pub fn raise_error(&self, error: ErrorInfo) {
        self.snapshot.write().last_error = Some(error.clone());
        self.notify(AppStateEvent::ErrorRaised(error));
    }

    /// Updates the volume and notifies subscribers.
    pub fn update_volume(&self, volume: f32) {
        self.snapshot.write().volume = volume;
        self.notify(AppStateEvent::VolumeChanged(volume));
    }

    /// Stores a visualizer frame and notifies subscribers.
    pub fn update_spectrum(&self, frame: SpectrumFrame) {
        self.snapshot.write().spectrum = Some(frame.clone());
        self.notify(AppStateEvent::SpectrumUpdated(frame));
    }

    /// Subscribes to application state changes.
    ///
    /// # Returns
    ///
    /// A broadcast receiver for state change events.
    pub fn subscribe(&self) -> Receiver<AppStateEvent> {
        self.state_tx.subscribe()
    }

    /// Gets a copy of the current state.
    pub fn snapshot(&self) -> PlayerSnapshot {
        self.snapshot.read().clone()
    }

    fn notify(&self, event: AppStateEvent) {
        // No receivers is not an error.
        let _ = self.state_tx.send(event);
    }
}
