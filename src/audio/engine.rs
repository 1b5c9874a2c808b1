//! Playback controller: the single owner of transport state.
//!
//! The `PlaybackController` is the only component that talks to a
//! [`Backend`]. It keeps the current and preloaded tracks, the play flag,
//! progress and volume, and turns raw backend events into
//! backend-agnostic [`EngineEvent`]s for its subscribers.
//!
//! Backend events arrive asynchronously and may race with user actions
//! (a manual skip and a service-side gapless handoff describing the same
//! transition, for example). Every event is therefore checked against the
//! track the controller already considers current before it is acted on.

use std::time::{Duration, Instant};

use {
    async_channel::{Receiver, Sender, unbounded},
    tracing::{debug, info, warn},
};

use crate::{
    audio::{
        backend::{
            Backend, BackendEvent, BackendKind, SpectrumFrame, dual_buffer::DualBufferBackend,
            native::NativeBackend,
        },
        track::Track,
    },
    config::EngineSettings,
    error::PlaybackError,
};

/// How long an unconfirmed play/pause toggle blocks further toggles.
const TOGGLE_CONFIRM_TIMEOUT: Duration = Duration::from_secs(1);

/// Observable transport state.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackState {
    pub is_playing: bool,
    pub current_track: Option<Track>,
    /// Last known position in seconds.
    pub current_time: f64,
    /// Duration of the current track in seconds (0 when unknown).
    pub duration: f64,
    /// Output volume in `[0, 1]`.
    pub volume: f32,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            is_playing: false,
            current_track: None,
            current_time: 0.0,
            duration: 0.0,
            volume: 1.0,
        }
    }
}

/// Controller state machine.
///
/// `Idle → Loading → {Playing | Paused}`, `Playing ⇄ Paused`,
/// `{Playing | Paused} → Transitioning → Playing` on a switch to the
/// preloaded track, and any state `→ Idle` on stop, error or exhaustion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnginePhase {
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
    Transitioning,
}

/// The next track being prepared off the active path.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PreloadSlot {
    pub track: Option<Track>,
    /// The backend confirmed the track can be switched to without a gap.
    pub ready: bool,
}

/// Context for a failure surfaced to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorInfo {
    pub message: String,
    pub path: Option<String>,
    pub track: Option<Track>,
}

/// Notifications published by the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Play flag or current track changed.
    StateChanged {
        is_playing: bool,
        track: Option<Track>,
    },
    /// Progress changed.
    TimeUpdated { current_time: f64, duration: f64 },
    /// A track stopped being current after playing to its end (or past it
    /// through a gapless handoff). Fired once per finished track.
    TrackEnded(Track),
    /// A backend failure; the controller has already returned to idle.
    Error(ErrorInfo),
    /// Visualizer data, native backend only.
    Spectrum(SpectrumFrame),
}

/// Handle returned by [`PlaybackController::subscribe`].
pub type SubscriptionId = u64;

/// Backend-agnostic playback state machine.
pub struct PlaybackController {
    backend: Box<dyn Backend>,
    backend_events: Receiver<BackendEvent>,
    state: PlaybackState,
    phase: EnginePhase,
    preload: PreloadSlot,
    /// Whether the track being loaded should start once ready.
    auto_play: bool,
    /// Pending toggle: when it was issued and the play state it asked for.
    toggle_in_flight: Option<(Instant, bool)>,
    lookahead_secs: f64,
    subscribers: Vec<(SubscriptionId, Sender<EngineEvent>)>,
    next_subscription: SubscriptionId,
    service_closed: bool,
}

impl PlaybackController {
    /// Creates a controller with the backend selected by `settings`.
    ///
    /// The native backend is tried first when enabled; if its service cannot
    /// be started the dual-buffer backend is used instead. This choice is
    /// made once and never revisited.
    ///
    /// # Arguments
    ///
    /// * `settings` - Engine settings
    ///
    /// # Returns
    ///
    /// A new `PlaybackController`.
    ///
    /// # Errors
    ///
    /// Returns `PlaybackError::BackendUnavailable` if no backend can be opened.
    pub async fn initialize(settings: &EngineSettings) -> Result<Self, PlaybackError> {
        let (events_tx, events_rx) = unbounded();

        let backend: Box<dyn Backend> = match start_native(settings, events_tx.clone()).await {
            Some(native) => Box::new(native),
            None => Box::new(DualBufferBackend::open_default(events_tx)?),
        };
        info!(backend = %backend.kind(), "Playback controller initialized");

        let mut controller = Self::with_backend(backend, events_rx);
        controller.set_volume(settings.volume);
        controller.set_lookahead(settings.lookahead_secs);
        Ok(controller)
    }

    /// Creates a controller over an already constructed backend.
    ///
    /// # Arguments
    ///
    /// * `backend` - Backend to drive
    /// * `backend_events` - Receiving end of the channel the backend reports on
    #[must_use]
    pub fn with_backend(backend: Box<dyn Backend>, backend_events: Receiver<BackendEvent>) -> Self {
        Self {
            backend,
            backend_events,
            state: PlaybackState::default(),
            phase: EnginePhase::Idle,
            preload: PreloadSlot::default(),
            auto_play: false,
            toggle_in_flight: None,
            lookahead_secs: 0.0,
            subscribers: Vec::new(),
            next_subscription: 0,
            service_closed: false,
        }
    }

    /// Loads `track` as the current track.
    ///
    /// Supersedes any in-flight load and invalidates the preload slot.
    ///
    /// # Arguments
    ///
    /// * `track` - Track to load
    /// * `auto_play` - Start playback once loading completes
    pub fn load_and_play(&mut self, track: Track, auto_play: bool) {
        info!(track_id = track.id, title = %track.title, auto_play, "Loading track");

        self.preload = PreloadSlot::default();
        self.toggle_in_flight = None;
        self.auto_play = auto_play;
        self.phase = EnginePhase::Loading;
        self.state.is_playing = false;
        self.state.current_time = 0.0;
        self.state.duration = track.duration;
        self.state.current_track = Some(track.clone());

        self.backend.load(&track, auto_play);

        let duration = self.state.duration;
        self.emit(EngineEvent::StateChanged {
            is_playing: false,
            track: Some(track),
        });
        self.emit(EngineEvent::TimeUpdated {
            current_time: 0.0,
            duration,
        });
    }

    /// Prepares `track` as the next track, or cancels preparation.
    ///
    /// Always reissued to the backend, even for the same track, so the
    /// readiness flag is never carried over from an earlier queue shape.
    pub fn preload_next(&mut self, track: Option<Track>) {
        debug!(track_id = ?track.as_ref().map(|t| t.id), "Preloading next track");
        self.backend.preload(track.as_ref());
        self.preload = PreloadSlot { track, ready: false };
    }

    /// Switches to the preloaded track.
    ///
    /// # Returns
    ///
    /// `true` if a ready preload was promoted; `false` if nothing was ready,
    /// in which case nothing changes.
    pub fn play_next(&mut self) -> bool {
        if !self.preload.ready {
            debug!("play_next with no ready preload");
            return false;
        }
        let Some(incoming) = self.preload.track.take() else {
            return false;
        };
        self.preload.ready = false;

        info!(track_id = incoming.id, "Switching to preloaded track");
        self.state.current_track = Some(incoming.clone());
        self.state.is_playing = true;
        self.state.current_time = 0.0;
        self.state.duration = incoming.duration;
        self.phase = EnginePhase::Transitioning;
        self.toggle_in_flight = None;

        self.backend.play_next();

        let duration = self.state.duration;
        self.emit(EngineEvent::StateChanged {
            is_playing: true,
            track: Some(incoming),
        });
        self.emit(EngineEvent::TimeUpdated {
            current_time: 0.0,
            duration,
        });
        true
    }

    /// Flips between playing and paused.
    ///
    /// A toggle issued while a previous one is still unconfirmed by the
    /// backend is dropped.
    ///
    /// # Returns
    ///
    /// `true` if the toggle took effect.
    pub fn toggle_play_pause(&mut self) -> bool {
        if let Some((issued, _)) = self.toggle_in_flight
            && issued.elapsed() < TOGGLE_CONFIRM_TIMEOUT
        {
            debug!("Dropping toggle, previous one still in flight");
            return false;
        }
        if self.state.current_track.is_none() {
            return false;
        }

        let target = !self.wants_playback();
        self.toggle_in_flight = Some((Instant::now(), target));
        if target {
            self.play();
        } else {
            self.pause();
        }
        true
    }

    /// Resumes playback.
    pub fn play(&mut self) {
        let Some(track) = self.state.current_track.clone() else {
            return;
        };
        if self.phase == EnginePhase::Loading {
            self.auto_play = true;
            self.backend.play();
            return;
        }

        self.state.is_playing = true;
        if self.phase == EnginePhase::Paused {
            self.phase = EnginePhase::Playing;
        }
        self.backend.play();
        self.emit(EngineEvent::StateChanged {
            is_playing: true,
            track: Some(track),
        });
    }

    /// Pauses playback.
    pub fn pause(&mut self) {
        let Some(track) = self.state.current_track.clone() else {
            return;
        };
        if self.phase == EnginePhase::Loading {
            self.auto_play = false;
            self.backend.pause();
            return;
        }

        self.state.is_playing = false;
        self.phase = EnginePhase::Paused;
        self.backend.pause();
        self.emit(EngineEvent::StateChanged {
            is_playing: false,
            track: Some(track),
        });
    }

    /// Seeks within the current track.
    ///
    /// Non-finite positions are ignored; others are clamped to `[0, duration]`.
    pub fn seek(&mut self, position: f64) {
        if !position.is_finite() || self.state.current_track.is_none() {
            return;
        }

        let position = if self.state.duration > 0.0 {
            position.clamp(0.0, self.state.duration)
        } else {
            position.max(0.0)
        };
        self.state.current_time = position;
        self.backend.seek(position);
        self.emit(EngineEvent::TimeUpdated {
            current_time: position,
            duration: self.state.duration,
        });
    }

    /// Seeks to `percent` (0 to 100) of the current track's duration.
    ///
    /// Ignored while the duration is unknown.
    pub fn seek_percent(&mut self, percent: f64) {
        if !percent.is_finite() || self.state.duration <= 0.0 {
            return;
        }
        self.seek(self.state.duration * percent.clamp(0.0, 100.0) / 100.0);
    }

    /// Sets the output volume, clamped to `[0, 1]`.
    pub fn set_volume(&mut self, volume: f32) {
        if !volume.is_finite() {
            return;
        }
        let volume = volume.clamp(0.0, 1.0);
        self.state.volume = volume;
        self.backend.set_volume(volume);
    }

    /// Sets the visualizer sync offset in seconds.
    pub fn set_lookahead(&mut self, seconds: f64) {
        if !seconds.is_finite() || seconds < 0.0 {
            return;
        }
        self.lookahead_secs = seconds;
        self.backend.set_lookahead(seconds);
    }

    /// Stops playback and releases all media.
    pub fn stop(&mut self) {
        info!("Stopping playback");
        self.backend.stop();
        self.preload = PreloadSlot::default();
        self.reset();
        self.emit(EngineEvent::StateChanged {
            is_playing: false,
            track: None,
        });
        self.emit(EngineEvent::TimeUpdated {
            current_time: 0.0,
            duration: 0.0,
        });
    }

    /// Current transport state.
    #[must_use]
    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    /// Copy of the current transport state.
    #[must_use]
    pub fn get_state(&self) -> PlaybackState {
        self.state.clone()
    }

    #[must_use]
    pub fn phase(&self) -> EnginePhase {
        self.phase
    }

    #[must_use]
    pub fn preload_slot(&self) -> &PreloadSlot {
        &self.preload
    }

    #[must_use]
    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    #[must_use]
    pub fn lookahead(&self) -> f64 {
        self.lookahead_secs
    }

    /// Whether the native service has gone away. No further events will
    /// arrive from it; a restart is required.
    #[must_use]
    pub fn service_closed(&self) -> bool {
        self.service_closed
    }

    /// Registers an observer.
    ///
    /// # Returns
    ///
    /// The subscription id (for [`Self::unsubscribe`]) and the event receiver.
    pub fn subscribe(&mut self) -> (SubscriptionId, Receiver<EngineEvent>) {
        let (tx, rx) = unbounded();
        let id = self.next_subscription;
        self.next_subscription += 1;
        self.subscribers.push((id, tx));
        (id, rx)
    }

    /// Removes an observer.
    ///
    /// # Returns
    ///
    /// `true` if the subscription existed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(existing, _)| *existing != id);
        self.subscribers.len() != before
    }

    /// Another receiver for this controller's backend events.
    #[must_use]
    pub fn backend_events(&self) -> Receiver<BackendEvent> {
        self.backend_events.clone()
    }

    /// Lets the backend advance non-event-driven state.
    pub fn poll_backend(&mut self) {
        self.backend.poll();
    }

    /// Handles every backend event queued so far.
    ///
    /// # Returns
    ///
    /// The number of events handled.
    pub fn drain_backend_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.backend_events.try_recv() {
            self.handle_backend_event(event);
            handled += 1;
        }
        handled
    }

    /// Applies one backend event to the controller state.
    pub fn handle_backend_event(&mut self, event: BackendEvent) {
        match event {
            BackendEvent::Loaded {
                track_id,
                duration,
                playing,
            } => self.on_loaded(track_id, duration, playing),
            BackendEvent::Preloaded { track_id } => {
                if self.preload.track.as_ref().is_some_and(|t| t.id == track_id) {
                    debug!(track_id, "Preload ready");
                    self.preload.ready = true;
                } else {
                    debug!(track_id, "Ignoring stale preload confirmation");
                }
            }
            BackendEvent::Tick {
                current_time,
                duration,
                playing,
            } => self.on_tick(current_time, duration, playing),
            BackendEvent::TrackEnded { track_id } => self.on_track_ended(track_id),
            BackendEvent::TrackChanged { track_id, duration } => {
                self.on_track_changed(track_id, duration);
            }
            BackendEvent::Error { track_id, error } => self.on_error(track_id, error),
            BackendEvent::Spectrum(frame) => self.emit(EngineEvent::Spectrum(frame)),
            BackendEvent::ServiceClosed => {
                warn!("Native audio service closed; playback requires a restart");
                self.service_closed = true;
            }
        }
    }

    fn on_loaded(&mut self, track_id: i64, duration: f64, playing: bool) {
        if self.phase != EnginePhase::Loading || !self.is_current(track_id) {
            debug!(track_id, "Ignoring load completion for superseded track");
            return;
        }

        let playing = playing || self.auto_play;
        if duration > 0.0 {
            self.state.duration = duration;
        }
        self.state.is_playing = playing;
        self.phase = if playing {
            EnginePhase::Playing
        } else {
            EnginePhase::Paused
        };
        debug!(track_id, duration, playing, "Track loaded");

        self.emit(EngineEvent::StateChanged {
            is_playing: playing,
            track: self.state.current_track.clone(),
        });
        self.emit(EngineEvent::TimeUpdated {
            current_time: self.state.current_time,
            duration: self.state.duration,
        });
    }

    fn on_tick(&mut self, current_time: f64, duration: f64, playing: bool) {
        if matches!(self.phase, EnginePhase::Idle | EnginePhase::Loading) {
            return;
        }

        if self
            .toggle_in_flight
            .is_some_and(|(_, target)| target == playing)
        {
            self.toggle_in_flight = None;
        }
        if self.phase == EnginePhase::Transitioning && playing {
            self.phase = EnginePhase::Playing;
        }

        self.state.current_time = current_time;
        if duration > 0.0 {
            self.state.duration = duration;
        }
        self.emit(EngineEvent::TimeUpdated {
            current_time,
            duration: self.state.duration,
        });
    }

    fn on_track_ended(&mut self, track_id: Option<i64>) {
        if let Some(id) = track_id
            && !self.is_current(id)
        {
            debug!(track_id = id, "Ignoring end of a track that is no longer current");
            return;
        }
        // Without an id the end can only be matched by phase: a late notice
        // for the outgoing track lands while the next one loads or takes over.
        if track_id.is_none()
            && !matches!(self.phase, EnginePhase::Playing | EnginePhase::Paused)
        {
            debug!(phase = ?self.phase, "Ignoring unattributed track end");
            return;
        }
        if self.preload.ready && self.preload.track.is_some() {
            debug!("Track ended with a ready preload, awaiting handoff");
            return;
        }
        let Some(finished) = self.state.current_track.take() else {
            return;
        };

        info!(track_id = finished.id, "Queue exhausted");
        self.preload = PreloadSlot::default();
        self.reset();

        self.emit(EngineEvent::TrackEnded(finished));
        self.emit(EngineEvent::StateChanged {
            is_playing: false,
            track: None,
        });
        self.emit(EngineEvent::TimeUpdated {
            current_time: 0.0,
            duration: 0.0,
        });
    }

    fn on_track_changed(&mut self, track_id: i64, duration: f64) {
        if self.is_current(track_id) {
            debug!(track_id, "Duplicate track change, refreshing duration only");
            if duration > 0.0 {
                self.state.duration = duration;
            }
            if self.phase == EnginePhase::Transitioning {
                self.phase = EnginePhase::Playing;
            }
            self.emit(EngineEvent::TimeUpdated {
                current_time: self.state.current_time,
                duration: self.state.duration,
            });
            return;
        }

        let Some(incoming) = self
            .preload
            .track
            .take_if(|preloaded| preloaded.id == track_id)
        else {
            warn!(track_id, "Ignoring change to a track that was never preloaded");
            return;
        };
        self.preload.ready = false;

        info!(track_id, "Gapless handoff to preloaded track");
        let outgoing = self.state.current_track.replace(incoming.clone());
        self.state.is_playing = true;
        self.state.current_time = 0.0;
        self.state.duration = if duration > 0.0 {
            duration
        } else {
            incoming.duration
        };
        self.phase = EnginePhase::Playing;
        self.toggle_in_flight = None;

        if let Some(outgoing) = outgoing {
            self.emit(EngineEvent::TrackEnded(outgoing));
        }
        self.emit(EngineEvent::StateChanged {
            is_playing: true,
            track: Some(incoming),
        });
        self.emit(EngineEvent::TimeUpdated {
            current_time: 0.0,
            duration: self.state.duration,
        });
    }

    fn on_error(&mut self, track_id: Option<i64>, error: PlaybackError) {
        if let Some(id) = track_id
            && !self.is_current(id)
        {
            if self.preload.track.as_ref().is_some_and(|t| t.id == id) {
                warn!(track_id = id, error = %error, "Preload failed");
                self.preload = PreloadSlot::default();
            } else {
                debug!(track_id = id, error = %error, "Ignoring error for a superseded track");
            }
            return;
        }
        if let (Some(path), Some(preloaded)) = (error.path(), self.preload.track.as_ref())
            && path == preloaded.audio_path
            && !self
                .state
                .current_track
                .as_ref()
                .is_some_and(|current| current.audio_path == path)
        {
            warn!(track_id = preloaded.id, error = %error, "Preload failed");
            self.preload = PreloadSlot::default();
            return;
        }

        warn!(error = %error, "Playback error");
        let track = self.state.current_track.take();
        let path = error
            .path()
            .map(str::to_string)
            .or_else(|| track.as_ref().map(|t| t.audio_path.clone()));
        self.reset();

        self.emit(EngineEvent::Error(ErrorInfo {
            message: error.to_string(),
            path,
            track,
        }));
        self.emit(EngineEvent::StateChanged {
            is_playing: false,
            track: None,
        });
    }

    /// Whether playback is on or has been requested for the loading track.
    fn wants_playback(&self) -> bool {
        if self.phase == EnginePhase::Loading {
            self.auto_play
        } else {
            self.state.is_playing
        }
    }

    fn is_current(&self, track_id: i64) -> bool {
        self.state
            .current_track
            .as_ref()
            .is_some_and(|track| track.id == track_id)
    }

    /// Returns to idle, keeping the volume.
    fn reset(&mut self) {
        self.state = PlaybackState {
            volume: self.state.volume,
            ..PlaybackState::default()
        };
        self.phase = EnginePhase::Idle;
        self.auto_play = false;
        self.toggle_in_flight = None;
    }

    fn emit(&mut self, event: EngineEvent) {
        self.subscribers
            .retain(|(_, tx)| tx.try_send(event.clone()).is_ok());
    }
}

/// Starts the native backend when enabled, logging why it was not.
async fn start_native(
    settings: &EngineSettings,
    events: Sender<BackendEvent>,
) -> Option<NativeBackend> {
    if !settings.use_native_audio {
        return None;
    }
    let Some(path) = settings.native_service_path.as_deref() else {
        warn!("Native audio enabled without a service path, using dual-buffer backend");
        return None;
    };

    match NativeBackend::spawn(path, settings.handshake_timeout(), events).await {
        Ok(native) => Some(native),
        Err(e) => {
            warn!(error = %e, "Native audio unavailable, falling back to dual-buffer backend");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use async_channel::{Receiver, unbounded};

    use crate::{
        audio::{
            backend::{BackendEvent, native::NativeBackend, protocol::ServiceRequest},
            engine::{EngineEvent, EnginePhase, PlaybackController},
        },
        test_support::{drain, track},
    };

    fn controller() -> (PlaybackController, Receiver<ServiceRequest>) {
        let (req_tx, req_rx) = unbounded();
        let (_events_tx, events_rx) = unbounded();
        let backend = NativeBackend::from_channel(req_tx);
        (
            PlaybackController::with_backend(Box::new(backend), events_rx),
            req_rx,
        )
    }

    #[test]
    fn test_load_and_play_reaches_playing() {
        let (mut engine, requests) = controller();
        let (_, events) = engine.subscribe();

        engine.load_and_play(track(1, 180.0), true);
        assert_eq!(engine.phase(), EnginePhase::Loading);
        assert!(matches!(
            requests.try_recv().unwrap(),
            ServiceRequest::Load { track_id: 1, .. }
        ));

        engine.handle_backend_event(BackendEvent::Loaded {
            track_id: 1,
            duration: 181.5,
            playing: false,
        });
        assert_eq!(engine.phase(), EnginePhase::Playing);
        assert!(engine.state().is_playing);
        assert_eq!(engine.state().duration, 181.5);

        let received = drain(&events);
        assert!(received.contains(&EngineEvent::StateChanged {
            is_playing: true,
            track: Some(track(1, 180.0)),
        }));
    }

    #[test]
    fn test_stale_load_is_ignored() {
        let (mut engine, _requests) = controller();
        engine.load_and_play(track(1, 180.0), true);
        engine.load_and_play(track(2, 200.0), true);

        engine.handle_backend_event(BackendEvent::Loaded {
            track_id: 1,
            duration: 180.0,
            playing: true,
        });
        assert_eq!(engine.phase(), EnginePhase::Loading);
        assert_eq!(engine.state().current_track.as_ref().map(|t| t.id), Some(2));
    }

    #[test]
    fn test_ticks_ignored_while_loading() {
        let (mut engine, _requests) = controller();
        engine.load_and_play(track(1, 180.0), true);
        engine.handle_backend_event(BackendEvent::Tick {
            current_time: 170.0,
            duration: 180.0,
            playing: true,
        });
        assert_eq!(engine.state().current_time, 0.0);
    }

    #[test]
    fn test_pause_during_load_cancels_autoplay() {
        let (mut engine, requests) = controller();
        engine.load_and_play(track(1, 180.0), true);
        engine.pause();
        drain(&requests);

        engine.handle_backend_event(BackendEvent::Loaded {
            track_id: 1,
            duration: 180.0,
            playing: false,
        });
        assert_eq!(engine.phase(), EnginePhase::Paused);
        assert!(!engine.state().is_playing);
    }

    #[test]
    fn test_volume_and_lookahead_validation() {
        let (mut engine, requests) = controller();
        engine.set_volume(1.7);
        assert_eq!(engine.state().volume, 1.0);
        engine.set_volume(f32::NAN);
        assert_eq!(engine.state().volume, 1.0);
        engine.set_volume(-0.2);
        assert_eq!(engine.state().volume, 0.0);

        engine.set_lookahead(-1.0);
        engine.set_lookahead(0.15);
        assert_eq!(engine.lookahead(), 0.15);

        assert_eq!(
            drain(&requests),
            vec![
                ServiceRequest::SetVolume { volume: 1.0 },
                ServiceRequest::SetVolume { volume: 0.0 },
                ServiceRequest::SetLookahead { seconds: 0.15 },
            ]
        );
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let (mut engine, _requests) = controller();
        let (id, events) = engine.subscribe();
        assert!(engine.unsubscribe(id));
        assert!(!engine.unsubscribe(id));

        engine.load_and_play(track(1, 180.0), true);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_service_closed_is_recorded() {
        let (mut engine, _requests) = controller();
        engine.load_and_play(track(1, 180.0), true);
        engine.handle_backend_event(BackendEvent::ServiceClosed);
        assert!(engine.service_closed());
        assert_eq!(engine.state().current_track.as_ref().map(|t| t.id), Some(1));
    }
}
