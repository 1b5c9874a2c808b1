//! In-process backend alternating between two media handles.
//!
//! One handle is active (audible) while the other is loaded with the next
//! track. Switching flips which one is active, so the next track starts from
//! already-decoded media instead of being loaded at the boundary.

use {
    async_channel::Sender,
    rodio::{OutputStream, OutputStreamBuilder},
    tracing::{debug, info, warn},
};

use crate::{
    audio::{
        backend::{Backend, BackendEvent, BackendKind},
        media::{MediaHandle, MediaStatus, SinkMedia},
        track::Track,
    },
    error::{LoadError, PlaybackError},
};

/// Track occupying the active handle.
#[derive(Debug, Clone)]
struct ActiveTrack {
    id: i64,
    path: String,
    /// Start playback when loading completes.
    auto_play: bool,
    /// `Loaded` has been reported.
    loaded: bool,
    playing: bool,
}

/// Track occupying the inactive handle.
#[derive(Debug, Clone)]
struct PreloadTarget {
    id: i64,
    path: String,
    ready: bool,
}

/// Dual-buffer backend.
pub struct DualBufferBackend {
    /// Media handles "A" and "B".
    slots: [Box<dyn MediaHandle>; 2],
    /// Index of the audible handle.
    active: usize,
    current: Option<ActiveTrack>,
    next: Option<PreloadTarget>,
    volume: f32,
    events: Sender<BackendEvent>,
    /// Keeps the output device open for the lifetime of the backend.
    _output: Option<OutputStream>,
}

impl DualBufferBackend {
    /// Opens the default output device and creates both handles on it.
    ///
    /// # Arguments
    ///
    /// * `events` - Channel receiving events from this backend
    ///
    /// # Errors
    ///
    /// Returns `PlaybackError::BackendUnavailable` if no output device can be opened.
    pub fn open_default(events: Sender<BackendEvent>) -> Result<Self, PlaybackError> {
        let mut stream = OutputStreamBuilder::open_default_stream()
            .map_err(|e| PlaybackError::unavailable(format!("no audio output device: {e}")))?;
        // rodio prints to stderr when the stream is dropped
        stream.log_on_drop(false);

        let mixer = stream.mixer().clone();
        let mut backend = Self::with_media(
            Box::new(SinkMedia::new(mixer.clone())),
            Box::new(SinkMedia::new(mixer)),
            events,
        );
        backend._output = Some(stream);
        info!("Dual-buffer backend opened default output device");
        Ok(backend)
    }

    /// Creates a backend over two arbitrary media handles.
    #[must_use]
    pub fn with_media(
        a: Box<dyn MediaHandle>,
        b: Box<dyn MediaHandle>,
        events: Sender<BackendEvent>,
    ) -> Self {
        Self {
            slots: [a, b],
            active: 0,
            current: None,
            next: None,
            volume: 1.0,
            events,
            _output: None,
        }
    }

    fn inactive(&self) -> usize {
        1 - self.active
    }

    fn emit(&self, event: BackendEvent) {
        if let Err(e) = self.events.try_send(event) {
            debug!("DualBufferBackend: Event receiver gone: {e}");
        }
    }

    fn tick(&self, playing: bool) {
        let slot = &self.slots[self.active];
        self.emit(BackendEvent::Tick {
            current_time: slot.position(),
            duration: slot.duration(),
            playing,
        });
    }

    /// Makes the preloaded handle active and starts it.
    ///
    /// # Arguments
    ///
    /// * `announce` - Report the switch as `TrackChanged` (backend-initiated)
    ///
    /// # Returns
    ///
    /// `false` if nothing ready was preloaded.
    fn promote(&mut self, announce: bool) -> bool {
        let Some(next) = self.next.take_if(|next| next.ready) else {
            return false;
        };

        let outgoing = self.active;
        self.slots[outgoing].pause();
        self.active = self.inactive();

        let duration = self.slots[self.active].duration();
        self.current = Some(ActiveTrack {
            id: next.id,
            path: next.path,
            auto_play: true,
            loaded: true,
            playing: true,
        });

        if announce {
            self.emit(BackendEvent::TrackChanged {
                track_id: next.id,
                duration,
            });
        }
        // Progress restarts before the new handle confirms playback.
        self.emit(BackendEvent::Tick {
            current_time: 0.0,
            duration,
            playing: true,
        });

        let volume = self.volume;
        let incoming = &mut self.slots[self.active];
        incoming.set_volume(volume);
        incoming.play();
        self.slots[outgoing].unload();

        debug!(track_id = next.id, announce, "Promoted preloaded track");
        true
    }

    fn poll_inactive(&mut self) {
        let inactive = self.inactive();
        let Some(next) = self.next.as_mut().filter(|next| !next.ready) else {
            return;
        };

        match self.slots[inactive].status() {
            MediaStatus::Ready => {
                next.ready = true;
                let track_id = next.id;
                self.emit(BackendEvent::Preloaded { track_id });
            }
            MediaStatus::Failed(reason) => {
                warn!(track_id = next.id, path = %next.path, reason = %reason, "Preload failed");
                self.next = None;
                self.slots[inactive].unload();
            }
            _ => {}
        }
    }

    fn poll_active(&mut self) {
        let Some(current) = self.current.clone() else {
            return;
        };

        match self.slots[self.active].status() {
            MediaStatus::Ready if !current.loaded => {
                let slot = &mut self.slots[self.active];
                let duration = slot.duration();
                if current.auto_play {
                    slot.set_volume(self.volume);
                    slot.play();
                }
                self.current = Some(ActiveTrack {
                    loaded: true,
                    playing: current.auto_play,
                    ..current.clone()
                });
                self.emit(BackendEvent::Loaded {
                    track_id: current.id,
                    duration,
                    playing: current.auto_play,
                });
            }
            MediaStatus::Ready if current.playing => self.tick(true),
            MediaStatus::Ended => {
                if !self.promote(true) {
                    self.current = None;
                    self.slots[self.active].unload();
                    self.emit(BackendEvent::TrackEnded {
                        track_id: Some(current.id),
                    });
                }
            }
            MediaStatus::Failed(reason) => {
                let error = if current.loaded {
                    PlaybackError::transport(reason)
                } else {
                    LoadError::new(current.path.clone(), reason).into()
                };
                self.current = None;
                self.slots[self.active].unload();
                self.emit(BackendEvent::Error {
                    track_id: Some(current.id),
                    error,
                });
            }
            _ => {}
        }
    }
}

impl Backend for DualBufferBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::DualBuffer
    }

    fn load(&mut self, track: &Track, auto_play: bool) {
        let (active, inactive) = (self.active, self.inactive());
        self.slots[inactive].unload();
        self.next = None;

        let slot = &mut self.slots[active];
        slot.unload();
        slot.set_volume(self.volume);
        slot.begin_load(&track.audio_path);

        self.current = Some(ActiveTrack {
            id: track.id,
            path: track.audio_path.clone(),
            auto_play,
            loaded: false,
            playing: false,
        });
    }

    fn play(&mut self) {
        let Some(current) = self.current.as_mut() else {
            return;
        };
        if !current.loaded {
            current.auto_play = true;
            return;
        }

        current.playing = true;
        self.slots[self.active].play();
        self.tick(true);
    }

    fn pause(&mut self) {
        let Some(current) = self.current.as_mut() else {
            return;
        };
        if !current.loaded {
            current.auto_play = false;
            return;
        }

        current.playing = false;
        self.slots[self.active].pause();
        self.tick(false);
    }

    fn seek(&mut self, position: f64) {
        let Some(current) = self.current.as_ref().filter(|current| current.loaded) else {
            return;
        };
        let playing = current.playing;

        let slot = &mut self.slots[self.active];
        let position = position.clamp(0.0, slot.duration().max(0.0));
        slot.seek(position);
        self.tick(playing);
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
        for slot in &mut self.slots {
            slot.set_volume(volume);
        }
    }

    fn preload(&mut self, track: Option<&Track>) {
        let inactive = self.inactive();
        let Some(track) = track else {
            if self.next.take().is_some() {
                self.slots[inactive].unload();
            }
            return;
        };

        if let Some(next) = &self.next
            && next.id == track.id
        {
            if next.ready {
                self.emit(BackendEvent::Preloaded { track_id: track.id });
            }
            return;
        }

        let slot = &mut self.slots[inactive];
        slot.unload();
        slot.begin_load(&track.audio_path);
        self.next = Some(PreloadTarget {
            id: track.id,
            path: track.audio_path.clone(),
            ready: false,
        });
    }

    fn play_next(&mut self) {
        if !self.promote(false) {
            debug!("DualBufferBackend: play_next with nothing ready, ignoring");
        }
    }

    fn stop(&mut self) {
        for slot in &mut self.slots {
            slot.unload();
        }
        self.current = None;
        self.next = None;
    }

    fn poll(&mut self) {
        self.poll_inactive();
        self.poll_active();
    }
}

#[cfg(test)]
mod tests {
    use async_channel::{Receiver, unbounded};

    use crate::{
        audio::{
            backend::{Backend, BackendEvent, BackendKind, dual_buffer::DualBufferBackend},
            media::MediaStatus,
        },
        error::{LoadError, PlaybackError},
        test_support::{FakeMedia, FakeMediaProbe, track},
    };

    fn setup() -> (
        DualBufferBackend,
        FakeMediaProbe,
        FakeMediaProbe,
        Receiver<BackendEvent>,
    ) {
        let (a, probe_a) = FakeMedia::new();
        let (b, probe_b) = FakeMedia::new();
        let (tx, rx) = unbounded();
        let backend = DualBufferBackend::with_media(Box::new(a), Box::new(b), tx);
        (backend, probe_a, probe_b, rx)
    }

    fn drain(rx: &Receiver<BackendEvent>) -> Vec<BackendEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_load_reports_duration_and_autoplays() {
        let (mut backend, a, _b, rx) = setup();
        assert_eq!(backend.kind(), BackendKind::DualBuffer);

        backend.load(&track(1, 180.0), true);
        backend.poll();
        assert!(drain(&rx).is_empty());
        assert_eq!(a.loaded_path().as_deref(), Some("/music/1.flac"));

        a.finish_load(180.0);
        backend.poll();
        assert_eq!(
            drain(&rx),
            vec![BackendEvent::Loaded {
                track_id: 1,
                duration: 180.0,
                playing: true
            }]
        );
        assert!(a.is_playing());
    }

    #[test]
    fn test_preload_then_play_next_flips_handles() {
        let (mut backend, a, b, rx) = setup();
        backend.load(&track(1, 180.0), true);
        a.finish_load(180.0);
        backend.poll();

        backend.preload(Some(&track(2, 200.0)));
        b.finish_load(200.0);
        backend.poll();
        let events = drain(&rx);
        assert!(events.contains(&BackendEvent::Preloaded { track_id: 2 }));

        a.set_position(120.0);
        backend.play_next();
        assert_eq!(
            drain(&rx),
            vec![BackendEvent::Tick {
                current_time: 0.0,
                duration: 200.0,
                playing: true
            }]
        );
        assert!(b.is_playing());
        assert_eq!(a.status(), MediaStatus::Empty);
    }

    #[test]
    fn test_natural_end_promotes_ready_preload() {
        let (mut backend, a, b, rx) = setup();
        backend.load(&track(1, 180.0), true);
        a.finish_load(180.0);
        backend.preload(Some(&track(2, 200.0)));
        b.finish_load(200.0);
        backend.poll();
        drain(&rx);

        a.end();
        backend.poll();
        let events = drain(&rx);
        assert_eq!(
            events.first(),
            Some(&BackendEvent::TrackChanged {
                track_id: 2,
                duration: 200.0
            })
        );
        assert!(!events.iter().any(|e| matches!(e, BackendEvent::TrackEnded { .. })));
        assert!(b.is_playing());
    }

    #[test]
    fn test_natural_end_without_preload_reports_once() {
        let (mut backend, a, _b, rx) = setup();
        backend.load(&track(1, 180.0), true);
        a.finish_load(180.0);
        backend.poll();
        drain(&rx);

        a.end();
        backend.poll();
        backend.poll();
        assert_eq!(
            drain(&rx),
            vec![BackendEvent::TrackEnded { track_id: Some(1) }]
        );
    }

    #[test]
    fn test_repeated_preload_is_idempotent() {
        let (mut backend, _a, b, rx) = setup();
        backend.preload(Some(&track(2, 200.0)));
        backend.preload(Some(&track(2, 200.0)));
        assert_eq!(b.load_count(), 1);

        b.finish_load(200.0);
        backend.poll();
        backend.preload(Some(&track(2, 200.0)));
        assert_eq!(b.load_count(), 1);
        assert_eq!(
            drain(&rx),
            vec![
                BackendEvent::Preloaded { track_id: 2 },
                BackendEvent::Preloaded { track_id: 2 }
            ]
        );

        backend.preload(None);
        assert_eq!(b.status(), MediaStatus::Empty);
        backend.play_next();
        assert!(drain(&rx).is_empty());
    }

    #[test]
    fn test_load_failure_is_load_error() {
        let (mut backend, a, _b, rx) = setup();
        backend.load(&track(1, 180.0), true);
        a.fail_load("file not found");
        backend.poll();
        assert_eq!(
            drain(&rx),
            vec![BackendEvent::Error {
                track_id: Some(1),
                error: LoadError::new("/music/1.flac", "file not found").into(),
            }]
        );
    }

    #[test]
    fn test_failure_after_load_is_transport_error() {
        let (mut backend, a, _b, rx) = setup();
        backend.load(&track(1, 180.0), true);
        a.finish_load(180.0);
        backend.poll();
        drain(&rx);

        a.fail_load("decode error");
        backend.poll();
        assert_eq!(
            drain(&rx),
            vec![BackendEvent::Error {
                track_id: Some(1),
                error: PlaybackError::transport("decode error"),
            }]
        );
    }

    #[test]
    fn test_failed_preload_empties_slot_silently() {
        let (mut backend, _a, b, rx) = setup();
        backend.preload(Some(&track(2, 200.0)));
        b.fail_load("unsupported format");
        backend.poll();
        assert!(drain(&rx).is_empty());
        assert_eq!(b.status(), MediaStatus::Empty);
    }

    #[test]
    fn test_transport_confirms_with_ticks() {
        let (mut backend, a, _b, rx) = setup();
        backend.load(&track(1, 180.0), false);
        a.finish_load(180.0);
        backend.poll();
        drain(&rx);
        assert!(!a.is_playing());

        backend.play();
        backend.seek(500.0);
        backend.pause();
        assert_eq!(a.position(), 180.0);
        assert_eq!(
            drain(&rx),
            vec![
                BackendEvent::Tick {
                    current_time: 0.0,
                    duration: 180.0,
                    playing: true
                },
                BackendEvent::Tick {
                    current_time: 180.0,
                    duration: 180.0,
                    playing: true
                },
                BackendEvent::Tick {
                    current_time: 180.0,
                    duration: 180.0,
                    playing: false
                },
            ]
        );
    }

    #[test]
    fn test_volume_applies_to_both_handles() {
        let (mut backend, a, b, _rx) = setup();
        backend.set_volume(0.4);
        assert_eq!(a.volume(), 0.4);
        assert_eq!(b.volume(), 0.4);
    }

    #[test]
    fn test_play_before_load_completes_autoplays() {
        let (mut backend, a, _b, rx) = setup();
        backend.load(&track(1, 180.0), false);
        backend.play();
        a.finish_load(180.0);
        backend.poll();
        assert_eq!(
            drain(&rx),
            vec![BackendEvent::Loaded {
                track_id: 1,
                duration: 180.0,
                playing: true
            }]
        );
    }
}
