//! Queue coordinator: queue ownership, preload policy and session driving.
//!
//! The `QueueCoordinator` owns the ordered queue and its position. It is the
//! only place preloading is triggered: every change to the queue or the
//! position re-issues a preload of the entry after the current one. It also
//! translates controller events into listening-session signals and into the
//! observable [`AppState`].

use std::time::Duration;

use {
    async_channel::Receiver,
    tokio::{
        select,
        time::{MissedTickBehavior, interval},
    },
    tracing::{debug, info},
};

use crate::{
    audio::{
        engine::{EngineEvent, EnginePhase, PlaybackController, SubscriptionId},
        track::{PlaybackQueue, Track},
    },
    config::EngineSettings,
    session::{Clock, SessionTracker},
    state::AppState,
};

/// Inbound requests from the UI or library layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Make `track` current, inserting it after the current entry if it is
    /// not queued yet.
    LoadTrack { track: Track, auto_play: bool },
    /// Load and play the queue entry at an index.
    PlayAt(usize),
    TogglePlayPause,
    Play,
    Pause,
    Seek(f64),
    /// Seek to a percentage (0 to 100) of the duration.
    SeekPercent(f64),
    SetVolume(f32),
    SetLookahead(f64),
    SkipNext,
    SkipPrev,
    Stop,
    SetQueue { tracks: Vec<Track>, position: usize },
    SetPosition(usize),
    Enqueue(Vec<Track>),
    InsertNext(Track),
    RemoveAt(usize),
    /// Flush the live session, stop and leave the event loop.
    Shutdown,
}

/// Drives the playback controller from a queue.
pub struct QueueCoordinator {
    controller: PlaybackController,
    engine_events: Receiver<EngineEvent>,
    subscription: SubscriptionId,
    queue: PlaybackQueue,
    sessions: SessionTracker,
    app_state: AppState,
    clock: Box<dyn Clock>,
    /// Seconds into a track after which "previous" restarts it.
    restart_threshold: f64,
    poll_interval: Duration,
}

impl QueueCoordinator {
    /// Creates a coordinator with an empty queue.
    ///
    /// # Arguments
    ///
    /// * `controller` - Playback controller to drive
    /// * `sessions` - Listening-session tracker
    /// * `app_state` - Observable state to keep in sync
    /// * `clock` - Time source for session accounting
    /// * `settings` - Engine settings (restart threshold, poll interval)
    ///
    /// # Returns
    ///
    /// A new `QueueCoordinator`.
    #[must_use]
    pub fn new(
        mut controller: PlaybackController,
        sessions: SessionTracker,
        app_state: AppState,
        clock: Box<dyn Clock>,
        settings: &EngineSettings,
    ) -> Self {
        let (subscription, engine_events) = controller.subscribe();
        app_state.update_volume(controller.state().volume);

        Self {
            controller,
            engine_events,
            subscription,
            queue: PlaybackQueue::default(),
            sessions,
            app_state,
            clock,
            restart_threshold: settings.restart_threshold_secs,
            poll_interval: settings.poll_interval(),
        }
    }

    /// Replaces the queue without loading anything.
    pub fn set_queue(&mut self, tracks: Vec<Track>, position: usize) {
        self.queue = PlaybackQueue::new(tracks, position);
        self.sync_queue();
        self.process_pending();
    }

    /// Moves the position without loading anything.
    pub fn set_position(&mut self, index: usize) {
        if self.queue.set_position(index) {
            self.sync_queue();
            self.process_pending();
        }
    }

    /// Appends tracks to the queue.
    pub fn enqueue(&mut self, tracks: Vec<Track>) {
        self.queue.enqueue(tracks);
        self.sync_queue();
        self.process_pending();
    }

    /// Queues `track` right after the current entry.
    pub fn insert_next(&mut self, track: Track) {
        self.queue.insert_next(track);
        self.sync_queue();
        self.process_pending();
    }

    /// Removes a queue entry.
    ///
    /// Removing the entry that is loaded makes its successor current,
    /// keeping the play state; removing the last remaining entry stops.
    ///
    /// # Returns
    ///
    /// The removed track, or `None` if `index` was out of range.
    pub fn remove_at(&mut self, index: usize) -> Option<Track> {
        let loaded_id = self.loaded_track_id();
        let removing_loaded = index == self.queue.position
            && loaded_id.is_some()
            && self.queue.current().map(|t| t.id) == loaded_id;

        let removed = self.queue.remove_at(index)?;
        if removing_loaded {
            let was_playing = self.controller.state().is_playing;
            match self.queue.current().cloned() {
                Some(track) => self.start_track(track, was_playing),
                None => self.stop_playback(),
            }
        }

        self.sync_queue();
        self.process_pending();
        Some(removed)
    }

    /// Loads and plays the entry at `index`.
    pub fn play_at(&mut self, index: usize) {
        if !self.queue.set_position(index) {
            debug!(index, "play_at out of range");
            return;
        }
        if let Some(track) = self.queue.current().cloned() {
            self.start_track(track, true);
        }
        self.sync_queue();
        self.process_pending();
    }

    /// Makes `track` current and loads it.
    pub fn load_track(&mut self, track: Track, auto_play: bool) {
        match self.queue.index_of(track.id) {
            Some(index) => {
                self.queue.set_position(index);
            }
            None => {
                let was_empty = self.queue.is_empty();
                self.queue.insert_next(track.clone());
                if !was_empty {
                    self.queue.advance();
                }
            }
        }

        self.start_track(track, auto_play);
        self.sync_queue();
        self.process_pending();
    }

    pub fn toggle_play_pause(&mut self) {
        self.controller.toggle_play_pause();
        self.process_pending();
    }

    pub fn play(&mut self) {
        self.controller.play();
        self.process_pending();
    }

    pub fn pause(&mut self) {
        self.controller.pause();
        self.process_pending();
    }

    pub fn seek(&mut self, position: f64) {
        self.controller.seek(position);
        self.process_pending();
    }

    pub fn seek_percent(&mut self, percent: f64) {
        self.controller.seek_percent(percent);
        self.process_pending();
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.controller.set_volume(volume);
        self.app_state.update_volume(self.controller.state().volume);
    }

    pub fn set_lookahead(&mut self, seconds: f64) {
        self.controller.set_lookahead(seconds);
    }

    /// Moves to the next entry.
    ///
    /// With a next entry, a session is opened for it (committing the current
    /// one) and the preloaded media is switched to, or loaded if it was not
    /// ready. Without one, the session is committed and playback paused so
    /// the last track stays current.
    pub fn skip_next(&mut self) {
        let now = self.clock.now();
        let Some(next) = self.queue.next().cloned() else {
            debug!("skip_next at end of queue, pausing");
            self.sessions.commit(false, now);
            self.controller.pause();
            self.process_pending();
            return;
        };

        self.sessions.start(&next, now);
        if !self.controller.play_next() {
            self.controller.load_and_play(next, true);
        }
        self.queue.advance();
        self.sync_queue();
        self.process_pending();
    }

    /// Restarts the current track, or moves to the previous entry when
    /// within the restart threshold of the start.
    ///
    /// At the first entry the current track is always restarted.
    pub fn skip_prev(&mut self) {
        let current_time = self.controller.state().current_time;
        let previous = self.queue.previous().cloned();

        match previous {
            Some(previous) if current_time <= self.restart_threshold => {
                self.queue.retreat();
                self.start_track(previous, true);
                self.sync_queue();
            }
            _ => self.controller.seek(0.0),
        }
        self.process_pending();
    }

    /// Commits the live session and stops playback.
    pub fn stop(&mut self) {
        self.stop_playback();
        self.process_pending();
    }

    /// Best-effort flush before exit.
    ///
    /// Commits the live session with the shutdown ceiling, stops playback
    /// and detaches from the controller.
    pub fn shutdown(&mut self) {
        let now = self.clock.now();
        if let Some(outcome) = self.sessions.commit_on_shutdown(now) {
            info!(track_id = outcome.track_id, seconds = outcome.seconds, "Flushed session on shutdown");
        }
        self.controller.stop();
        self.process_pending();
        self.controller.unsubscribe(self.subscription);
    }

    /// Applies one inbound command.
    ///
    /// # Returns
    ///
    /// `false` if the command asks to leave the event loop.
    pub fn execute(&mut self, command: Command) -> bool {
        match command {
            Command::LoadTrack { track, auto_play } => self.load_track(track, auto_play),
            Command::PlayAt(index) => self.play_at(index),
            Command::TogglePlayPause => self.toggle_play_pause(),
            Command::Play => self.play(),
            Command::Pause => self.pause(),
            Command::Seek(position) => self.seek(position),
            Command::SeekPercent(percent) => self.seek_percent(percent),
            Command::SetVolume(volume) => self.set_volume(volume),
            Command::SetLookahead(seconds) => self.set_lookahead(seconds),
            Command::SkipNext => self.skip_next(),
            Command::SkipPrev => self.skip_prev(),
            Command::Stop => self.stop(),
            Command::SetQueue { tracks, position } => self.set_queue(tracks, position),
            Command::SetPosition(index) => self.set_position(index),
            Command::Enqueue(tracks) => self.enqueue(tracks),
            Command::InsertNext(track) => self.insert_next(track),
            Command::RemoveAt(index) => {
                self.remove_at(index);
            }
            Command::Shutdown => return false,
        }
        true
    }

    /// Runs the event loop until a `Shutdown` command arrives or every
    /// command sender is gone, then flushes with [`Self::shutdown`].
    ///
    /// Commands, backend events and periodic backend polling are all
    /// handled on the calling task, one at a time.
    pub async fn run(&mut self, commands: Receiver<Command>) {
        let backend_events = self.controller.backend_events();
        let mut backend_open = true;
        let mut poll = interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(backend = %self.controller.backend_kind(), "Queue coordinator running");
        loop {
            select! {
                command = commands.recv() => match command {
                    Ok(command) => {
                        if !self.execute(command) {
                            break;
                        }
                    }
                    Err(_) => break,
                },
                event = backend_events.recv(), if backend_open => match event {
                    Ok(event) => {
                        self.controller.handle_backend_event(event);
                        self.process_pending();
                    }
                    Err(_) => {
                        debug!("Backend event channel closed");
                        backend_open = false;
                    }
                },
                _ = poll.tick() => {
                    self.controller.poll_backend();
                    self.process_pending();
                }
            }
        }

        self.shutdown();
    }

    #[must_use]
    pub fn queue(&self) -> &PlaybackQueue {
        &self.queue
    }

    #[must_use]
    pub fn controller(&self) -> &PlaybackController {
        &self.controller
    }

    /// Mutable access to the controller, for injecting backend events.
    pub fn controller_mut(&mut self) -> &mut PlaybackController {
        &mut self.controller
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionTracker {
        &self.sessions
    }

    #[must_use]
    pub fn app_state(&self) -> &AppState {
        &self.app_state
    }

    /// Handles every queued backend and controller event, including events
    /// raised while handling earlier ones.
    pub fn process_pending(&mut self) {
        loop {
            let backend = self.controller.drain_backend_events();
            let mut engine = 0;
            while let Ok(event) = self.engine_events.try_recv() {
                self.handle_engine_event(event);
                engine += 1;
            }
            if backend == 0 && engine == 0 {
                break;
            }
        }
    }

    fn handle_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::StateChanged { is_playing, track } => {
                self.on_state_changed(is_playing, track);
            }
            EngineEvent::TimeUpdated {
                current_time,
                duration,
            } => {
                self.app_state.update_progress(current_time, duration);
                if self.controller.state().is_playing {
                    self.sessions.tick(self.clock.now());
                }
            }
            EngineEvent::TrackEnded(track) => self.on_track_ended(&track),
            EngineEvent::Error(error) => {
                let now = self.clock.now();
                match error.track.as_ref() {
                    Some(track) => self.sessions.commit_track(track.id, false, now),
                    None => self.sessions.commit(false, now),
                };
                self.app_state.raise_error(error);
            }
            EngineEvent::Spectrum(frame) => self.app_state.update_spectrum(frame),
        }
    }

    fn on_state_changed(&mut self, is_playing: bool, track: Option<Track>) {
        let live = self.controller.state();
        if live.is_playing != is_playing
            || live.current_track.as_ref().map(|t| t.id) != track.as_ref().map(|t| t.id)
        {
            debug!("Skipping superseded state change");
            return;
        }

        self.app_state.update_playback(is_playing, track.clone());

        let now = self.clock.now();
        match track {
            Some(track) if is_playing => {
                if self.sessions.current_track_id() == Some(track.id) {
                    self.sessions.resume(now);
                } else {
                    self.sessions.start(&track, now);
                }
            }
            Some(track) => {
                if self.sessions.current_track_id() == Some(track.id) {
                    self.sessions.pause(now);
                }
            }
            None => {}
        }
    }

    fn on_track_ended(&mut self, track: &Track) {
        let now = self.clock.now();
        self.sessions.commit_track(track.id, true, now);

        if self.queue.current().is_some_and(|current| current.id == track.id)
            && self.queue.advance()
            && self.controller.phase() == EnginePhase::Idle
            && let Some(next) = self.queue.current().cloned()
        {
            info!(track_id = next.id, "Advancing to next queue entry");
            self.start_track(next, true);
        }

        self.sync_queue();
    }

    fn start_track(&mut self, track: Track, auto_play: bool) {
        self.sessions.start(&track, self.clock.now());
        self.controller.load_and_play(track, auto_play);
    }

    fn stop_playback(&mut self) {
        self.sessions.commit(false, self.clock.now());
        self.controller.stop();
    }

    fn loaded_track_id(&self) -> Option<i64> {
        self.controller.state().current_track.as_ref().map(|t| t.id)
    }

    /// Mirrors the queue and re-issues the preload of the entry after the
    /// current one.
    fn sync_queue(&mut self) {
        self.app_state.update_queue(&self.queue);
        self.controller.preload_next(self.queue.next().cloned());
    }
}
