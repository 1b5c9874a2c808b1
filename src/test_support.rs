//! Fakes shared by the unit and scenario tests.

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
    time::{Duration, Instant},
};

use {async_channel::Receiver, parking_lot::Mutex};

use crate::{
    audio::{
        media::{MediaHandle, MediaStatus},
        track::Track,
    },
    session::{
        Clock,
        ledger::{LedgerError, ListenLedger, ListenRecord},
    },
};

/// A track with predictable path, album and artist.
pub fn track(id: i64, duration: f64) -> Track {
    Track {
        id,
        title: format!("Track {id}"),
        artist: "Test Artist".to_string(),
        album_id: 100,
        audio_path: format!("/music/{id}.flac"),
        duration,
    }
}

/// Everything currently queued on a channel.
pub fn drain<T>(rx: &Receiver<T>) -> Vec<T> {
    let mut items = Vec::new();
    while let Ok(item) = rx.try_recv() {
        items.push(item);
    }
    items
}

#[derive(Debug, Default)]
struct FakeMediaState {
    status: MediaStatus,
    path: Option<String>,
    loads: usize,
    playing: bool,
    position: f64,
    duration: f64,
    volume: f32,
}

/// Media handle whose loading and playback are driven by the test.
pub struct FakeMedia {
    state: Rc<RefCell<FakeMediaState>>,
}

/// Test-side view of a [`FakeMedia`].
#[derive(Clone)]
pub struct FakeMediaProbe {
    state: Rc<RefCell<FakeMediaState>>,
}

impl FakeMedia {
    pub fn new() -> (Self, FakeMediaProbe) {
        let state = Rc::new(RefCell::new(FakeMediaState::default()));
        (
            Self {
                state: Rc::clone(&state),
            },
            FakeMediaProbe { state },
        )
    }
}

impl MediaHandle for FakeMedia {
    fn begin_load(&mut self, path: &str) {
        let mut state = self.state.borrow_mut();
        state.status = MediaStatus::Loading;
        state.path = Some(path.to_string());
        state.loads += 1;
        state.playing = false;
        state.position = 0.0;
        state.duration = 0.0;
    }

    fn status(&mut self) -> MediaStatus {
        self.state.borrow().status.clone()
    }

    fn play(&mut self) {
        let mut state = self.state.borrow_mut();
        if state.status == MediaStatus::Ready {
            state.playing = true;
        }
    }

    fn pause(&mut self) {
        self.state.borrow_mut().playing = false;
    }

    fn seek(&mut self, position: f64) {
        self.state.borrow_mut().position = position;
    }

    fn set_volume(&mut self, volume: f32) {
        self.state.borrow_mut().volume = volume;
    }

    fn position(&self) -> f64 {
        self.state.borrow().position
    }

    fn duration(&self) -> f64 {
        self.state.borrow().duration
    }

    fn unload(&mut self) {
        let mut state = self.state.borrow_mut();
        state.status = MediaStatus::Empty;
        state.path = None;
        state.playing = false;
        state.position = 0.0;
        state.duration = 0.0;
    }
}

impl FakeMediaProbe {
    /// Completes the pending load.
    pub fn finish_load(&self, duration: f64) {
        let mut state = self.state.borrow_mut();
        state.status = MediaStatus::Ready;
        state.duration = duration;
    }

    /// Fails the pending load (or the loaded media).
    pub fn fail_load(&self, reason: &str) {
        let mut state = self.state.borrow_mut();
        state.status = MediaStatus::Failed(reason.to_string());
        state.playing = false;
    }

    /// Plays the media to its end.
    pub fn end(&self) {
        let mut state = self.state.borrow_mut();
        state.status = MediaStatus::Ended;
        state.position = state.duration;
        state.playing = false;
    }

    pub fn set_position(&self, position: f64) {
        self.state.borrow_mut().position = position;
    }

    pub fn loaded_path(&self) -> Option<String> {
        self.state.borrow().path.clone()
    }

    pub fn load_count(&self) -> usize {
        self.state.borrow().loads
    }

    pub fn is_playing(&self) -> bool {
        self.state.borrow().playing
    }

    pub fn status(&self) -> MediaStatus {
        self.state.borrow().status.clone()
    }

    pub fn position(&self) -> f64 {
        self.state.borrow().position
    }

    pub fn volume(&self) -> f32 {
        self.state.borrow().volume
    }
}

/// Clock advanced explicitly by the test.
#[derive(Clone)]
pub struct ManualClock {
    now: Rc<Cell<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Rc::new(Cell::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    pub fn now(&self) -> Instant {
        self.now.get()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.get()
    }
}

/// Ledger that keeps records in memory, or rejects them.
#[derive(Default)]
pub struct RecordingLedger {
    records: Mutex<Vec<ListenRecord>>,
    failing: bool,
}

impl RecordingLedger {
    pub fn failing() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            failing: true,
        }
    }

    pub fn records(&self) -> Vec<ListenRecord> {
        self.records.lock().clone()
    }
}

impl ListenLedger for RecordingLedger {
    fn record_listen(&self, record: ListenRecord) -> Result<(), LedgerError> {
        if self.failing {
            return Err(LedgerError::Closed);
        }
        self.records.lock().push(record);
        Ok(())
    }
}
