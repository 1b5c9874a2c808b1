//! Listening-session accounting.
//!
//! A listening session measures how long the user actually spent with the
//! currently loaded track. Time accrues between signals (ticks, pause,
//! commit) only while the session's clock is running, and every accrued
//! delta is checked against a ceiling so that a suspended laptop or a
//! debugger pause is not mistaken for listening.
//!
//! When a session ends it is committed exactly once: to the recently-played
//! history if it was long enough or the track finished, and to the ledger
//! if it passed the (different) statistics threshold.

use std::{
    sync::Arc,
    time::{Instant, SystemTime},
};

use {
    anyhow::Error,
    serde::{Deserialize, Serialize},
    tracing::{debug, info},
};

use crate::{
    audio::track::Track,
    error::ErrorReporter,
    session::{
        history::{History, HistoryEntry},
        ledger::{ListenLedger, ListenRecord},
    },
};

/// Minimum seconds for a non-finished session to enter history.
pub const HISTORY_THRESHOLD_SECS: f64 = 10.0;

/// Minimum seconds for a session to be recorded in the ledger.
pub const LEDGER_THRESHOLD_SECS: f64 = 5.0;

/// Upper bounds on a single accrued delta, per signal source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CeilingPolicy {
    /// Periodic progress ticks.
    pub tick_secs: f64,
    /// Pause and commit, which may follow a longer silence.
    pub pause_secs: f64,
    /// Shutdown flush.
    pub shutdown_secs: f64,
}

impl Default for CeilingPolicy {
    fn default() -> Self {
        Self {
            tick_secs: 2.0,
            pause_secs: 60.0,
            shutdown_secs: 300.0,
        }
    }
}

/// Which kind of signal is closing an accrual interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Tick,
    Pause,
    Shutdown,
}

impl CeilingPolicy {
    #[must_use]
    pub fn ceiling(&self, signal: Signal) -> f64 {
        match signal {
            Signal::Tick => self.tick_secs,
            Signal::Pause => self.pause_secs,
            Signal::Shutdown => self.shutdown_secs,
        }
    }
}

/// Bookkeeping for the single live session.
#[derive(Debug, Clone, PartialEq)]
pub struct ListeningSession {
    pub track: Track,
    pub accumulated_secs: f64,
    /// When the clock last ran; `None` while paused.
    pub last_update: Option<Instant>,
}

impl ListeningSession {
    /// Adds the time since the last update if it is positive and under `ceiling`.
    fn accrue(&mut self, now: Instant, ceiling: f64) {
        let Some(last) = self.last_update else {
            return;
        };
        let delta = now.saturating_duration_since(last).as_secs_f64();
        if delta > 0.0 && delta < ceiling {
            self.accumulated_secs += delta;
        } else if delta >= ceiling {
            debug!(
                track_id = self.track.id,
                delta, ceiling, "Discarding implausible listening interval"
            );
        }
    }
}

/// Result of committing a session.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitOutcome {
    pub track_id: i64,
    pub seconds: f64,
    pub added_to_history: bool,
    /// The ledger was asked to record the listen.
    pub recorded: bool,
}

/// Owns the live listening session and its commit targets.
pub struct SessionTracker {
    session: Option<ListeningSession>,
    policy: CeilingPolicy,
    history: History,
    ledger: Arc<dyn ListenLedger>,
}

impl SessionTracker {
    /// Creates a tracker with no live session.
    ///
    /// # Arguments
    ///
    /// * `policy` - Ceilings applied to accrued deltas
    /// * `history_capacity` - Size of the recently-played list
    /// * `ledger` - Destination for listen records
    #[must_use]
    pub fn new(policy: CeilingPolicy, history_capacity: usize, ledger: Arc<dyn ListenLedger>) -> Self {
        Self {
            session: None,
            policy,
            history: History::new(history_capacity),
            ledger,
        }
    }

    /// Opens a session for `track`, committing the previous one first.
    ///
    /// # Returns
    ///
    /// The outcome of committing the superseded session, if there was one.
    pub fn start(&mut self, track: &Track, now: Instant) -> Option<CommitOutcome> {
        let previous = self.commit(false, now);
        debug!(track_id = track.id, "Listening session started");
        self.session = Some(ListeningSession {
            track: track.clone(),
            accumulated_secs: 0.0,
            last_update: Some(now),
        });
        previous
    }

    /// Accrues time for a periodic progress signal.
    pub fn tick(&mut self, now: Instant) {
        let ceiling = self.policy.tick_secs;
        if let Some(session) = self.session.as_mut()
            && session.last_update.is_some()
        {
            session.accrue(now, ceiling);
            session.last_update = Some(now);
        }
    }

    /// Stops the clock, keeping what was accumulated.
    pub fn pause(&mut self, now: Instant) {
        let ceiling = self.policy.pause_secs;
        if let Some(session) = self.session.as_mut() {
            session.accrue(now, ceiling);
            session.last_update = None;
        }
    }

    /// Restarts a stopped clock. A running clock is left alone.
    pub fn resume(&mut self, now: Instant) {
        if let Some(session) = self.session.as_mut()
            && session.last_update.is_none()
        {
            session.last_update = Some(now);
        }
    }

    /// Finalizes and clears the live session.
    ///
    /// Calling this again without a new session does nothing.
    pub fn commit(&mut self, track_ended: bool, now: Instant) -> Option<CommitOutcome> {
        self.commit_with(Signal::Pause, track_ended, now)
    }

    /// Commits the live session only if it belongs to `track_id`.
    pub fn commit_track(
        &mut self,
        track_id: i64,
        track_ended: bool,
        now: Instant,
    ) -> Option<CommitOutcome> {
        if self.current_track_id() != Some(track_id) {
            return None;
        }
        self.commit(track_ended, now)
    }

    /// Best-effort flush at process exit, using the shutdown ceiling.
    pub fn commit_on_shutdown(&mut self, now: Instant) -> Option<CommitOutcome> {
        self.commit_with(Signal::Shutdown, false, now)
    }

    #[must_use]
    pub fn current_track_id(&self) -> Option<i64> {
        self.session.as_ref().map(|session| session.track.id)
    }

    #[must_use]
    pub fn session(&self) -> Option<&ListeningSession> {
        self.session.as_ref()
    }

    #[must_use]
    pub fn history(&self) -> &History {
        &self.history
    }

    #[must_use]
    pub fn policy(&self) -> CeilingPolicy {
        self.policy
    }

    fn commit_with(
        &mut self,
        signal: Signal,
        track_ended: bool,
        now: Instant,
    ) -> Option<CommitOutcome> {
        let mut session = self.session.take()?;
        session.accrue(now, self.policy.ceiling(signal));

        let ListeningSession {
            track,
            accumulated_secs: seconds,
            ..
        } = session;

        let added_to_history = track_ended || seconds >= HISTORY_THRESHOLD_SECS;
        let recorded = seconds >= LEDGER_THRESHOLD_SECS;

        if recorded {
            let record = ListenRecord {
                track_id: track.id,
                album_id: track.album_id,
                artist: track.artist.clone(),
                seconds: seconds.floor() as u64,
            };
            if let Err(e) = self.ledger.record_listen(record) {
                ErrorReporter::warn(&Error::new(e), "Recording listen");
            }
        }

        info!(
            track_id = track.id,
            seconds, track_ended, added_to_history, recorded, "Listening session committed"
        );

        let track_id = track.id;
        if added_to_history {
            self.history.push(HistoryEntry {
                track,
                seconds,
                track_ended,
                played_at: SystemTime::now(),
            });
        }

        Some(CommitOutcome {
            track_id,
            seconds,
            added_to_history,
            recorded,
        })
    }
}
