//! Listening-time accounting.
//!
//! Converts time spent with a loaded track into recently-played entries and
//! persisted listening statistics, exactly once per listening span.

pub mod clock;
pub mod history;
pub mod ledger;
pub mod tracker;

pub use {
    clock::{Clock, SystemClock},
    history::{History, HistoryEntry},
    ledger::{LedgerError, ListenLedger, ListenRecord, SqliteLedger},
    tracker::{CeilingPolicy, CommitOutcome, ListeningSession, SessionTracker},
};
