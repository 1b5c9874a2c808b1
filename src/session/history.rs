//! Bounded recently-played list.

use std::{collections::VecDeque, time::SystemTime};

use crate::audio::track::Track;

/// One finished listening span.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub track: Track,
    /// Seconds listened during the span.
    pub seconds: f64,
    /// The track played to its end.
    pub track_ended: bool,
    pub played_at: SystemTime,
}

/// Recently-played tracks, most recent first.
#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl History {
    /// Creates an empty history holding at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Adds an entry at the front, evicting the oldest beyond capacity.
    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push_front(entry);
        self.entries.truncate(self.capacity);
    }

    /// Entries from newest to oldest.
    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.front()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
