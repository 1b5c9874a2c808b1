//! Track descriptors and the ordered playback queue.

use serde::{Deserialize, Serialize};

/// Immutable description of a playable track.
///
/// Identity is `id`; two descriptors with the same `id` refer to the same
/// track even if other fields differ.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Track {
    /// Unique library ID.
    pub id: i64,
    /// Track title.
    pub title: String,
    /// Display artist.
    pub artist: String,
    /// ID of the associated album.
    pub album_id: i64,
    /// File system path to the audio file.
    pub audio_path: String,
    /// Duration in seconds as known by the library (0 when unknown).
    pub duration: f64,
}

/// Ordered sequence of tracks plus the index of the current one.
///
/// When non-empty, `position` always satisfies `position < tracks.len()`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlaybackQueue {
    /// Tracks in playback order.
    pub tracks: Vec<Track>,
    /// Index of the current track.
    pub position: usize,
}

impl PlaybackQueue {
    /// Creates a queue, clamping `position` into range.
    ///
    /// # Arguments
    ///
    /// * `tracks` - Tracks in playback order
    /// * `position` - Requested index of the current track
    ///
    /// # Returns
    ///
    /// A new `PlaybackQueue`.
    #[must_use]
    pub fn new(tracks: Vec<Track>, position: usize) -> Self {
        let position = position.min(tracks.len().saturating_sub(1));
        Self { tracks, position }
    }

    /// The track at `position`, if any.
    #[must_use]
    pub fn current(&self) -> Option<&Track> {
        self.tracks.get(self.position)
    }

    /// The track at `position + 1`, if any.
    #[must_use]
    pub fn next(&self) -> Option<&Track> {
        self.tracks.get(self.position + 1)
    }

    /// The track at `position - 1`, if any.
    #[must_use]
    pub fn previous(&self) -> Option<&Track> {
        self.position
            .checked_sub(1)
            .and_then(|index| self.tracks.get(index))
    }

    /// Moves to the next entry.
    ///
    /// # Returns
    ///
    /// `true` if the position changed, `false` when already on the last entry.
    pub fn advance(&mut self) -> bool {
        if self.position + 1 < self.tracks.len() {
            self.position += 1;
            true
        } else {
            false
        }
    }

    /// Moves to the previous entry.
    ///
    /// # Returns
    ///
    /// `true` if the position changed, `false` when already on the first entry.
    pub fn retreat(&mut self) -> bool {
        if self.position > 0 && !self.tracks.is_empty() {
            self.position -= 1;
            true
        } else {
            false
        }
    }

    /// Sets the position if `index` is in range.
    ///
    /// # Returns
    ///
    /// `true` if `index` was valid.
    pub fn set_position(&mut self, index: usize) -> bool {
        if index < self.tracks.len() {
            self.position = index;
            true
        } else {
            false
        }
    }

    /// Appends tracks to the end of the queue.
    pub fn enqueue(&mut self, tracks: impl IntoIterator<Item = Track>) {
        self.tracks.extend(tracks);
    }

    /// Inserts a track right after the current one.
    pub fn insert_next(&mut self, track: Track) {
        let index = if self.tracks.is_empty() {
            0
        } else {
            self.position + 1
        };
        self.tracks.insert(index, track);
    }

    /// Removes the entry at `index`, keeping `position` on the same track
    /// where possible.
    ///
    /// Removing the current entry makes its successor current (or the new
    /// last entry when it was the last one).
    ///
    /// # Returns
    ///
    /// The removed track, or `None` if `index` was out of range.
    pub fn remove_at(&mut self, index: usize) -> Option<Track> {
        if index >= self.tracks.len() {
            return None;
        }

        let removed = self.tracks.remove(index);
        if index < self.position {
            self.position -= 1;
        }
        self.position = self.position.min(self.tracks.len().saturating_sub(1));
        Some(removed)
    }

    /// Index of the first entry with the given track id.
    #[must_use]
    pub fn index_of(&self, track_id: i64) -> Option<usize> {
        self.tracks.iter().position(|track| track.id == track_id)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Returns `true` if the queue has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}
