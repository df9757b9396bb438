//! Core value types shared across the session crate.

use serde::{Deserialize, Serialize};

use fair_queue::Submitter;

/// Identity of the user who requested a track; `0` means autoplay / no one.
pub type RequesterId = u64;

/// Identifies one playback destination (a voice channel, room, ...).
pub type SessionKey = u64;

/// One playable audio item.
///
/// The session core never interprets `source_url`; resolving and decoding
/// it is the player's job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    /// Location the player will decode (URL or file path).
    pub source_url: String,
    /// Display title.
    pub title: String,
    /// Duration in milliseconds, when known.
    pub duration_ms: Option<u64>,
}

/// A track paired with the identity of whoever requested it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedTrack {
    pub track: Track,
    pub requester: RequesterId,
}

impl QueuedTrack {
    pub fn new(track: Track, requester: RequesterId) -> Self {
        Self { track, requester }
    }

    /// A track with no human requester (fallback/autoplay content).
    pub fn autoplay(track: Track) -> Self {
        Self {
            track,
            requester: 0,
        }
    }
}

impl Submitter for QueuedTrack {
    fn submitter(&self) -> u64 {
        self.requester
    }
}

/// Where an enqueued track ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Nothing was playing; the track started immediately.
    StartedNow,
    /// Forced to the front of the queue; plays right after the current track.
    NextUp,
    /// Queued at the given 1-based fairness position.
    Queued(usize),
}

/// Snapshot of the active playback slot for display layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NowPlaying {
    pub track: Track,
    /// Requester of the active track; `0` for fallback/autoplay items.
    pub requester: RequesterId,
    pub paused: bool,
    /// Player volume in percent.
    pub volume: u8,
}
