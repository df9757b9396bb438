//! Player abstraction driven by the session.
//!
//! Implementations own decoding and the single "now playing" slot; the
//! session issues commands and reacts to the lifecycle signals the embedder
//! relays back.

use crate::models::QueuedTrack;

/// One fixed-duration unit of encoded audio handed to the transport.
///
/// The payload encoding is the player's business; the session treats it as
/// an opaque blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    pub data: Vec<u8>,
}

/// Why the active track left the player slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackEndReason {
    /// Ran to completion.
    Finished,
    /// A new track took over the slot directly.
    Replaced,
    /// Stopped on request (skip flows arrive this way).
    Stopped,
    /// The item could not be loaded or decoded.
    LoadFailed,
    /// The player was torn down.
    Cleanup,
}

/// Single-slot playback backend.
///
/// The player holds at most one active track and emits start/end signals on
/// its own dispatch. The embedder relays those signals to
/// [`SessionHandle::on_track_start`] and [`SessionHandle::on_track_end`],
/// strictly serialized per session. By the time an end signal is delivered
/// the slot is empty again (or already refilled by a replacement track).
///
/// `stop` is silent: implementations must not emit an end signal for a
/// track stopped through it. [`SessionHandle::clear_and_stop`] relies on
/// this to keep an unconditional stop from re-entering the advance path.
///
/// [`SessionHandle::on_track_start`]: crate::session::SessionHandle::on_track_start
/// [`SessionHandle::on_track_end`]: crate::session::SessionHandle::on_track_end
/// [`SessionHandle::clear_and_stop`]: crate::session::SessionHandle::clear_and_stop
pub trait Player: Send {
    /// Begin playing `track`, replacing any slot contents.
    fn play(&mut self, track: QueuedTrack);

    /// Silently stop and empty the slot.
    fn stop(&mut self);

    fn is_paused(&self) -> bool;

    fn set_paused(&mut self, paused: bool);

    /// Output volume in percent.
    fn volume(&self) -> u8;

    /// The track currently occupying the slot.
    ///
    /// Returned by value: implementations usually keep their slot behind a
    /// lock shared with a decode thread.
    fn current(&self) -> Option<QueuedTrack>;

    /// Pull the next encoded frame; `None` when no audio is ready.
    ///
    /// Must return promptly: the transport polls on a cadence of tens of
    /// milliseconds and a late frame is indistinguishable from silence.
    fn next_frame(&mut self) -> Option<AudioFrame>;
}
