//! Playback session: one fair queue, one player slot, fallback and votes.
//!
//! The session decides what plays next. User requests interleave fairly
//! across requesters, track-end signals advance the rotation, and when the
//! queue runs dry a configured default source fills the silence. A
//! transport pulls encoded frames through the probe/fetch pair on a fixed
//! cadence.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use fair_queue::FairQueue;

use crate::events::EventBus;
use crate::fallback::{ResolveSink, SourceResolver};
use crate::models::{NowPlaying, Placement, QueuedTrack, RequesterId, SessionKey, Track};
use crate::player::{AudioFrame, Player, TrackEndReason};
use crate::settings::SettingsStore;

/// Session state derived from the player slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing playing.
    Idle,
    /// One track active.
    Playing,
    /// One track active, paused.
    Paused,
}

/// What `fallback_step` decided under the lock.
enum FallbackStep {
    /// Playback continues (fallback head started, or something raced in).
    Started,
    /// A default source is configured; resolve it outside the lock.
    Resolve(String),
    /// No fallback material exists.
    Nothing,
}

/// Per-destination playback state.
///
/// Owned exclusively by its [`SessionHandle`]; every mutation goes through
/// the handle's mutex.
pub struct PlaybackSession {
    key: SessionKey,
    queue: FairQueue<QueuedTrack>,
    /// Pre-resolved fallback tracks, played only when the queue is empty.
    fallback: Vec<Track>,
    /// Skip votes cast against the current track; cleared on every start.
    votes: HashSet<RequesterId>,
    player: Box<dyn Player>,
    settings: Arc<dyn SettingsStore>,
    events: EventBus,
    /// Last frame pulled from the player, pending fetch by the transport.
    cached_frame: Option<AudioFrame>,
    connected: bool,
}

impl PlaybackSession {
    fn state(&self) -> SessionState {
        if self.player.current().is_none() {
            SessionState::Idle
        } else if self.player.is_paused() {
            SessionState::Paused
        } else {
            SessionState::Playing
        }
    }

    fn enqueue(&mut self, queued: QueuedTrack) -> Placement {
        if self.state() == SessionState::Idle {
            debug!(key = self.key, title = %queued.track.title, "starting immediately");
            self.player.play(queued);
            return Placement::StartedNow;
        }
        let position = self.queue.add(queued);
        debug!(key = self.key, position, "request queued");
        self.events.queue_changed(self.key);
        Placement::Queued(position)
    }

    fn enqueue_front(&mut self, queued: QueuedTrack) -> Placement {
        if self.state() == SessionState::Idle {
            debug!(key = self.key, title = %queued.track.title, "starting immediately");
            self.player.play(queued);
            return Placement::StartedNow;
        }
        self.queue.push_front(queued);
        debug!(key = self.key, "request queued at front");
        self.events.queue_changed(self.key);
        Placement::NextUp
    }

    fn clear_and_stop(&mut self) {
        self.queue.clear();
        self.fallback.clear();
        self.votes.clear();
        self.cached_frame = None;
        // Player::stop is silent, so this cannot re-enter the advance path.
        self.player.stop();
        info!(key = self.key, "stopped and cleared");
        self.events.queue_changed(self.key);
        self.events.now_playing_changed(self.key, None);
    }

    fn on_track_start(&mut self, started: QueuedTrack) {
        self.votes.clear();
        info!(key = self.key, title = %started.track.title, "track started");
        let now = NowPlaying {
            track: started.track,
            requester: started.requester,
            paused: self.player.is_paused(),
            volume: self.player.volume(),
        };
        self.events.now_playing_changed(self.key, Some(now));
    }

    /// React to the end of the active track.
    ///
    /// Returns `true` when the queue is exhausted and the caller should
    /// attempt fallback playback.
    fn advance_after_end(&mut self, ended: QueuedTrack, reason: TrackEndReason) -> bool {
        debug!(key = self.key, title = %ended.track.title, ?reason, "track ended");
        if reason == TrackEndReason::Finished && self.settings.repeat_mode(self.key) {
            // finished tracks rejoin their requester's lane at the tail
            self.queue.add(ended);
            self.events.queue_changed(self.key);
        }
        if self.player.current().is_some() {
            // the slot was refilled before this signal landed
            return false;
        }
        self.cached_frame = None;
        if let Some(next) = self.queue.pull() {
            self.events.queue_changed(self.key);
            self.player.play(next);
            return false;
        }
        true
    }

    fn fallback_step(&mut self) -> FallbackStep {
        if self.state() != SessionState::Idle {
            // something started while we were deciding; nothing to do
            return FallbackStep::Started;
        }
        if !self.fallback.is_empty() {
            let track = self.fallback.remove(0);
            debug!(key = self.key, title = %track.title, "playing from fallback list");
            self.player.play(QueuedTrack::autoplay(track));
            return FallbackStep::Started;
        }
        match self.settings.default_source(self.key) {
            Some(source_id) => FallbackStep::Resolve(source_id),
            None => FallbackStep::Nothing,
        }
    }

    /// Final transition when the queue and every fallback are exhausted.
    fn go_idle_exhausted(&mut self) {
        if self.player.current().is_some() {
            // something started while fallback was being probed
            return;
        }
        self.cached_frame = None;
        self.events.now_playing_changed(self.key, None);
        if !self.settings.stay_connected() {
            info!(key = self.key, "out of content, requesting disconnect");
            self.events.connection_close_requested(self.key);
        }
        // a pause left behind by the last track must not leak into whatever
        // plays next
        self.player.set_paused(false);
    }

    fn accept_fallback_track(&mut self, track: Track) {
        if self.player.current().is_none() {
            self.player.play(QueuedTrack::autoplay(track));
        } else {
            self.fallback.push(track);
        }
    }

    fn fallback_resolution_empty(&mut self) {
        if self.player.current().is_some() {
            return;
        }
        if !self.settings.stay_connected() {
            info!(key = self.key, "fallback source was empty, requesting disconnect");
            self.events.connection_close_requested(self.key);
        }
    }

    fn can_provide_frame(&mut self) -> bool {
        if self.cached_frame.is_none() {
            self.cached_frame = self.player.next_frame();
        }
        self.cached_frame.is_some()
    }

    fn fetch_frame(&mut self) -> Option<AudioFrame> {
        self.cached_frame.take()
    }

    fn now_playing(&self) -> Option<NowPlaying> {
        self.player.current().map(|queued| NowPlaying {
            track: queued.track,
            requester: queued.requester,
            paused: self.player.is_paused(),
            volume: self.player.volume(),
        })
    }
}

/// Cloneable, shared entry point to one session.
///
/// Every mutation funnels through the internal mutex, so the command
/// dispatch path, the player's signal relay, the transport, and fallback
/// delivery can all hold clones safely.
#[derive(Clone)]
pub struct SessionHandle {
    key: SessionKey,
    inner: Arc<Mutex<PlaybackSession>>,
    resolver: Arc<dyn SourceResolver>,
}

impl SessionHandle {
    pub fn new(
        key: SessionKey,
        player: Box<dyn Player>,
        settings: Arc<dyn SettingsStore>,
        resolver: Arc<dyn SourceResolver>,
        events: EventBus,
    ) -> Self {
        let session = PlaybackSession {
            key,
            queue: FairQueue::new(),
            fallback: Vec::new(),
            votes: HashSet::new(),
            player,
            settings,
            events,
            cached_frame: None,
            connected: true,
        };
        Self {
            key,
            inner: Arc::new(Mutex::new(session)),
            resolver,
        }
    }

    pub fn key(&self) -> SessionKey {
        self.key
    }

    pub fn state(&self) -> SessionState {
        self.lock().state()
    }

    /// Queue a request, or start it immediately when nothing is playing.
    ///
    /// The returned placement carries the 1-based fairness position for
    /// "you are Nth in line" feedback.
    pub fn enqueue(&self, queued: QueuedTrack) -> Placement {
        self.lock().enqueue(queued)
    }

    /// Queue a request ahead of everything, or start it immediately when
    /// nothing is playing.
    pub fn enqueue_front(&self, queued: QueuedTrack) -> Placement {
        self.lock().enqueue_front(queued)
    }

    /// Unconditionally stop playback and drop the queue and fallback list.
    ///
    /// This is a stop, not a skip: the advance path is bypassed entirely.
    pub fn clear_and_stop(&self) {
        self.lock().clear_and_stop();
    }

    /// Relay for the player's track-start signal.
    pub fn on_track_start(&self, started: QueuedTrack) {
        self.lock().on_track_start(started);
    }

    /// Relay for the player's track-end signal; advances the session.
    pub fn on_track_end(&self, ended: QueuedTrack, reason: TrackEndReason) {
        let needs_fallback = self.lock().advance_after_end(ended, reason);
        if needs_fallback && !self.attempt_fallback() {
            self.lock().go_idle_exhausted();
        }
    }

    /// Try to keep playing from the fallback list or the default source.
    ///
    /// `true` means an attempt is underway and something may yet play;
    /// `false` means no fallback will ever produce anything. Source
    /// resolution is asynchronous, so actual playback may start later.
    pub fn attempt_fallback(&self) -> bool {
        let step = self.lock().fallback_step();
        match step {
            FallbackStep::Started => true,
            FallbackStep::Nothing => false,
            FallbackStep::Resolve(source_id) => match self.resolver.open(&source_id) {
                Some(source) => {
                    debug!(key = self.key, %source_id, "resolving default source");
                    source.load(ResolveSink::new(self.clone()));
                    true
                }
                None => false,
            },
        }
    }

    /// True when a track occupies the slot and the destination is
    /// connected.
    pub fn is_active(&self) -> bool {
        let session = self.lock();
        session.connected && session.player.current().is_some()
    }

    /// Requester of the current track; `0` when idle or playing autoplay
    /// content.
    pub fn requester_of(&self) -> RequesterId {
        self.lock()
            .player
            .current()
            .map(|queued| queued.requester)
            .unwrap_or(0)
    }

    /// Probe for a frame, caching it for the next [`fetch_frame`] call.
    ///
    /// Repeated probes never advance the player past an unfetched frame.
    ///
    /// [`fetch_frame`]: SessionHandle::fetch_frame
    pub fn can_provide_frame(&self) -> bool {
        self.lock().can_provide_frame()
    }

    /// Consume the cached frame. Only meaningful after a probe returned
    /// `true`; otherwise returns `None`.
    pub fn fetch_frame(&self) -> Option<AudioFrame> {
        self.lock().fetch_frame()
    }

    /// Record a skip vote; `false` when `user` already voted on this track.
    pub fn cast_skip_vote(&self, user: RequesterId) -> bool {
        self.lock().votes.insert(user)
    }

    /// Votes cast against the current track so far.
    pub fn skip_votes(&self) -> usize {
        self.lock().votes.len()
    }

    pub fn set_paused(&self, paused: bool) {
        self.lock().player.set_paused(paused);
    }

    pub fn is_paused(&self) -> bool {
        self.lock().player.is_paused()
    }

    pub fn volume(&self) -> u8 {
        self.lock().player.volume()
    }

    pub fn now_playing(&self) -> Option<NowPlaying> {
        self.lock().now_playing()
    }

    /// Upcoming tracks in the exact order they will play.
    pub fn upcoming(&self) -> Vec<QueuedTrack> {
        self.lock()
            .queue
            .ordered()
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn queue_len(&self) -> usize {
        self.lock().queue.len()
    }

    /// Remove the queued track at `index` in play order.
    pub fn remove_queued(&self, index: usize) -> Option<QueuedTrack> {
        let mut session = self.lock();
        let removed = session.queue.remove(index);
        if removed.is_some() {
            session.events.queue_changed(session.key);
        }
        removed
    }

    /// Drop every queued request from `user`, returning how many there were.
    pub fn remove_requests_by(&self, user: RequesterId) -> usize {
        let mut session = self.lock();
        let removed = session.queue.remove_all(user);
        if removed > 0 {
            session.events.queue_changed(session.key);
        }
        removed
    }

    /// Connection manager's side of the [`is_active`] boundary.
    ///
    /// [`is_active`]: SessionHandle::is_active
    pub fn set_connected(&self, connected: bool) {
        self.lock().connected = connected;
    }

    pub fn events(&self) -> EventBus {
        self.lock().events.clone()
    }

    pub(crate) fn accept_fallback_track(&self, track: Track) {
        self.lock().accept_fallback_track(track);
    }

    pub(crate) fn fallback_yielded_nothing(&self) {
        self.lock().fallback_resolution_empty();
    }

    fn lock(&self) -> MutexGuard<'_, PlaybackSession> {
        self.inner.lock().unwrap_or_else(|err| err.into_inner())
    }
}
