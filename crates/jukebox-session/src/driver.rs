//! Session driver: one dispatch path for session commands.
//!
//! An alternative to calling [`SessionHandle`] from many places directly:
//! the driver funnels every mutation through a single worker thread, so
//! command handling is serialized by construction.

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use tracing::debug;

use crate::models::{Placement, QueuedTrack};
use crate::player::TrackEndReason;
use crate::session::SessionHandle;

/// Commands accepted by the driver loop.
pub enum SessionCommand {
    Enqueue {
        track: QueuedTrack,
        reply: Sender<Placement>,
    },
    EnqueueFront {
        track: QueuedTrack,
        reply: Sender<Placement>,
    },
    ClearAndStop,
    TrackStarted {
        track: QueuedTrack,
    },
    TrackEnded {
        track: QueuedTrack,
        reason: TrackEndReason,
    },
    Quit,
}

/// Handle for sending commands to a session driver thread.
#[derive(Clone)]
pub struct SessionDriverHandle {
    cmd_tx: Sender<SessionCommand>,
}

impl SessionDriverHandle {
    /// Queue a request and wait for its placement.
    ///
    /// `None` when the driver has shut down.
    pub fn enqueue(&self, track: QueuedTrack) -> Option<Placement> {
        let (reply, reply_rx) = bounded(1);
        self.cmd_tx
            .send(SessionCommand::Enqueue { track, reply })
            .ok()?;
        reply_rx.recv().ok()
    }

    /// Queue a request at the front and wait for its placement.
    pub fn enqueue_front(&self, track: QueuedTrack) -> Option<Placement> {
        let (reply, reply_rx) = bounded(1);
        self.cmd_tx
            .send(SessionCommand::EnqueueFront { track, reply })
            .ok()?;
        reply_rx.recv().ok()
    }

    pub fn clear_and_stop(&self) {
        let _ = self.cmd_tx.send(SessionCommand::ClearAndStop);
    }

    pub fn track_started(&self, track: QueuedTrack) {
        let _ = self.cmd_tx.send(SessionCommand::TrackStarted { track });
    }

    pub fn track_ended(&self, track: QueuedTrack, reason: TrackEndReason) {
        let _ = self.cmd_tx.send(SessionCommand::TrackEnded { track, reason });
    }

    /// Ask the driver loop to exit. Queued commands ahead of this one still
    /// run.
    pub fn quit(&self) {
        let _ = self.cmd_tx.send(SessionCommand::Quit);
    }
}

/// Spawn the driver thread for `session`.
pub fn spawn_session_driver(session: SessionHandle) -> SessionDriverHandle {
    let (cmd_tx, cmd_rx) = unbounded();
    std::thread::spawn(move || driver_main(session, cmd_rx));
    SessionDriverHandle { cmd_tx }
}

fn driver_main(session: SessionHandle, cmd_rx: Receiver<SessionCommand>) {
    while let Ok(cmd) = cmd_rx.recv() {
        match cmd {
            SessionCommand::Enqueue { track, reply } => {
                let _ = reply.send(session.enqueue(track));
            }
            SessionCommand::EnqueueFront { track, reply } => {
                let _ = reply.send(session.enqueue_front(track));
            }
            SessionCommand::ClearAndStop => session.clear_and_stop(),
            SessionCommand::TrackStarted { track } => session.on_track_start(track),
            SessionCommand::TrackEnded { track, reason } => {
                session.on_track_end(track, reason);
            }
            SessionCommand::Quit => break,
        }
    }
    debug!(key = session.key(), "session driver exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::fallback::{ResolvedSource, SourceResolver};
    use crate::models::{Placement, SessionKey, Track};
    use crate::player::{AudioFrame, Player};
    use crate::settings::SettingsStore;

    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    struct SlotPlayer {
        played: Arc<Mutex<Vec<String>>>,
        current: Arc<Mutex<Option<QueuedTrack>>>,
    }

    impl Player for SlotPlayer {
        fn play(&mut self, track: QueuedTrack) {
            self.played.lock().unwrap().push(track.track.title.clone());
            *self.current.lock().unwrap() = Some(track);
        }

        fn stop(&mut self) {
            *self.current.lock().unwrap() = None;
        }

        fn is_paused(&self) -> bool {
            false
        }

        fn set_paused(&mut self, _paused: bool) {}

        fn volume(&self) -> u8 {
            100
        }

        fn current(&self) -> Option<QueuedTrack> {
            self.current.lock().unwrap().clone()
        }

        fn next_frame(&mut self) -> Option<AudioFrame> {
            None
        }
    }

    struct NoSettings;

    impl SettingsStore for NoSettings {
        fn repeat_mode(&self, _key: SessionKey) -> bool {
            false
        }

        fn default_source(&self, _key: SessionKey) -> Option<String> {
            None
        }

        fn stay_connected(&self) -> bool {
            true
        }
    }

    struct NoResolver;

    impl SourceResolver for NoResolver {
        fn open(&self, _source_id: &str) -> Option<Box<dyn ResolvedSource>> {
            None
        }
    }

    struct DriverFixture {
        driver: SessionDriverHandle,
        played: Arc<Mutex<Vec<String>>>,
        slot: Arc<Mutex<Option<QueuedTrack>>>,
    }

    fn spawn_fixture() -> DriverFixture {
        let played = Arc::new(Mutex::new(Vec::new()));
        let slot = Arc::new(Mutex::new(None));
        let session = SessionHandle::new(
            3,
            Box::new(SlotPlayer {
                played: played.clone(),
                current: slot.clone(),
            }),
            Arc::new(NoSettings),
            Arc::new(NoResolver),
            EventBus::new(),
        );
        DriverFixture {
            driver: spawn_session_driver(session),
            played,
            slot,
        }
    }

    fn request(user: u64, name: &str) -> QueuedTrack {
        QueuedTrack::new(
            Track {
                source_url: format!("file:///music/{name}.flac"),
                title: name.to_string(),
                duration_ms: None,
            },
            user,
        )
    }

    fn wait_for<T>(check: impl Fn() -> Option<T>) -> T {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            if let Some(value) = check() {
                return value;
            }
            assert!(Instant::now() < deadline, "timed out waiting for driver");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn enqueue_replies_with_placement() {
        let f = spawn_fixture();

        assert_eq!(
            f.driver.enqueue(request(1, "alpha")),
            Some(Placement::StartedNow)
        );
        assert_eq!(
            f.driver.enqueue(request(2, "bravo")),
            Some(Placement::Queued(1))
        );
        assert_eq!(
            f.driver.enqueue_front(request(3, "urgent")),
            Some(Placement::NextUp)
        );
    }

    #[test]
    fn end_signals_advance_through_the_driver() {
        let f = spawn_fixture();
        f.driver.enqueue(request(1, "alpha"));
        f.driver.enqueue(request(2, "bravo"));

        // the slot empties before the end signal is relayed
        *f.slot.lock().unwrap() = None;
        f.driver.track_ended(request(1, "alpha"), TrackEndReason::Finished);

        wait_for(|| {
            let played = f.played.lock().unwrap();
            (played.len() == 2 && played[1] == "bravo").then_some(())
        });
    }

    #[test]
    fn quit_shuts_the_loop_down() {
        let f = spawn_fixture();
        f.driver.quit();

        wait_for(|| f.driver.enqueue(request(1, "alpha")).is_none().then_some(()));
    }
}
