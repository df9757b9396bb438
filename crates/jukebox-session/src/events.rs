//! In-process event bus for session notifications.
//!
//! Carries now-playing updates, queue changes, and connection-close
//! requests to whoever subscribes (display layer, connection manager).

use tokio::sync::broadcast;

use crate::models::{NowPlaying, SessionKey};

/// Notifications published by playback sessions.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The "now playing" slot changed; `None` means the session went idle.
    NowPlayingChanged {
        key: SessionKey,
        now: Option<NowPlaying>,
    },
    /// Queue contents changed (add/remove/clear).
    QueueChanged { key: SessionKey },
    /// The session exhausted all playable content and wants its connection
    /// closed.
    ConnectionCloseRequested { key: SessionKey },
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    /// Create a new event bus with a bounded broadcast channel.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self { sender }
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    pub(crate) fn now_playing_changed(&self, key: SessionKey, now: Option<NowPlaying>) {
        let _ = self.sender.send(SessionEvent::NowPlayingChanged { key, now });
    }

    pub(crate) fn queue_changed(&self, key: SessionKey) {
        let _ = self.sender.send(SessionEvent::QueueChanged { key });
    }

    pub(crate) fn connection_close_requested(&self, key: SessionKey) {
        let _ = self.sender.send(SessionEvent::ConnectionCloseRequested { key });
    }
}
