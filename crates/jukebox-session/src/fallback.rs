//! Default-source fallback loading.
//!
//! When the fair queue runs dry the session asks a resolver for the
//! session's configured default source and starts loading it. Loading is
//! asynchronous; resolved tracks re-enter the session through a
//! [`ResolveSink`], which re-checks live state on every delivery.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::models::Track;
use crate::session::SessionHandle;

/// Looks up configured fallback sources by id.
pub trait SourceResolver: Send + Sync {
    /// Open a source for loading.
    ///
    /// `None` covers every flavor of absence: unknown id, misconfigured
    /// source, or a source with nothing to offer. The session folds all of
    /// them into "no fallback available".
    fn open(&self, source_id: &str) -> Option<Box<dyn ResolvedSource>>;
}

/// A source ready to yield its tracks.
pub trait ResolvedSource: Send {
    /// Begin loading; tracks and completion are reported through `sink`.
    ///
    /// Must return promptly. Delivery may happen at any later time, from
    /// any thread, and may interleave with ordinary session activity.
    fn load(self: Box<Self>, sink: ResolveSink);
}

/// Where resolved fallback tracks land.
///
/// Each delivered track either starts immediately (if the session is still
/// idle) or joins the fallback list behind whatever started in the
/// meantime.
pub struct ResolveSink {
    session: SessionHandle,
    delivered: AtomicUsize,
}

impl ResolveSink {
    pub(crate) fn new(session: SessionHandle) -> Self {
        Self {
            session,
            delivered: AtomicUsize::new(0),
        }
    }

    /// Hand one resolved track to the session.
    pub fn deliver(&self, track: Track) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        self.session.accept_fallback_track(track);
    }

    /// Signal that the source has no more tracks.
    ///
    /// A source that delivered nothing leaves the session with nothing to
    /// play; unless stay-connected is set, that turns into a
    /// connection-close request.
    pub fn complete(self) {
        if self.delivered.load(Ordering::Relaxed) == 0 {
            self.session.fallback_yielded_nothing();
        }
    }
}
