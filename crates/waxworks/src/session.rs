//! The session contract and the keyed registry.
//!
//! A session is one unit of asynchronous work the conductor advances by a
//! bounded step each cycle. The conductor only ever sees this trait - it
//! never knows (or branches on) which variant it is holding. Removal is
//! inverted: when a session reports done, the conductor hands it the
//! registry and the session unregisters itself from whichever keyed index
//! it lives in.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use anyhow::Result;

/// Shared handle to a session. The conductor is single-threaded; the live
/// set and the keyed indices hold clones of the same handle.
pub type SessionRef = Rc<RefCell<dyn Session>>;

/// One unit of in-flight work (archive, replay, or listing).
pub trait Session {
    /// Request cooperative cancellation. Idempotent; the session observes it
    /// on a later work step and completes itself.
    fn abort(&mut self);

    /// Monotonic: once true, never reverts.
    fn is_done(&self) -> bool;

    /// Unregister from the owning keyed index, if any. Called exactly once,
    /// the first cycle `is_done()` returns true.
    fn detach(&mut self, registry: &mut SessionRegistry);

    /// One bounded increment of work. Returns the work count (zero when
    /// idle), never blocks. Only unrecoverable conditions may propagate.
    fn do_work(&mut self) -> Result<usize>;
}

/// The two keyed indices over live sessions.
///
/// Insertion happens in the conductor's handlers; removal only ever happens
/// through a session's own [`Session::detach`].
#[derive(Default)]
pub struct SessionRegistry {
    archive_by_instance: HashMap<i64, SessionRef>,
    replay_by_session: HashMap<i64, SessionRef>,
}

impl SessionRegistry {
    pub fn insert_archive(&mut self, stream_instance_id: i64, session: SessionRef) {
        self.archive_by_instance.insert(stream_instance_id, session);
    }

    pub fn archive(&self, stream_instance_id: i64) -> Option<&SessionRef> {
        self.archive_by_instance.get(&stream_instance_id)
    }

    pub fn remove_archive(&mut self, stream_instance_id: i64) {
        self.archive_by_instance.remove(&stream_instance_id);
    }

    pub fn insert_replay(&mut self, session_id: i64, session: SessionRef) {
        self.replay_by_session.insert(session_id, session);
    }

    pub fn replay(&self, session_id: i64) -> Option<&SessionRef> {
        self.replay_by_session.get(&session_id)
    }

    pub fn has_replay(&self, session_id: i64) -> bool {
        self.replay_by_session.contains_key(&session_id)
    }

    pub fn remove_replay(&mut self, session_id: i64) {
        self.replay_by_session.remove(&session_id);
    }

    pub fn is_empty(&self) -> bool {
        self.archive_by_instance.is_empty() && self.replay_by_session.is_empty()
    }

    pub fn archive_count(&self) -> usize {
        self.archive_by_instance.len()
    }

    pub fn replay_count(&self) -> usize {
        self.replay_by_session.len()
    }
}
