//! Replay session: re-publish a recorded byte range to a requesting client.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, warn};

use waxproto::Notification;

use crate::catalog::RecordingReader;
use crate::dispatch::offer_notification;
use crate::session::{Session, SessionRegistry};
use crate::transport::{Image, Publication};

enum State {
    Starting,
    Replaying,
    Done,
}

/// Unit of work replaying one archived stream instance back to a client.
///
/// Owns two outbound publications: recorded bytes go out on `data`,
/// progress and terminal events on `control`. A chunk the transport refuses
/// is held and re-offered next cycle, so backpressure costs cycles, not
/// data.
pub struct ReplaySession {
    session_id: i64,
    stream_instance_id: i64,
    term_id: i32,
    reader: Box<dyn RecordingReader>,
    data: Box<dyn Publication>,
    control: Box<dyn Publication>,
    client: Arc<dyn Image>,
    chunk_bytes: usize,
    pending: Option<Vec<u8>>,
    replayed: u64,
    state: State,
    aborted: bool,
}

impl ReplaySession {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: i64,
        stream_instance_id: i64,
        term_id: i32,
        reader: Box<dyn RecordingReader>,
        data: Box<dyn Publication>,
        control: Box<dyn Publication>,
        client: Arc<dyn Image>,
        chunk_bytes: usize,
    ) -> Self {
        Self {
            session_id,
            stream_instance_id,
            term_id,
            reader,
            data,
            control,
            client,
            chunk_bytes,
            pending: None,
            replayed: 0,
            state: State::Starting,
            aborted: false,
        }
    }

    fn finish(&mut self, terminal: Notification) {
        if !offer_notification(self.control.as_mut(), &terminal) {
            debug!(session_id = self.session_id, "terminal replay event dropped");
        }
        if let Err(e) = self.data.close() {
            warn!(session_id = self.session_id, "failed to close replay data publication: {e:#}");
        }
        if let Err(e) = self.control.close() {
            warn!(
                session_id = self.session_id,
                "failed to close replay control publication: {e:#}"
            );
        }
        self.state = State::Done;
    }
}

impl Session for ReplaySession {
    fn abort(&mut self) {
        self.aborted = true;
    }

    fn is_done(&self) -> bool {
        matches!(self.state, State::Done)
    }

    fn detach(&mut self, registry: &mut SessionRegistry) {
        registry.remove_replay(self.session_id);
    }

    fn do_work(&mut self) -> Result<usize> {
        if matches!(self.state, State::Done) {
            return Ok(0);
        }

        // A vanished requester is as good as an abort.
        if self.aborted || self.client.is_closed() {
            self.finish(Notification::ReplayAborted {
                session_id: self.session_id,
                replayed_bytes: self.replayed,
            });
            return Ok(1);
        }

        if matches!(self.state, State::Starting) {
            let started = Notification::ReplayStarted {
                session_id: self.session_id,
                stream_instance_id: self.stream_instance_id,
                term_id: self.term_id,
            };
            if !offer_notification(self.control.as_mut(), &started) {
                // Control channel not ready yet; try again next cycle.
                return Ok(0);
            }
            self.state = State::Replaying;
            return Ok(1);
        }

        let chunk = match self.pending.take() {
            Some(chunk) => chunk,
            None => match self.reader.read(self.chunk_bytes) {
                Ok(Some(chunk)) => chunk,
                Ok(None) => {
                    self.finish(Notification::ReplayFinished {
                        session_id: self.session_id,
                        replayed_bytes: self.replayed,
                    });
                    return Ok(1);
                }
                Err(e) => {
                    // A broken recording aborts this replay, not the daemon.
                    warn!(
                        session_id = self.session_id,
                        stream_instance_id = self.stream_instance_id,
                        "replay read failed: {e:#}"
                    );
                    self.finish(Notification::ReplayAborted {
                        session_id: self.session_id,
                        replayed_bytes: self.replayed,
                    });
                    return Ok(1);
                }
            },
        };

        if self.data.offer(&chunk) {
            self.replayed += chunk.len() as u64;
            Ok(1)
        } else {
            self.pending = Some(chunk);
            Ok(0)
        }
    }
}
