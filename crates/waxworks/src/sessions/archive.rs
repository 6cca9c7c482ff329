//! Archive session: persist one publisher image to the catalog.

use std::rc::Rc;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, warn};

use waxproto::StreamIdentity;

use crate::catalog::{Catalog, RecordingWriter};
use crate::dispatch::NotificationProxy;
use crate::session::{Session, SessionRegistry};
use crate::transport::Image;

enum State {
    Archiving,
    Done,
}

/// Unit of work persisting one stream instance's image as data arrives.
///
/// Created the cycle its image surfaces through the bridge; the catalog
/// issues the stream-instance id at construction. Completes on its own when
/// the image closes, or cooperatively after `abort()`.
pub struct ArchiveSession {
    stream_instance_id: i64,
    image: Arc<dyn Image>,
    writer: Box<dyn RecordingWriter>,
    proxy: Rc<NotificationProxy>,
    fragment_limit: usize,
    state: State,
    aborted: bool,
}

impl ArchiveSession {
    pub fn new(
        catalog: Rc<dyn Catalog>,
        proxy: Rc<NotificationProxy>,
        image: Arc<dyn Image>,
        fragment_limit: usize,
    ) -> Result<Self> {
        let source = StreamIdentity {
            channel: image.channel().to_string(),
            stream_id: image.stream_id(),
            session_id: image.session_id(),
        };
        let (stream_instance_id, writer) = catalog.begin_recording(&source)?;
        proxy.archive_started(stream_instance_id, &source);
        debug!(stream_instance_id, channel = %source.channel, "archive session started");

        Ok(Self {
            stream_instance_id,
            image,
            writer,
            proxy,
            fragment_limit,
            state: State::Archiving,
            aborted: false,
        })
    }

    pub fn stream_instance_id(&self) -> i64 {
        self.stream_instance_id
    }

    fn complete(&mut self) {
        if let Err(e) = self.writer.finish() {
            warn!(
                stream_instance_id = self.stream_instance_id,
                "failed to seal recording: {e:#}"
            );
        }
        self.proxy
            .archive_stopped(self.stream_instance_id, self.writer.bytes_written());
        self.state = State::Done;
    }
}

impl Session for ArchiveSession {
    fn abort(&mut self) {
        self.aborted = true;
    }

    fn is_done(&self) -> bool {
        matches!(self.state, State::Done)
    }

    fn detach(&mut self, registry: &mut SessionRegistry) {
        registry.remove_archive(self.stream_instance_id);
    }

    fn do_work(&mut self) -> Result<usize> {
        if matches!(self.state, State::Done) {
            return Ok(0);
        }
        if self.aborted {
            self.complete();
            return Ok(1);
        }

        let writer = &mut self.writer;
        let mut write_error = None;
        let polled = self.image.poll(
            &mut |fragment| {
                if write_error.is_none() {
                    if let Err(e) = writer.write(fragment) {
                        write_error = Some(e);
                    }
                }
            },
            self.fragment_limit,
        );

        if let Some(e) = write_error {
            // A broken recording must not poison the conductor: seal what we
            // have and report done.
            warn!(
                stream_instance_id = self.stream_instance_id,
                "archive write failed, sealing recording early: {e:#}"
            );
            self.complete();
            return Ok(polled + 1);
        }

        if polled == 0 && self.image.is_closed() {
            self.complete();
            return Ok(1);
        }

        Ok(polled)
    }
}
