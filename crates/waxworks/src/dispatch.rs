//! Control-plane dispatch and notification emission.
//!
//! [`dispatch_request`] turns an inbound frame into a typed call on a
//! [`ControlListener`] (the conductor). Frames that fail to decode are
//! logged and skipped - a client speaking garbage must not take the daemon
//! down. Requests that decode but violate protocol state propagate their
//! error to the caller.
//!
//! [`NotificationProxy`] is the outbound mirror: typed, best-effort,
//! non-blocking emission on the daemon's notification publication.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, warn};
use uuid::Uuid;

use waxproto::{wire, ControlRequest, Notification, StreamIdentity};

use crate::conductor::ConductorError;
use crate::transport::Publication;

/// Typed surface the control dispatcher drives. Implemented by the
/// conductor; split out so the decode path is testable on its own.
pub trait ControlListener {
    fn on_archive_start(&mut self, channel: &str, stream_id: i32) -> Result<(), ConductorError>;

    fn on_archive_stop(&mut self, channel: &str, stream_id: i32) -> Result<(), ConductorError>;

    #[allow(clippy::too_many_arguments)]
    fn on_replay_start(
        &mut self,
        session_id: i64,
        replay_stream_id: i32,
        replay_channel: &str,
        control_stream_id: i32,
        control_channel: &str,
        stream_instance_id: i64,
        term_id: i32,
        term_offset: i32,
        length: i64,
    ) -> Result<(), ConductorError>;

    fn on_replay_stop(&mut self, session_id: i64) -> Result<(), ConductorError>;

    fn on_list_stream_instances(
        &mut self,
        from: i64,
        to: i64,
        reply_channel: &str,
        reply_stream_id: i32,
    ) -> Result<(), ConductorError>;
}

/// Decode one control frame and dispatch it synchronously.
pub fn dispatch_request(
    listener: &mut dyn ControlListener,
    frame: &[u8],
) -> Result<(), ConductorError> {
    let message = match wire::decode_request(frame) {
        Ok(message) => message,
        Err(e) => {
            warn!("dropping undecodable control frame: {e:#}");
            return Ok(());
        }
    };

    match message.content {
        ControlRequest::ArchiveStart { channel, stream_id } => {
            listener.on_archive_start(&channel, stream_id)
        }
        ControlRequest::ArchiveStop { channel, stream_id } => {
            listener.on_archive_stop(&channel, stream_id)
        }
        ControlRequest::ReplayStart {
            session_id,
            replay_stream_id,
            replay_channel,
            control_stream_id,
            control_channel,
            stream_instance_id,
            term_id,
            term_offset,
            length,
        } => listener.on_replay_start(
            session_id,
            replay_stream_id,
            &replay_channel,
            control_stream_id,
            &control_channel,
            stream_instance_id,
            term_id,
            term_offset,
            length,
        ),
        ControlRequest::ReplayStop { session_id } => listener.on_replay_stop(session_id),
        ControlRequest::ListStreamInstances {
            from,
            to,
            reply_channel,
            reply_stream_id,
        } => listener.on_list_stream_instances(from, to, &reply_channel, reply_stream_id),
    }
}

/// Offer one encoded notification on a publication. Returns false when the
/// transport pushed back; the caller decides whether to retry.
pub fn offer_notification(publication: &mut dyn Publication, notification: &Notification) -> bool {
    match wire::encode_notification(Uuid::new_v4(), notification) {
        Ok(bytes) => publication.offer(&bytes),
        Err(e) => {
            warn!("failed to encode notification: {e:#}");
            false
        }
    }
}

/// Outbound archive lifecycle events, shared by the conductor and its
/// archive sessions.
pub struct NotificationProxy {
    publication: RefCell<Box<dyn Publication>>,
}

impl NotificationProxy {
    pub fn new(publication: Box<dyn Publication>) -> Rc<Self> {
        Rc::new(Self {
            publication: RefCell::new(publication),
        })
    }

    pub fn archive_started(&self, stream_instance_id: i64, source: &StreamIdentity) {
        self.emit(Notification::ArchiveStarted {
            stream_instance_id,
            source: source.clone(),
        });
    }

    pub fn archive_stopped(&self, stream_instance_id: i64, archived_bytes: u64) {
        self.emit(Notification::ArchiveStopped {
            stream_instance_id,
            archived_bytes,
        });
    }

    fn emit(&self, notification: Notification) {
        let mut publication = self.publication.borrow_mut();
        if !offer_notification(publication.as_mut(), &notification) {
            // Lifecycle events are advisory; backpressure here never stalls
            // the conductor.
            debug!(?notification, "notification dropped");
        }
    }

    pub fn close(&self) -> anyhow::Result<()> {
        self.publication.borrow_mut().close()
    }
}
