//! The session conductor: one non-blocking duty cycle driving everything.
//!
//! The conductor owns the registry of in-flight sessions, the consumer end
//! of the image bridge, the control subscription, and the archive
//! subscription set. Exactly one thread runs it; none of that state is
//! locked. Per cycle it:
//!
//! 1. drains every image-available event queued by the transport thread,
//!    creating one archive session per event,
//! 2. polls a bounded batch of control requests and dispatches each
//!    synchronously,
//! 3. advances every live session exactly once, reaping the ones that
//!    report done.
//!
//! Reaping iterates the live set backward with `swap_remove`: the element
//! swapped into a freed slot always comes from the already-visited tail, so
//! every session is visited exactly once per cycle even while the set
//! shrinks under the iteration.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use thiserror::Error;
use tracing::{debug, info, warn};

use waxconf::WaxConfig;
use waxproto::StreamDescriptor;

use crate::agent::Agent;
use crate::bridge::{image_bridge, ImageBridge, ImageNotifier};
use crate::catalog::Catalog;
use crate::dispatch::{dispatch_request, ControlListener, NotificationProxy};
use crate::session::{SessionRef, SessionRegistry};
use crate::sessions::{ArchiveSession, ListSession, ReplaySession};
use crate::transport::{
    AvailableImageHandler, NoOpImageHandler, Subscription, Transport,
};

/// Protocol violations and rejected requests. Fatal to the current flow and
/// propagated; there is no per-request error-reply channel at this layer.
#[derive(Debug, Error)]
pub enum ConductorError {
    #[error("replay already active for session {0}")]
    DuplicateReplaySession(i64),

    #[error("no replay session found for session {0}")]
    UnknownReplaySession(i64),

    #[error("no image on the control channel for session {0}")]
    UnknownReplaySource(i64),

    #[error("no archived stream instance {0}")]
    UnknownStreamInstance(i64),

    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

/// Runtime tuning for one conductor, distilled from [`WaxConfig`].
#[derive(Debug, Clone)]
pub struct ConductorConfig {
    pub request_channel: String,
    pub request_stream_id: i32,
    pub notify_channel: String,
    pub notify_stream_id: i32,
    pub request_batch_limit: usize,
    pub image_queue_capacity: usize,
    pub archive_fragment_limit: usize,
    pub replay_chunk_bytes: usize,
}

impl ConductorConfig {
    pub fn from_wax(config: &WaxConfig) -> Self {
        Self {
            request_channel: config.control.request_channel.clone(),
            request_stream_id: config.control.request_stream_id,
            notify_channel: config.control.notify_channel.clone(),
            notify_stream_id: config.control.notify_stream_id,
            request_batch_limit: config.tuning.request_batch_limit,
            image_queue_capacity: config.tuning.image_queue_capacity,
            archive_fragment_limit: config.tuning.archive_fragment_limit,
            replay_chunk_bytes: config.tuning.replay_chunk_bytes,
        }
    }
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self::from_wax(&WaxConfig::default())
    }
}

/// The single-threaded session conductor.
pub struct Conductor {
    transport: Arc<dyn Transport>,
    catalog: Rc<dyn Catalog>,
    config: ConductorConfig,
    control: Box<dyn Subscription>,
    proxy: Rc<NotificationProxy>,
    notifier: Arc<ImageNotifier>,
    images: ImageBridge,
    live: Vec<SessionRef>,
    registry: SessionRegistry,
    archive_subscriptions: Vec<Box<dyn Subscription>>,
    closed: Arc<AtomicBool>,
}

impl Conductor {
    /// Wire up a conductor: subscribes to the control channel, opens the
    /// notification publication, and binds the image bridge.
    pub fn new(
        transport: Arc<dyn Transport>,
        catalog: Rc<dyn Catalog>,
        config: ConductorConfig,
    ) -> Result<Self> {
        let control =
            transport.add_subscription(&config.request_channel, config.request_stream_id)?;
        let notify =
            transport.add_publication(&config.notify_channel, config.notify_stream_id)?;

        let closed = Arc::new(AtomicBool::new(false));
        let (notifier, images) = image_bridge(config.image_queue_capacity, Arc::clone(&closed));

        info!(
            request_channel = %config.request_channel,
            notify_channel = %config.notify_channel,
            "conductor ready"
        );

        Ok(Self {
            transport,
            catalog,
            config,
            control,
            proxy: NotificationProxy::new(notify),
            notifier,
            images,
            live: Vec::new(),
            registry: SessionRegistry::default(),
            archive_subscriptions: Vec::new(),
            closed,
        })
    }

    /// One duty cycle. Returns the work count for the host's idle strategy.
    pub fn do_work(&mut self) -> Result<usize> {
        let mut work = 0;
        work += self.drain_image_notifications();
        work += self.poll_control_requests()?;
        work += self.do_sessions_work()?;
        Ok(work)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// The registry view, for embedders and diagnostics.
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn live_sessions(&self) -> usize {
        self.live.len()
    }

    // === Catalog pass-through ===
    //
    // Forwarded verbatim so listing work can pull catalog data through the
    // conductor without per-byte mediation.

    pub fn read_archive_descriptor(
        &self,
        stream_instance_id: i64,
    ) -> Result<Option<StreamDescriptor>> {
        self.catalog.read_descriptor(stream_instance_id)
    }

    pub fn max_stream_instance_id(&self) -> i64 {
        self.catalog.max_stream_instance_id()
    }

    // === Cycle phases ===

    fn drain_image_notifications(&mut self) -> usize {
        let Self {
            images,
            live,
            registry,
            catalog,
            proxy,
            config,
            ..
        } = self;

        images.drain(|image| {
            match ArchiveSession::new(
                Rc::clone(catalog),
                Rc::clone(proxy),
                image,
                config.archive_fragment_limit,
            ) {
                Ok(session) => {
                    let stream_instance_id = session.stream_instance_id();
                    let session: SessionRef = Rc::new(RefCell::new(session));
                    live.push(Rc::clone(&session));
                    registry.insert_archive(stream_instance_id, session);
                }
                Err(e) => warn!("failed to start archive session: {e:#}"),
            }
        })
    }

    fn poll_control_requests(&mut self) -> Result<usize> {
        let frames = self.control.poll(self.config.request_batch_limit);
        let polled = frames.len();
        for frame in frames {
            dispatch_request(self, &frame)?;
        }
        Ok(polled)
    }

    fn do_sessions_work(&mut self) -> Result<usize> {
        let mut work = 0;
        for i in (0..self.live.len()).rev() {
            let session = Rc::clone(&self.live[i]);
            work += session.borrow_mut().do_work()?;
            if session.borrow().is_done() {
                session.borrow_mut().detach(&mut self.registry);
                self.live.swap_remove(i);
            }
        }
        Ok(work)
    }

    /// Idempotent, best-effort shutdown. Aborts every session, runs one more
    /// work pass so they can observe it, then releases every resource
    /// independently.
    pub fn on_close(&mut self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("conductor closing");

        for session in &self.live {
            session.borrow_mut().abort();
        }
        if let Err(e) = self.do_sessions_work() {
            warn!("session work during close failed: {e:#}");
        }

        // Diagnostics only; teardown continues regardless.
        if !self.live.is_empty() {
            warn!(live = self.live.len(), "sessions still live after close pass");
        }
        if !self.registry.is_empty() {
            warn!(
                archive = self.registry.archive_count(),
                replay = self.registry.replay_count(),
                "registry not empty after close pass"
            );
        }

        for mut subscription in self.archive_subscriptions.drain(..) {
            if let Err(e) = subscription.close() {
                warn!("failed to close archive subscription: {e:#}");
            }
        }
        self.images.clear();

        if let Err(e) = self.proxy.close() {
            warn!("failed to close notification publication: {e:#}");
        }
        if let Err(e) = self.control.close() {
            warn!("failed to close control subscription: {e:#}");
        }
        if let Err(e) = self.catalog.close() {
            warn!("failed to close catalog: {e:#}");
        }
    }
}

impl ControlListener for Conductor {
    fn on_archive_start(&mut self, channel: &str, stream_id: i32) -> Result<(), ConductorError> {
        for subscription in &self.archive_subscriptions {
            if subscription.stream_id() == stream_id && subscription.channel() == channel {
                // Already covered; don't bother.
                return Ok(());
            }
        }

        let subscription = self.transport.add_subscription_with_handlers(
            channel,
            stream_id,
            Arc::clone(&self.notifier) as Arc<dyn AvailableImageHandler>,
            Arc::new(NoOpImageHandler),
        )?;

        debug!(channel, stream_id, "archive subscription opened");
        // Images surfacing on it get picked up and archived as they appear.
        self.archive_subscriptions.push(subscription);
        Ok(())
    }

    fn on_archive_stop(&mut self, channel: &str, stream_id: i32) -> Result<(), ConductorError> {
        let found = self.archive_subscriptions.iter().position(|subscription| {
            subscription.stream_id() == stream_id && subscription.channel() == channel
        });
        if let Some(index) = found {
            let mut subscription = self.archive_subscriptions.swap_remove(index);
            if let Err(e) = subscription.close() {
                warn!(channel, stream_id, "failed to close archive subscription: {e:#}");
            }
            debug!(channel, stream_id, "archive subscription closed");
            // Archive sessions fed by it sort themselves out naturally.
        }
        Ok(())
    }

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
    ) -> Result<(), ConductorError> {
        if self.registry.has_replay(session_id) {
            return Err(ConductorError::DuplicateReplaySession(session_id));
        }

        let client = self
            .control
            .image_by_session_id(session_id)
            .ok_or(ConductorError::UnknownReplaySource(session_id))?;

        let reader = self
            .catalog
            .open_replay(stream_instance_id, term_offset as u64, length as u64)?
            .ok_or(ConductorError::UnknownStreamInstance(stream_instance_id))?;

        let data = self
            .transport
            .add_exclusive_publication(replay_channel, replay_stream_id)?;
        let control = self
            .transport
            .add_exclusive_publication(control_channel, control_stream_id)?;

        let session = ReplaySession::new(
            session_id,
            stream_instance_id,
            term_id,
            reader,
            data,
            control,
            client,
            self.config.replay_chunk_bytes,
        );
        debug!(session_id, stream_instance_id, "replay session started");

        let session: SessionRef = Rc::new(RefCell::new(session));
        self.registry.insert_replay(session_id, Rc::clone(&session));
        self.live.push(session);
        Ok(())
    }

    fn on_replay_stop(&mut self, session_id: i64) -> Result<(), ConductorError> {
        match self.registry.replay(session_id) {
            Some(session) => {
                session.borrow_mut().abort();
                Ok(())
            }
            None => Err(ConductorError::UnknownReplaySession(session_id)),
        }
    }

    fn on_list_stream_instances(
        &mut self,
        from: i64,
        to: i64,
        reply_channel: &str,
        reply_stream_id: i32,
    ) -> Result<(), ConductorError> {
        let reply = self.transport.add_publication(reply_channel, reply_stream_id)?;
        let session = ListSession::new(Rc::clone(&self.catalog), reply, from, to);
        debug!(from, to, reply_channel, "listing session started");

        self.live.push(Rc::new(RefCell::new(session)));
        Ok(())
    }
}

impl Agent for Conductor {
    fn role_name(&self) -> &str {
        "archive-conductor"
    }

    fn do_work(&mut self) -> Result<usize> {
        Conductor::do_work(self)
    }

    fn on_close(&mut self) {
        Conductor::on_close(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::sync::atomic::AtomicUsize;

    use bytes::Bytes;

    use waxproto::StreamIdentity;

    use crate::catalog::{MemoryCatalog, RecordingWriter};
    use crate::session::Session;
    use crate::transport::{Image, MemoryTransport, Publication, UnavailableImageHandler};

    fn new_conductor(transport: &Arc<MemoryTransport>, catalog: Rc<MemoryCatalog>) -> Conductor {
        Conductor::new(
            Arc::clone(transport) as Arc<dyn Transport>,
            catalog as Rc<dyn Catalog>,
            ConductorConfig::default(),
        )
        .unwrap()
    }

    fn make_recording(catalog: &Rc<MemoryCatalog>, data: &[u8]) -> i64 {
        let source = StreamIdentity {
            channel: "transport:media".to_string(),
            stream_id: 7,
            session_id: 99,
        };
        let (id, mut writer) = catalog.begin_recording(&source).unwrap();
        writer.write(data).unwrap();
        writer.finish().unwrap();
        id
    }

    #[test]
    fn test_archive_start_is_idempotent() {
        let transport = MemoryTransport::new();
        let mut conductor = new_conductor(&transport, MemoryCatalog::new());

        conductor.on_archive_start("transport:media", 7).unwrap();
        conductor.on_archive_start("transport:media", 7).unwrap();

        assert_eq!(conductor.archive_subscriptions.len(), 1);
    }

    #[test]
    fn test_archive_stop_requires_exact_match() {
        let transport = MemoryTransport::new();
        let mut conductor = new_conductor(&transport, MemoryCatalog::new());

        conductor.on_archive_start("transport:a", 1).unwrap();
        conductor.on_archive_start("transport:a", 2).unwrap();
        conductor.on_archive_start("transport:b", 1).unwrap();

        // no match on either half of the key: untouched
        conductor.on_archive_stop("transport:a", 9).unwrap();
        conductor.on_archive_stop("transport:c", 1).unwrap();
        assert_eq!(conductor.archive_subscriptions.len(), 3);

        conductor.on_archive_stop("transport:a", 2).unwrap();
        assert_eq!(conductor.archive_subscriptions.len(), 2);
        assert!(conductor
            .archive_subscriptions
            .iter()
            .all(|s| !(s.channel() == "transport:a" && s.stream_id() == 2)));
    }

    #[test]
    fn test_duplicate_replay_rejected() {
        let transport = MemoryTransport::new();
        let catalog = MemoryCatalog::new();
        let instance = make_recording(&catalog, b"payload");
        let mut conductor = new_conductor(&transport, Rc::clone(&catalog));

        // requester appears on the control channel
        let client = transport.add_publication("transport:control", 10).unwrap();
        let session_id = client.session_id();

        conductor
            .on_replay_start(
                session_id,
                101,
                "transport:replay",
                102,
                "transport:replay-ctl",
                instance,
                0,
                0,
                7,
            )
            .unwrap();
        assert_eq!(conductor.registry().replay_count(), 1);

        let err = conductor
            .on_replay_start(
                session_id,
                101,
                "transport:replay",
                102,
                "transport:replay-ctl",
                instance,
                0,
                0,
                7,
            )
            .unwrap_err();

        assert!(matches!(err, ConductorError::DuplicateReplaySession(id) if id == session_id));
        assert_eq!(conductor.registry().replay_count(), 1);
        assert_eq!(conductor.live_sessions(), 1);
    }

    #[test]
    fn test_replay_start_rejects_unknown_source_and_instance() {
        let transport = MemoryTransport::new();
        let catalog = MemoryCatalog::new();
        let instance = make_recording(&catalog, b"payload");
        let mut conductor = new_conductor(&transport, Rc::clone(&catalog));

        // no image on the control channel for this session id
        let err = conductor
            .on_replay_start(42, 101, "transport:replay", 102, "transport:rc", instance, 0, 0, 7)
            .unwrap_err();
        assert!(matches!(err, ConductorError::UnknownReplaySource(42)));

        let client = transport.add_publication("transport:control", 10).unwrap();
        let err = conductor
            .on_replay_start(
                client.session_id(),
                101,
                "transport:replay",
                102,
                "transport:rc",
                777,
                0,
                0,
                7,
            )
            .unwrap_err();
        assert!(matches!(err, ConductorError::UnknownStreamInstance(777)));

        // nothing leaked into the registry on either rejection
        assert!(conductor.registry().is_empty());
        assert_eq!(conductor.live_sessions(), 0);
    }

    #[test]
    fn test_unknown_replay_stop_rejected() {
        let transport = MemoryTransport::new();
        let mut conductor = new_conductor(&transport, MemoryCatalog::new());

        let err = conductor.on_replay_stop(123).unwrap_err();
        assert!(matches!(err, ConductorError::UnknownReplaySession(123)));
        assert!(conductor.registry().is_empty());
        assert_eq!(conductor.live_sessions(), 0);
    }

    #[test]
    fn test_replay_stop_aborts_cooperatively() {
        let transport = MemoryTransport::new();
        let catalog = MemoryCatalog::new();
        let instance = make_recording(&catalog, b"long enough to take a few cycles");
        let mut conductor = new_conductor(&transport, Rc::clone(&catalog));

        let client = transport.add_publication("transport:control", 10).unwrap();
        let _replay_sub = transport.add_subscription("transport:replay", 101).unwrap();
        conductor
            .on_replay_start(
                client.session_id(),
                101,
                "transport:replay",
                102,
                "transport:rc",
                instance,
                0,
                0,
                32,
            )
            .unwrap();

        conductor.on_replay_stop(client.session_id()).unwrap();
        // still registered until the session observes the abort
        assert_eq!(conductor.registry().replay_count(), 1);

        conductor.do_work().unwrap();
        assert_eq!(conductor.registry().replay_count(), 0);
        assert_eq!(conductor.live_sessions(), 0);
    }

    // Scripted session for registry/removal mechanics.
    struct ScriptedSession {
        key: i64,
        remaining: usize,
        detached: Rc<Cell<usize>>,
    }

    impl Session for ScriptedSession {
        fn abort(&mut self) {
            self.remaining = 0;
        }

        fn is_done(&self) -> bool {
            self.remaining == 0
        }

        fn detach(&mut self, registry: &mut SessionRegistry) {
            registry.remove_archive(self.key);
            self.detached.set(self.detached.get() + 1);
        }

        fn do_work(&mut self) -> Result<usize> {
            if self.remaining > 0 {
                self.remaining -= 1;
                Ok(1)
            } else {
                Ok(0)
            }
        }
    }

    #[test]
    fn test_removal_visits_each_session_once() {
        let transport = MemoryTransport::new();
        let mut conductor = new_conductor(&transport, MemoryCatalog::new());

        let mut detach_counters = Vec::new();
        for key in 0..6i64 {
            let detached = Rc::new(Cell::new(0));
            // odd keys report done after this cycle's step, even keys later
            let remaining = if key % 2 == 1 { 1 } else { 2 };
            let session: SessionRef = Rc::new(RefCell::new(ScriptedSession {
                key,
                remaining,
                detached: Rc::clone(&detached),
            }));
            conductor.live.push(Rc::clone(&session));
            conductor.registry.insert_archive(key, session);
            detach_counters.push(detached);
        }

        let work = conductor.do_sessions_work().unwrap();
        assert_eq!(work, 6, "every session stepped exactly once");
        assert_eq!(conductor.live_sessions(), 3);
        assert_eq!(conductor.registry().archive_count(), 3);

        for key in [1usize, 3, 5] {
            assert_eq!(detach_counters[key].get(), 1);
            assert!(conductor.registry().archive(key as i64).is_none());
        }
        for key in [0usize, 2, 4] {
            assert_eq!(detach_counters[key].get(), 0);
            assert!(conductor.registry().archive(key as i64).is_some());
        }

        let work = conductor.do_sessions_work().unwrap();
        assert_eq!(work, 3);
        assert_eq!(conductor.live_sessions(), 0);
        assert!(conductor.registry().is_empty());
        assert!(detach_counters.iter().all(|c| c.get() == 1));
    }

    #[test]
    fn test_catalog_pass_through() {
        let transport = MemoryTransport::new();
        let catalog = MemoryCatalog::new();
        let instance = make_recording(&catalog, b"forty-five rpm");
        let conductor = new_conductor(&transport, Rc::clone(&catalog));

        assert_eq!(
            conductor.max_stream_instance_id(),
            catalog.max_stream_instance_id()
        );

        let through = conductor.read_archive_descriptor(instance).unwrap();
        let direct = catalog.read_descriptor(instance).unwrap();
        assert_eq!(through, direct);
        assert!(through.is_some());

        assert!(conductor.read_archive_descriptor(555).unwrap().is_none());
    }

    #[test]
    fn test_close_aborts_live_sessions_and_empties_registry() {
        let transport = MemoryTransport::new();
        let catalog = MemoryCatalog::new();
        let mut conductor = new_conductor(&transport, Rc::clone(&catalog));

        conductor.on_archive_start("transport:media", 7).unwrap();
        let mut media = transport.add_publication("transport:media", 7).unwrap();
        media.offer(b"last pressing");
        conductor.do_work().unwrap();
        assert_eq!(conductor.live_sessions(), 1);

        conductor.on_close();

        assert_eq!(conductor.live_sessions(), 0);
        assert!(conductor.registry().is_empty());
        assert!(conductor.archive_subscriptions.is_empty());
        assert!(conductor.images.is_empty());

        let descriptor = catalog.read_descriptor(0).unwrap().unwrap();
        assert!(descriptor.stopped_at.is_some());
        assert_eq!(descriptor.archived_bytes, 13);
    }

    // Transport whose resources all fail to close, for teardown isolation.
    struct FlakyTransport {
        close_attempts: Arc<AtomicUsize>,
    }

    struct FlakySubscription {
        channel: String,
        stream_id: i32,
        close_attempts: Arc<AtomicUsize>,
    }

    impl Subscription for FlakySubscription {
        fn channel(&self) -> &str {
            &self.channel
        }
        fn stream_id(&self) -> i32 {
            self.stream_id
        }
        fn poll(&mut self, _limit: usize) -> Vec<Bytes> {
            Vec::new()
        }
        fn image_by_session_id(&self, _session_id: i64) -> Option<Arc<dyn Image>> {
            None
        }
        fn close(&mut self) -> Result<()> {
            self.close_attempts.fetch_add(1, Ordering::Relaxed);
            anyhow::bail!("subscription close failed")
        }
    }

    struct FlakyPublication {
        channel: String,
        stream_id: i32,
        close_attempts: Arc<AtomicUsize>,
    }

    impl Publication for FlakyPublication {
        fn channel(&self) -> &str {
            &self.channel
        }
        fn stream_id(&self) -> i32 {
            self.stream_id
        }
        fn session_id(&self) -> i64 {
            0
        }
        fn offer(&mut self, _data: &[u8]) -> bool {
            true
        }
        fn close(&mut self) -> Result<()> {
            self.close_attempts.fetch_add(1, Ordering::Relaxed);
            anyhow::bail!("publication close failed")
        }
    }

    impl Transport for FlakyTransport {
        fn add_subscription(
            &self,
            channel: &str,
            stream_id: i32,
        ) -> Result<Box<dyn Subscription>> {
            Ok(Box::new(FlakySubscription {
                channel: channel.to_string(),
                stream_id,
                close_attempts: Arc::clone(&self.close_attempts),
            }))
        }

        fn add_subscription_with_handlers(
            &self,
            channel: &str,
            stream_id: i32,
            _on_available: Arc<dyn AvailableImageHandler>,
            _on_unavailable: Arc<dyn UnavailableImageHandler>,
        ) -> Result<Box<dyn Subscription>> {
            self.add_subscription(channel, stream_id)
        }

        fn add_publication(&self, channel: &str, stream_id: i32) -> Result<Box<dyn Publication>> {
            Ok(Box::new(FlakyPublication {
                channel: channel.to_string(),
                stream_id,
                close_attempts: Arc::clone(&self.close_attempts),
            }))
        }

        fn add_exclusive_publication(
            &self,
            channel: &str,
            stream_id: i32,
        ) -> Result<Box<dyn Publication>> {
            self.add_publication(channel, stream_id)
        }
    }

    #[test]
    fn test_close_is_idempotent_and_best_effort() {
        let close_attempts = Arc::new(AtomicUsize::new(0));
        let transport = Arc::new(FlakyTransport {
            close_attempts: Arc::clone(&close_attempts),
        });
        let mut conductor = Conductor::new(
            transport as Arc<dyn Transport>,
            MemoryCatalog::new() as Rc<dyn Catalog>,
            ConductorConfig::default(),
        )
        .unwrap();

        conductor.on_archive_start("transport:media", 7).unwrap();

        conductor.on_close();

        // Every resource had its close attempted despite each one failing:
        // archive subscription, notification publication, control
        // subscription.
        assert_eq!(close_attempts.load(Ordering::Relaxed), 3);
        assert!(conductor.archive_subscriptions.is_empty());
        assert!(conductor.images.is_empty());
        assert!(conductor.is_closed());

        // Second close is a no-op.
        conductor.on_close();
        assert_eq!(close_attempts.load(Ordering::Relaxed), 3);
    }
}
