//! Transport collaborator traits and the in-process memory transport.
//!
//! The conductor never talks to sockets directly. It sees the transport
//! through four narrow traits: [`Transport`] hands out subscriptions and
//! publications, [`Subscription`] delivers inbound frames and exposes the
//! per-publisher [`Image`]s behind it, and [`Publication`] accepts outbound
//! frames without blocking. Delivery, reliability, and flow control are the
//! transport's own business.
//!
//! [`MemoryTransport`] is the in-process implementation used by tests and
//! embedders: publications route frames straight into per-subscription image
//! queues, and adding a matching publication fires the subscription's
//! image-available handler.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use bytes::Bytes;

/// Callback fired when a new publisher image appears on a subscription.
///
/// One handler instance is bound when the subscription is created and invoked
/// from the transport's own thread - implementations must not block.
pub trait AvailableImageHandler: Send + Sync {
    fn on_available_image(&self, image: Arc<dyn Image>);
}

/// Callback fired when a publisher image goes away.
pub trait UnavailableImageHandler: Send + Sync {
    fn on_unavailable_image(&self, image: &dyn Image);
}

/// Handler that ignores image lifecycle events.
pub struct NoOpImageHandler;

impl AvailableImageHandler for NoOpImageHandler {
    fn on_available_image(&self, _image: Arc<dyn Image>) {}
}

impl UnavailableImageHandler for NoOpImageHandler {
    fn on_unavailable_image(&self, _image: &dyn Image) {}
}

/// The inbound, per-publisher view of a subscribed stream.
pub trait Image: Send + Sync {
    /// Transport session id of the publisher behind this image.
    fn session_id(&self) -> i64;
    fn channel(&self) -> &str;
    fn stream_id(&self) -> i32;

    /// Deliver up to `limit` queued fragments to `handler`, returning how
    /// many were delivered. Never blocks.
    fn poll(&self, handler: &mut dyn FnMut(&[u8]), limit: usize) -> usize;

    /// True once the publisher side has gone away. Fragments queued before
    /// the close remain pollable.
    fn is_closed(&self) -> bool;
}

/// An inbound subscription on (channel, stream id).
pub trait Subscription {
    fn channel(&self) -> &str;
    fn stream_id(&self) -> i32;

    /// Drain up to `limit` whole frames across this subscription's images.
    fn poll(&mut self, limit: usize) -> Vec<Bytes>;

    /// Resolve the image belonging to the publisher with `session_id`.
    fn image_by_session_id(&self, session_id: i64) -> Option<Arc<dyn Image>>;

    fn close(&mut self) -> Result<()>;
}

/// An outbound publication on (channel, stream id).
pub trait Publication {
    fn channel(&self) -> &str;
    fn stream_id(&self) -> i32;

    /// Transport session id assigned to this publication.
    fn session_id(&self) -> i64;

    /// Offer one frame. Returns false when the transport cannot accept it
    /// right now (backpressure); the caller retries on a later cycle.
    fn offer(&mut self, data: &[u8]) -> bool;

    fn close(&mut self) -> Result<()>;
}

/// Factory for subscriptions and publications.
pub trait Transport: Send + Sync {
    fn add_subscription(&self, channel: &str, stream_id: i32) -> Result<Box<dyn Subscription>>;

    fn add_subscription_with_handlers(
        &self,
        channel: &str,
        stream_id: i32,
        on_available: Arc<dyn AvailableImageHandler>,
        on_unavailable: Arc<dyn UnavailableImageHandler>,
    ) -> Result<Box<dyn Subscription>>;

    fn add_publication(&self, channel: &str, stream_id: i32) -> Result<Box<dyn Publication>>;

    /// A publication with a private session id, never shared with other
    /// publishers on the same (channel, stream id).
    fn add_exclusive_publication(
        &self,
        channel: &str,
        stream_id: i32,
    ) -> Result<Box<dyn Publication>>;
}

// === In-process memory transport ===

/// One publisher's frame queue as seen by one subscription.
pub struct MemoryImage {
    session_id: i64,
    channel: String,
    stream_id: i32,
    frames: Mutex<VecDeque<Bytes>>,
    closed: AtomicBool,
}

impl MemoryImage {
    fn push(&self, data: Bytes) {
        self.frames.lock().unwrap().push_back(data);
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

impl Image for MemoryImage {
    fn session_id(&self) -> i64 {
        self.session_id
    }

    fn channel(&self) -> &str {
        &self.channel
    }

    fn stream_id(&self) -> i32 {
        self.stream_id
    }

    fn poll(&self, handler: &mut dyn FnMut(&[u8]), limit: usize) -> usize {
        let mut delivered = 0;
        while delivered < limit {
            let frame = match self.frames.lock().unwrap().pop_front() {
                Some(frame) => frame,
                None => break,
            };
            handler(&frame);
            delivered += 1;
        }
        delivered
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

struct SubEntry {
    channel: String,
    stream_id: i32,
    images: Vec<Arc<MemoryImage>>,
    on_available: Option<Arc<dyn AvailableImageHandler>>,
    closed: bool,
}

struct PubEntry {
    session_id: i64,
    channel: String,
    stream_id: i32,
    images: Vec<Arc<MemoryImage>>,
    closed: bool,
}

#[derive(Default)]
struct Hub {
    next_session_id: i64,
    subscriptions: Vec<Arc<Mutex<SubEntry>>>,
    publications: Vec<Arc<Mutex<PubEntry>>>,
}

impl Hub {
    fn wire(sub: &mut SubEntry, publication: &mut PubEntry) -> Arc<MemoryImage> {
        let image = Arc::new(MemoryImage {
            session_id: publication.session_id,
            channel: publication.channel.clone(),
            stream_id: publication.stream_id,
            frames: Mutex::new(VecDeque::new()),
            closed: AtomicBool::new(false),
        });
        sub.images.push(Arc::clone(&image));
        publication.images.push(Arc::clone(&image));
        image
    }
}

/// In-process pub/sub hub implementing [`Transport`].
#[derive(Default)]
pub struct MemoryTransport {
    hub: Mutex<Hub>,
}

impl MemoryTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn subscribe(
        &self,
        channel: &str,
        stream_id: i32,
        on_available: Option<Arc<dyn AvailableImageHandler>>,
    ) -> Box<dyn Subscription> {
        let mut hub = self.hub.lock().unwrap();
        let entry = Arc::new(Mutex::new(SubEntry {
            channel: channel.to_string(),
            stream_id,
            images: Vec::new(),
            on_available: on_available.clone(),
            closed: false,
        }));

        // Late subscriber: surface images for publishers that already exist.
        let mut pending = Vec::new();
        for publication in &hub.publications {
            let mut publication = publication.lock().unwrap();
            if publication.closed
                || publication.stream_id != stream_id
                || publication.channel != channel
            {
                continue;
            }
            let image = Hub::wire(&mut entry.lock().unwrap(), &mut publication);
            pending.push(image);
        }
        hub.subscriptions.push(Arc::clone(&entry));
        drop(hub);

        if let Some(handler) = &on_available {
            for image in pending {
                handler.on_available_image(image);
            }
        }

        Box::new(MemorySubscription {
            channel: channel.to_string(),
            stream_id,
            entry,
        })
    }

    fn publish(&self, channel: &str, stream_id: i32) -> Box<dyn Publication> {
        let mut hub = self.hub.lock().unwrap();
        hub.next_session_id += 1;
        let session_id = hub.next_session_id;
        let entry = Arc::new(Mutex::new(PubEntry {
            session_id,
            channel: channel.to_string(),
            stream_id,
            images: Vec::new(),
            closed: false,
        }));

        let mut notify = Vec::new();
        for sub in &hub.subscriptions {
            let mut sub = sub.lock().unwrap();
            if sub.closed || sub.stream_id != stream_id || sub.channel != channel {
                continue;
            }
            let image = Hub::wire(&mut sub, &mut entry.lock().unwrap());
            if let Some(handler) = &sub.on_available {
                notify.push((Arc::clone(handler), image));
            }
        }
        hub.publications.push(Arc::clone(&entry));
        drop(hub);

        for (handler, image) in notify {
            handler.on_available_image(image);
        }

        Box::new(MemoryPublication {
            channel: channel.to_string(),
            stream_id,
            session_id,
            entry,
        })
    }
}

impl Transport for MemoryTransport {
    fn add_subscription(&self, channel: &str, stream_id: i32) -> Result<Box<dyn Subscription>> {
        Ok(self.subscribe(channel, stream_id, None))
    }

    fn add_subscription_with_handlers(
        &self,
        channel: &str,
        stream_id: i32,
        on_available: Arc<dyn AvailableImageHandler>,
        _on_unavailable: Arc<dyn UnavailableImageHandler>,
    ) -> Result<Box<dyn Subscription>> {
        Ok(self.subscribe(channel, stream_id, Some(on_available)))
    }

    fn add_publication(&self, channel: &str, stream_id: i32) -> Result<Box<dyn Publication>> {
        Ok(self.publish(channel, stream_id))
    }

    fn add_exclusive_publication(
        &self,
        channel: &str,
        stream_id: i32,
    ) -> Result<Box<dyn Publication>> {
        // Every memory publication already has a private session id.
        Ok(self.publish(channel, stream_id))
    }
}

struct MemorySubscription {
    channel: String,
    stream_id: i32,
    entry: Arc<Mutex<SubEntry>>,
}

impl Subscription for MemorySubscription {
    fn channel(&self) -> &str {
        &self.channel
    }

    fn stream_id(&self) -> i32 {
        self.stream_id
    }

    fn poll(&mut self, limit: usize) -> Vec<Bytes> {
        let entry = self.entry.lock().unwrap();
        let mut frames = Vec::new();
        for image in &entry.images {
            if frames.len() >= limit {
                break;
            }
            let mut queue = image.frames.lock().unwrap();
            while frames.len() < limit {
                match queue.pop_front() {
                    Some(frame) => frames.push(frame),
                    None => break,
                }
            }
        }
        frames
    }

    fn image_by_session_id(&self, session_id: i64) -> Option<Arc<dyn Image>> {
        let entry = self.entry.lock().unwrap();
        entry
            .images
            .iter()
            .find(|image| image.session_id == session_id)
            .map(|image| Arc::clone(image) as Arc<dyn Image>)
    }

    fn close(&mut self) -> Result<()> {
        let mut entry = self.entry.lock().unwrap();
        entry.closed = true;
        for image in &entry.images {
            image.close();
        }
        Ok(())
    }
}

struct MemoryPublication {
    channel: String,
    stream_id: i32,
    session_id: i64,
    entry: Arc<Mutex<PubEntry>>,
}

impl Publication for MemoryPublication {
    fn channel(&self) -> &str {
        &self.channel
    }

    fn stream_id(&self) -> i32 {
        self.stream_id
    }

    fn session_id(&self) -> i64 {
        self.session_id
    }

    fn offer(&mut self, data: &[u8]) -> bool {
        let entry = self.entry.lock().unwrap();
        if entry.closed {
            return false;
        }
        let frame = Bytes::copy_from_slice(data);
        for image in &entry.images {
            image.push(frame.clone());
        }
        true
    }

    fn close(&mut self) -> Result<()> {
        let mut entry = self.entry.lock().unwrap();
        entry.closed = true;
        for image in &entry.images {
            image.close();
        }
        Ok(())
    }
}
