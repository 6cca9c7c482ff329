//! Image-available bridge between the transport thread and the conductor.
//!
//! The transport announces new publisher images from its own thread. The
//! conductor owns all session state and must never take a lock for it, so
//! the announcement crosses over through a bounded lock-free channel:
//!
//! - [`ImageNotifier`] is the producer half. One instance is bound when the
//!   conductor starts and shared by every archive subscription, so no
//!   callable is allocated per event.
//! - [`ImageBridge`] is the consumer half. The conductor drains it fully at
//!   the top of every cycle.
//!
//! A full queue is backpressure, not data loss: the producer spins with a
//! cooperative yield until its event is accepted. Only once shutdown has
//! completed (the shared closed flag is set) may an event be dropped - no
//! archiving work is wanted for it anymore.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};

use crate::transport::{AvailableImageHandler, Image};

/// Producer half: the image-available callback handed to archive
/// subscriptions.
pub struct ImageNotifier {
    tx: Sender<Arc<dyn Image>>,
    closed: Arc<AtomicBool>,
}

impl ImageNotifier {
    /// Push one event, yielding while the queue is full. Drops the event
    /// only after shutdown.
    pub fn notify(&self, image: Arc<dyn Image>) {
        let mut event = image;
        loop {
            if self.closed.load(Ordering::Acquire) {
                return;
            }
            match self.tx.try_send(event) {
                Ok(()) => return,
                Err(TrySendError::Full(rejected)) => {
                    event = rejected;
                    std::thread::yield_now();
                }
                // Consumer gone means shutdown already tore the bridge down.
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }
}

impl AvailableImageHandler for ImageNotifier {
    fn on_available_image(&self, image: Arc<dyn Image>) {
        self.notify(image);
    }
}

/// Consumer half, owned by the conductor.
pub struct ImageBridge {
    rx: Receiver<Arc<dyn Image>>,
}

impl ImageBridge {
    /// Deliver every queued event to `handler`, in arrival order. Returns
    /// the number delivered. Never blocks.
    pub fn drain(&self, mut handler: impl FnMut(Arc<dyn Image>)) -> usize {
        let mut drained = 0;
        while let Ok(image) = self.rx.try_recv() {
            handler(image);
            drained += 1;
        }
        drained
    }

    /// Discard everything still queued (shutdown path).
    pub fn clear(&self) {
        while self.rx.try_recv().is_ok() {}
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Build a bridge of the given capacity. `closed` is the conductor's shutdown
/// flag; once it reads true the producer stops retrying.
pub fn image_bridge(capacity: usize, closed: Arc<AtomicBool>) -> (Arc<ImageNotifier>, ImageBridge) {
    let (tx, rx) = bounded(capacity);
    (Arc::new(ImageNotifier { tx, closed }), ImageBridge { rx })
}
