//! Waxworks: stream archive daemon.
//!
//! Records live pub/sub streams into a durable catalog, replays archived
//! streams back to requesting clients on demand, and enumerates what it
//! holds - all driven by control requests arriving over the same transport.
//!
//! At the center is the single-threaded [`Conductor`]: a non-blocking duty
//! cycle that owns every in-flight session and never takes a lock for its
//! own state. The only things that cross threads are the image-available
//! bridge (a bounded lock-free queue fed by the transport) and the shutdown
//! flag.
//!
//! ```text
//! transport thread ──▶ ImageNotifier ──▶ ImageBridge ──▶ ArchiveSession
//!                                                           │ chunks
//! client ──▶ control subscription ──▶ Conductor handlers     ▼
//!                                      │                  Catalog
//!                                      ├─▶ ReplaySession ◀──┘
//!                                      └─▶ ListSession
//! ```
//!
//! Everything durable lives behind the [`Catalog`] trait; everything on the
//! wire lives behind the [`Transport`] traits. [`MemoryTransport`] and
//! [`MemoryCatalog`] make the whole daemon runnable in-process, which is how
//! the integration tests drive it.

pub mod agent;
pub mod bridge;
pub mod catalog;
pub mod conductor;
pub mod dispatch;
pub mod session;
pub mod sessions;
pub mod store;
pub mod transport;

pub use agent::{Agent, AgentRunner, IdleStrategy};
pub use bridge::{image_bridge, ImageBridge, ImageNotifier};
pub use catalog::{Catalog, MemoryCatalog, RecordingReader, RecordingWriter};
pub use conductor::{Conductor, ConductorConfig, ConductorError};
pub use dispatch::{dispatch_request, ControlListener, NotificationProxy};
pub use session::{Session, SessionRef, SessionRegistry};
pub use sessions::{ArchiveSession, ListSession, ReplaySession};
pub use store::FileCatalog;
pub use transport::{
    AvailableImageHandler, Image, MemoryTransport, NoOpImageHandler, Publication, Subscription,
    Transport, UnavailableImageHandler,
};
