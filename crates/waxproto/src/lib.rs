//! waxproto - Protocol types for the waxworks control plane
//!
//! This crate defines the messages exchanged between clients and the waxworks
//! archive daemon: control requests (start/stop archiving, start/stop replay,
//! list the catalog) and the notifications the daemon emits back (archive
//! lifecycle, replay progress, catalog descriptors).
//!
//! Messages are plain serde types wrapped in a small [`Message`] envelope for
//! correlation. The `wire` module provides the two codecs:
//!
//! - **MessagePack** - compact, the production format
//! - **JSON** - readable, for debugging and tooling
//!
//! How the bytes move is deliberately not this crate's business. The daemon
//! talks to its transport through trait seams; any carrier that can deliver a
//! frame of bytes can carry these messages.

pub mod messages;
pub mod wire;

pub use messages::{
    ControlRequest, Header, Message, Notification, StreamDescriptor, StreamIdentity,
};
pub use wire::{
    decode_notification, decode_request, encode_notification, encode_request, JsonFormat,
    MsgPackFormat, WireFormat,
};

/// Sentinel returned by `max_stream_instance_id` when the catalog is empty.
pub const NO_STREAM_INSTANCE: i64 = -1;
