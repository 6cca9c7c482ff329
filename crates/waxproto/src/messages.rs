//! Control requests, notifications, and catalog descriptors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope header carried by every message on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Header {
    /// Correlates a request with any notifications it produces.
    pub correlation: Uuid,
    pub msg_type: String,
}

/// A typed message wrapped in its envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message<T> {
    pub header: Header,
    pub content: T,
}

impl<T> Message<T> {
    pub fn new(correlation: Uuid, msg_type: &str, content: T) -> Self {
        Self {
            header: Header {
                correlation,
                msg_type: msg_type.to_string(),
            },
            content,
        }
    }
}

/// Identity of the source stream an archive recording was taken from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamIdentity {
    pub channel: String,
    pub stream_id: i32,
    /// Transport session id of the publisher the image belongs to.
    pub session_id: i64,
}

/// Catalog entry describing one archived stream instance.
///
/// `stopped_at` is `None` while the recording is still being written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    pub stream_instance_id: i64,
    pub source: StreamIdentity,
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub archived_bytes: u64,
    pub chunk_count: u32,
}

/// A decoded client command for the archive daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlRequest {
    /// Subscribe to (channel, stream_id) and archive every image that appears.
    /// Fire-and-forget; repeating an identical request is a no-op.
    ArchiveStart { channel: String, stream_id: i32 },

    /// Drop the archive subscription for (channel, stream_id). Recordings
    /// already in flight run to completion on their own.
    ArchiveStop { channel: String, stream_id: i32 },

    /// Replay an archived byte range back to the requesting client.
    ReplayStart {
        session_id: i64,
        replay_stream_id: i32,
        replay_channel: String,
        control_stream_id: i32,
        control_channel: String,
        stream_instance_id: i64,
        term_id: i32,
        term_offset: i32,
        length: i64,
    },

    /// Cooperatively cancel an in-flight replay.
    ReplayStop { session_id: i64 },

    /// Enumerate catalog descriptors for ids in the half-open range [from, to).
    ListStreamInstances {
        from: i64,
        to: i64,
        reply_channel: String,
        reply_stream_id: i32,
    },
}

/// Events the daemon publishes back to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    ArchiveStarted {
        stream_instance_id: i64,
        source: StreamIdentity,
    },
    ArchiveStopped {
        stream_instance_id: i64,
        archived_bytes: u64,
    },
    ReplayStarted {
        session_id: i64,
        stream_instance_id: i64,
        term_id: i32,
    },
    ReplayFinished {
        session_id: i64,
        replayed_bytes: u64,
    },
    ReplayAborted {
        session_id: i64,
        replayed_bytes: u64,
    },
    /// One catalog entry, emitted per listing step.
    Descriptor { descriptor: StreamDescriptor },
    /// The listing cursor ran past the newest known id.
    DescriptorNotFound {
        stream_instance_id: i64,
        max_stream_instance_id: i64,
    },
}
