//! Wire format serialization for control-plane messages.
//!
//! Supports MessagePack (production) and JSON (debugging).

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

use crate::messages::{ControlRequest, Message, Notification};

/// Wire format for serializing messages.
pub trait WireFormat {
    fn serialize<T: Serialize>(msg: &Message<T>) -> Result<Vec<u8>>;
    fn deserialize<T: DeserializeOwned>(data: &[u8]) -> Result<Message<T>>;
}

/// MessagePack format - fast and compact for production.
pub struct MsgPackFormat;

impl WireFormat for MsgPackFormat {
    fn serialize<T: Serialize>(msg: &Message<T>) -> Result<Vec<u8>> {
        rmp_serde::to_vec_named(msg).context("failed to serialize message to MessagePack")
    }

    fn deserialize<T: DeserializeOwned>(data: &[u8]) -> Result<Message<T>> {
        rmp_serde::from_slice(data).context("failed to deserialize MessagePack message")
    }
}

/// JSON format - readable for debugging.
pub struct JsonFormat;

impl WireFormat for JsonFormat {
    fn serialize<T: Serialize>(msg: &Message<T>) -> Result<Vec<u8>> {
        serde_json::to_vec(msg).context("failed to serialize message to JSON")
    }

    fn deserialize<T: DeserializeOwned>(data: &[u8]) -> Result<Message<T>> {
        serde_json::from_slice(data).context("failed to deserialize JSON message")
    }
}

/// Encode a control request in the default format (MessagePack).
pub fn encode_request(correlation: Uuid, request: &ControlRequest) -> Result<Vec<u8>> {
    MsgPackFormat::serialize(&Message::new(correlation, "control_request", request))
}

/// Decode a control request frame.
pub fn decode_request(data: &[u8]) -> Result<Message<ControlRequest>> {
    MsgPackFormat::deserialize(data)
}

/// Encode a notification in the default format (MessagePack).
pub fn encode_notification(correlation: Uuid, notification: &Notification) -> Result<Vec<u8>> {
    MsgPackFormat::serialize(&Message::new(correlation, "notification", notification))
}

/// Decode a notification frame.
pub fn decode_notification(data: &[u8]) -> Result<Message<Notification>> {
    MsgPackFormat::deserialize(data)
}
