use serde_json::{Map, Value};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::ConfigModel;
use crate::core::frame::{Frame, FrameKind};
use crate::error::{ProtocolError, Result};

/// Decoded record fields, keyed by rtl_433 field name.
pub type Fields = Map<String, Value>;

/// A decoded protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Server configuration sent once per connection
    Config(ConfigModel),
    /// One decoder record forwarded by a client
    Packet(Fields),
}

impl Message {
    pub fn kind(&self) -> FrameKind {
        match self {
            Message::Config(_) => FrameKind::Config,
            Message::Packet(_) => FrameKind::Packet,
        }
    }

    /// Serialize into a frame ready for the codec.
    pub fn to_frame(&self) -> Result<Frame> {
        let payload = match self {
            Message::Config(config) => config.to_bytes()?,
            Message::Packet(fields) => serde_json::to_vec(fields)?,
        };
        Ok(Frame::new(self.kind(), payload))
    }

    /// Interpret a frame's payload.
    ///
    /// Every failure here is a [`ProtocolError::FrameMalformed`]: the frame
    /// boundary was intact, so the stream can continue past it.
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        match frame.kind {
            FrameKind::Config => ConfigModel::from_bytes(&frame.payload)
                .map(Message::Config)
                .map_err(|e| ProtocolError::FrameMalformed(format!("config payload: {e}"))),
            FrameKind::Packet => {
                let value: Value = serde_json::from_slice(&frame.payload)
                    .map_err(|e| ProtocolError::FrameMalformed(format!("packet payload: {e}")))?;
                match value {
                    Value::Object(fields) => Ok(Message::Packet(fields)),
                    other => Err(ProtocolError::FrameMalformed(format!(
                        "packet payload must be a JSON object, got {}",
                        json_type_name(&other)
                    ))),
                }
            }
            FrameKind::Unknown(b) => Err(ProtocolError::FrameMalformed(format!(
                "unknown frame kind {b:#04x}"
            ))),
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// A record accepted by the server, stamped on arrival.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    /// Record fields exactly as the client sent them
    pub fields: Fields,
    /// Server clock at the moment the frame was decoded
    pub received_at: SystemTime,
}

impl Packet {
    pub fn new(fields: Fields) -> Self {
        Self {
            fields,
            received_at: SystemTime::now(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Arrival time as milliseconds since the unix epoch.
    pub fn received_at_millis(&self) -> u64 {
        self.received_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default()
    }
}
