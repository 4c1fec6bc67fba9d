//! Protocol message types for WebSocket clients.
//!
//! Every frame is one JSON object with a `type` discriminator:
//!
//! ```text
//! client -> bridge   {"type":"subscribe","pvs":["A","B"]}
//!                    {"type":"unsubscribe","pvs":["A"]}     ("clear" is an alias)
//!                    {"type":"write","pv":"A","value":1.5}
//!                    {"type":"list"}
//!                    {"type":"ping"}
//! bridge -> client   {"type":"update","pv":"A", ...present fields only...}
//!                    {"type":"list","pvs":["A","B"]}
//!                    {"type":"error","message":"Unknown message type"}
//! ```

use pvbridge_core::{PvValue, VariableName};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ProtocolError;
use crate::normalize::CanonicalUpdate;

/// Control messages sent by clients to the bridge.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start watching variables
    Subscribe { pvs: Vec<VariableName> },

    /// Stop watching variables
    Unsubscribe { pvs: Vec<VariableName> },

    /// Write a value to a variable
    Write { pv: VariableName, value: PvValue },

    /// Request this client's current subscriptions
    List,

    /// Keep-alive, no reply
    Ping,
}

impl ClientMessage {
    /// Creates a subscribe message.
    pub fn subscribe<I, S>(pvs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<VariableName>,
    {
        Self::Subscribe {
            pvs: pvs.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates an unsubscribe message.
    pub fn unsubscribe<I, S>(pvs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<VariableName>,
    {
        Self::Unsubscribe {
            pvs: pvs.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates a write message.
    pub fn write(pv: impl Into<VariableName>, value: impl Into<PvValue>) -> Self {
        Self::Write {
            pv: pv.into(),
            value: value.into(),
        }
    }

    /// Serializes the message to a JSON text frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Parses one inbound text frame.
///
/// # Errors
///
/// - `MalformedJson` / `NotAnObject` for frames that are not a JSON object
/// - `UnknownType` when `type` is missing or not recognised
/// - `MissingField` / `InvalidField` for structurally wrong payloads
pub fn parse_client_message(text: &str) -> Result<ClientMessage, ProtocolError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::MalformedJson(e.to_string()))?;

    let Value::Object(fields) = value else {
        return Err(ProtocolError::NotAnObject);
    };

    let msg_type = fields.get("type").and_then(Value::as_str);

    match msg_type {
        Some("subscribe") => Ok(ClientMessage::Subscribe {
            pvs: parse_pv_list(&fields)?,
        }),
        Some("unsubscribe" | "clear") => Ok(ClientMessage::Unsubscribe {
            pvs: parse_pv_list(&fields)?,
        }),
        Some("write") => parse_write(&fields),
        Some("list") => Ok(ClientMessage::List),
        Some("ping") => Ok(ClientMessage::Ping),
        other => Err(ProtocolError::UnknownType(other.map(str::to_string))),
    }
}

/// Reads the `pvs` array. A missing field means an empty list.
fn parse_pv_list(fields: &Map<String, Value>) -> Result<Vec<VariableName>, ProtocolError> {
    let Some(raw) = fields.get("pvs") else {
        return Ok(Vec::new());
    };

    let items = raw.as_array().ok_or_else(|| ProtocolError::InvalidField {
        field: "pvs",
        reason: "expected an array of names".to_string(),
    })?;

    items
        .iter()
        .map(|item| {
            let name = item.as_str().ok_or_else(|| ProtocolError::InvalidField {
                field: "pvs",
                reason: format!("expected a string, got {item}"),
            })?;
            VariableName::parse(name).map_err(|e| ProtocolError::invalid("pvs", e))
        })
        .collect()
}

fn parse_write(fields: &Map<String, Value>) -> Result<ClientMessage, ProtocolError> {
    let pv = fields
        .get("pv")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingField("pv"))?;
    let pv = VariableName::parse(pv).map_err(|e| ProtocolError::invalid("pv", e))?;

    let value = match fields.get("value") {
        None | Some(Value::Null) => return Err(ProtocolError::MissingField("value")),
        Some(v) => PvValue::from_json(v).map_err(|e| ProtocolError::invalid("value", e))?,
    };

    Ok(ClientMessage::Write { pv, value })
}

/// Messages sent from the bridge to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// New snapshot of a watched variable
    Update {
        pv: VariableName,
        #[serde(flatten)]
        update: CanonicalUpdate,
    },

    /// The client's current subscriptions
    List { pvs: Vec<VariableName> },

    /// Protocol error for this client
    Error { message: String },
}

impl ServerMessage {
    /// Creates an update message.
    pub fn update(pv: VariableName, update: CanonicalUpdate) -> Self {
        Self::Update { pv, update }
    }

    /// Creates a list response.
    pub fn list(pvs: Vec<VariableName>) -> Self {
        Self::List { pvs }
    }

    /// Creates an error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Serializes the message to a JSON text frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<&ProtocolError> for ServerMessage {
    fn from(err: &ProtocolError) -> Self {
        Self::error(err.to_string())
    }
}
