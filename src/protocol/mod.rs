use crate::entity::EntityState;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;


/// Literal text frame asking the feed server to resend current state
pub const REFRESH_COMMAND: &str = "REFRESH";

/// Raw inbound envelope, before payload validation
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type", default)]
    pub msg_type: Option<String>,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Every message type the feed server is known to emit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    InitialState,
    UserUpdate,
    SessionStatus,
    System,
    LogEntry,
    Error,
    // Known to the server but not acted on by this client
    ClientRequest,
    LoginRequired,
    LoginResult,
}

impl MessageType {
    pub fn parse(raw: &str) -> Option<Self> {
        let parsed = match raw {
            "INITIAL_STATE" => MessageType::InitialState,
            "USER_UPDATE" => MessageType::UserUpdate,
            "SESSION_STATUS" => MessageType::SessionStatus,
            "SYSTEM" => MessageType::System,
            "LOG_ENTRY" => MessageType::LogEntry,
            "ERROR" => MessageType::Error,
            "CLIENT_REQUEST" => MessageType::ClientRequest,
            "LOGIN_REQUIRED" => MessageType::LoginRequired,
            "LOGIN_RESULT" => MessageType::LoginResult,
            _ => return None,
        };
        Some(parsed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::InitialState => "INITIAL_STATE",
            MessageType::UserUpdate => "USER_UPDATE",
            MessageType::SessionStatus => "SESSION_STATUS",
            MessageType::System => "SYSTEM",
            MessageType::LogEntry => "LOG_ENTRY",
            MessageType::Error => "ERROR",
            MessageType::ClientRequest => "CLIENT_REQUEST",
            MessageType::LoginRequired => "LOGIN_REQUIRED",
            MessageType::LoginResult => "LOGIN_RESULT",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server → Client: session availability
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusPayload {
    pub has_active_session: bool,
    #[serde(default)]
    pub last_session_time_ms: Option<i64>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl SessionStatusPayload {
    pub fn last_session_time(&self) -> Option<DateTime<Utc>> {
        self.last_session_time_ms
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
    }
}

/// Server → Client: out-of-band control
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SystemPayload {
    #[serde(default)]
    pub action: Option<String>,
}

impl SystemPayload {
    pub fn is_shutdown(&self) -> bool {
        self.action.as_deref() == Some("SHUTDOWN")
    }
}

/// Server → Client: server-side diagnostic log line
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LogEntryPayload {
    /// "request" or "response"
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    /// Epoch milliseconds, or an RFC 3339 string from older servers
    #[serde(default)]
    pub timestamp: Option<Value>,
}

impl LogEntryPayload {
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self.timestamp.as_ref()? {
            Value::Number(n) => n
                .as_i64()
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
            Value::String(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            _ => None,
        }
    }
}

/// Server → Client: backend failure report
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ErrorPayload {
    #[serde(default)]
    pub message: Option<String>,
}

/// Validated inbound message, one variant per payload shape
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    InitialState {
        entities: Vec<EntityState>,
        server_started_at: Option<DateTime<Utc>>,
    },
    UserUpdate(EntityState),
    SessionStatus(SessionStatusPayload),
    System(SystemPayload),
    LogEntry(LogEntryPayload),
    Error(ErrorPayload),
    /// Recognized type this client does not act on
    Unhandled(MessageType),
    /// Type outside the known set (or missing)
    Unknown(Option<String>),
}

/// Protocol faults: the frame is logged and discarded
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolError {
    MalformedEnvelope(String),
    InvalidPayload {
        message_type: MessageType,
        reason: String,
    },
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::MalformedEnvelope(reason) => {
                write!(f, "malformed envelope: {}", reason)
            }
            ProtocolError::InvalidPayload {
                message_type,
                reason,
            } => write!(f, "invalid {} payload: {}", message_type, reason),
        }
    }
}

impl std::error::Error for ProtocolError {}

impl InboundMessage {
    /// Parse a text frame into a typed message
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(raw)
            .map_err(|e| ProtocolError::MalformedEnvelope(e.to_string()))?;
        Self::from_envelope(envelope)
    }

    pub fn from_envelope(envelope: Envelope) -> Result<Self, ProtocolError> {
        let Some(message_type) = envelope.msg_type.as_deref().and_then(MessageType::parse) else {
            return Ok(InboundMessage::Unknown(envelope.msg_type));
        };

        let message = match message_type {
            MessageType::InitialState => {
                if !envelope.payload.is_array() {
                    return Err(ProtocolError::InvalidPayload {
                        message_type,
                        reason: "payload must be an array".to_string(),
                    });
                }
                InboundMessage::InitialState {
                    entities: payload(message_type, envelope.payload)?,
                    server_started_at: server_start_time(envelope.metadata.as_ref()),
                }
            }
            MessageType::UserUpdate => {
                InboundMessage::UserUpdate(payload(message_type, envelope.payload)?)
            }
            MessageType::SessionStatus => {
                InboundMessage::SessionStatus(payload(message_type, envelope.payload)?)
            }
            MessageType::System => InboundMessage::System(payload(message_type, envelope.payload)?),
            MessageType::LogEntry => {
                InboundMessage::LogEntry(payload(message_type, envelope.payload)?)
            }
            MessageType::Error => {
                // The server sometimes sends a bare string payload
                let error = match envelope.payload {
                    Value::String(message) => ErrorPayload {
                        message: Some(message),
                    },
                    Value::Null => ErrorPayload { message: None },
                    other => payload(message_type, other)?,
                };
                InboundMessage::Error(error)
            }
            MessageType::ClientRequest | MessageType::LoginRequired | MessageType::LoginResult => {
                InboundMessage::Unhandled(message_type)
            }
        };

        Ok(message)
    }
}

fn payload<T: serde::de::DeserializeOwned>(
    message_type: MessageType,
    value: Value,
) -> Result<T, ProtocolError> {
    serde_json::from_value(value).map_err(|e| ProtocolError::InvalidPayload {
        message_type,
        reason: e.to_string(),
    })
}

fn server_start_time(metadata: Option<&Value>) -> Option<DateTime<Utc>> {
    let start = metadata?.get("serverStartTime")?;
    match start {
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    }
}

/// Commands carried in the JSON command envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerCommand {
    Shutdown,
}

/// Client → Server: JSON command envelope
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename = "COMMAND")]
pub struct CommandMessage {
    pub command: ServerCommand,
}

/// Client → Server frames
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Refresh,
    Command(ServerCommand),
}

impl OutboundFrame {
    pub fn to_text(&self) -> serde_json::Result<String> {
        match self {
            OutboundFrame::Refresh => Ok(REFRESH_COMMAND.to_string()),
            OutboundFrame::Command(command) => {
                serde_json::to_string(&CommandMessage { command: *command })
            }
        }
    }
}
