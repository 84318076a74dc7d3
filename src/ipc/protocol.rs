//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::behaviors::StickySnapshot;
use crate::dispatch::InputEvent;
use crate::events::OutputEvent;

/// Largest accepted message body
pub const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// Errors decoding a framed message
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("message of {0} bytes exceeds the 1 MiB limit")]
    TooLarge(usize),

    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Requests from clients to daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Request current daemon status
    GetStatus,

    /// A key position changed state
    KeyPosition {
        position: u32,
        pressed: bool,
        #[serde(default)]
        timestamp: Option<i64>,
    },

    /// An encoded keycode changed state outside the keymap
    Keycode {
        encoded: u32,
        pressed: bool,
        #[serde(default)]
        timestamp: Option<i64>,
    },

    /// Ping to check connectivity
    Ping,

    /// Subscribe to output notifications
    Subscribe,
}

impl Request {
    /// Input to forward to the dispatcher, if this request carries one
    pub fn input(&self) -> Option<InputEvent> {
        match *self {
            Request::KeyPosition {
                position,
                pressed,
                timestamp,
            } => Some(InputEvent::Position {
                position,
                pressed,
                timestamp,
            }),
            Request::Keycode {
                encoded,
                pressed,
                timestamp,
            } => Some(InputEvent::Keycode {
                encoded,
                pressed,
                timestamp,
            }),
            Request::GetStatus | Request::Ping | Request::Subscribe => None,
        }
    }
}

/// Responses from daemon to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Current daemon status
    Status(DaemonStatus),

    /// Input queued for the dispatcher
    Accepted,

    /// Pong response to ping
    Pong,

    /// Subscription confirmed
    Subscribed,

    /// Error response
    Error { code: String, message: String },
}

impl Response {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Response::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Push notification from daemon to subscribed clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// Output produced by the dispatcher
    Output { event: OutputEvent },

    /// Notifications were dropped because the client fell behind
    Lagged { skipped: u64 },
}

/// Full daemon status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Sticky modifier state as of the last processed input
    pub sticky: StickySnapshot,

    /// Inputs accepted over IPC
    pub inputs_accepted: u64,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            sticky: StickySnapshot::default(),
            inputs_accepted: 0,
            uptime_secs: 0,
        }
    }
}

/// Check a frame length read off the wire
pub fn check_len(len: usize) -> Result<usize, ProtocolError> {
    if len > MAX_MESSAGE_LEN {
        return Err(ProtocolError::TooLarge(len));
    }
    Ok(len)
}

/// Encode a message as length prefix followed by JSON body
pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>, ProtocolError> {
    let body = serde_json::to_vec(msg)?;
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Decode a request body
pub fn decode_request(body: &[u8]) -> Result<Request, ProtocolError> {
    Ok(serde_json::from_slice(body)?)
}
