//! Newline-delimited messages exchanged with a long-lived `session` process.

use serde::{Deserialize, Serialize};

/// Session message status announcing the helper is connected and ready.
pub const STATUS_READY: &str = "ready";
/// Session message status of a successful request.
pub const STATUS_OK: &str = "ok";
/// Session message status of a recoverable, request-scoped failure.
pub const STATUS_ERROR: &str = "error";
/// Session message status announcing the helper is shutting down.
pub const STATUS_CLOSING: &str = "closing";

/// A request written to a session process's stdin, one JSON object per line.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionRequest {
    Command { command: String, action: String },
    Power { action: String },
    Close,
}

/// A response line read from a session process's stdout.
///
/// Besides the operation fields, `error`, `message` and `fatal` drive the
/// protocol-level decision of whether a failure is scoped to the request
/// or invalidates the whole session.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionMessage {
    pub status: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub identifier: Option<String>,
    pub command: Option<String>,
    pub action: Option<String>,
    pub power: Option<String>,
    pub power_state: Option<String>,
    pub error: Option<String>,
    pub message: Option<String>,
    pub fatal: Option<bool>,
    pub mock: Option<bool>,
    pub name: Option<String>,
}

impl SessionMessage {
    pub fn is_ready(&self) -> bool {
        self.status == STATUS_READY
    }

    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }

    /// Whether this message invalidates the whole session rather than the
    /// in-flight request.
    pub fn is_session_fatal(&self) -> bool {
        self.fatal == Some(true) || self.status == STATUS_CLOSING
    }

    /// Human-readable failure reason, preferring `error` over `message`.
    pub fn failure_reason(&self) -> Option<&str> {
        self.error.as_deref().or(self.message.as_deref())
    }
}
