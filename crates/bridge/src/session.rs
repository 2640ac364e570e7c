//! Long-lived command sessions.
//!
//! Repeated remote-control and power requests would pay a full
//! connect/handshake per invocation if they went through one-shot helper
//! processes. Instead one `session` process is kept alive per device (and
//! mock flag) and reused: requests are written as JSON lines and answered
//! one-at-a-time, with no pipelining. Per session the lifecycle is
//! absent → starting → ready → active → closed; any session-fatal
//! condition drops the table entry, and the next request transparently
//! spawns a fresh process.

use std::collections::HashMap;
use std::sync::Arc;

use atmo_protocol::{CommandResponse, PowerResponse, STATUS_ERROR, SessionMessage, SessionRequest};
use tokio::sync::Mutex;
use tracing::debug;

use crate::child::{ChildSession, SessionEvent, SessionTable};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::launcher::{HelperOp, Launcher};

/// Key of a reusable command session: one live session per device and
/// mock flag at a time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandKey {
	pub identifier: String,
	pub mock: bool,
}

impl CommandKey {
	pub fn new(identifier: impl Into<String>, mock: bool) -> Self {
		Self {
			identifier: identifier.into(),
			mock,
		}
	}
}

pub struct CommandSessionManager {
	launcher: Arc<Launcher>,
	config: Arc<BridgeConfig>,
	sessions: SessionTable<CommandKey>,
}

impl CommandSessionManager {
	pub fn new(launcher: Arc<Launcher>, config: Arc<BridgeConfig>) -> Self {
		Self {
			launcher,
			config,
			sessions: Arc::new(Mutex::new(HashMap::new())),
		}
	}

	/// Sends a remote-control command over the device's session.
	pub async fn send_command(
		&self,
		identifier: &str,
		command: &str,
		action: &str,
		mock: bool,
	) -> Result<CommandResponse> {
		let key = CommandKey::new(identifier, mock);
		debug!(
			target = "bridge",
			identifier, command, action, mock, "command request"
		);
		let request = SessionRequest::Command {
			command: command.to_string(),
			action: action.to_string(),
		};
		let message = self.send_request(&key, &request).await?;

		if !message.is_ok() {
			let reason = message.failure_reason().unwrap_or("command failed");
			return Err(BridgeError::helper(reason));
		}

		Ok(CommandResponse {
			status: message.status,
			identifier: message.identifier.or_else(|| Some(identifier.to_string())),
			command: message.command.unwrap_or_else(|| command.to_string()),
			action: message.action.unwrap_or_else(|| action.to_string()),
			mock: message.mock,
		})
	}

	/// Sends a power action (`on`, `off`, `status`) over the device's session.
	pub async fn power(&self, identifier: &str, action: &str, mock: bool) -> Result<PowerResponse> {
		let key = CommandKey::new(identifier, mock);
		debug!(target = "bridge", identifier, action, mock, "power request");
		let request = SessionRequest::Power {
			action: action.to_string(),
		};
		let message = self.send_request(&key, &request).await?;

		if !message.is_ok() {
			let reason = message.failure_reason().unwrap_or("power command failed");
			return Err(BridgeError::helper(reason));
		}

		Ok(PowerResponse {
			status: message.status,
			identifier: message.identifier.or_else(|| Some(identifier.to_string())),
			power: message.power,
			power_state: message.power_state,
		})
	}

	/// Writes one request line and awaits exactly one response line on the
	/// session for `key`, creating the session first if needed.
	///
	/// `status: "error"` responses are surfaced as failures but leave the
	/// session open; `fatal: true` and `status: "closing"` tear it down.
	pub async fn send_request(
		&self,
		key: &CommandKey,
		request: &SessionRequest,
	) -> Result<SessionMessage> {
		let session = self.ensure_session(key).await?;

		if let Err(err) = session.write_json(request).await {
			self.close_session(key, Some("failed to write to session"))
				.await;
			return Err(err);
		}

		let message = self.await_message(key, &session).await?;

		if message.is_session_fatal() {
			let reason = message
				.failure_reason()
				.unwrap_or("command session closed")
				.to_string();
			self.close_session(key, Some(&reason)).await;
			return Err(BridgeError::Helper(reason));
		}

		if message.status == STATUS_ERROR {
			// Recoverable, request-scoped failure; the session stays usable.
			let reason = message.failure_reason().unwrap_or("session error");
			return Err(BridgeError::helper(reason));
		}

		Ok(message)
	}

	/// Returns the session for `key`, spawning and handshaking a new
	/// process if none is live. The first line from a new process must be
	/// `{"status":"ready"}`; anything else is a fatal startup error.
	async fn ensure_session(&self, key: &CommandKey) -> Result<Arc<ChildSession>> {
		let session = {
			let mut table = self.sessions.lock().await;
			if let Some(existing) = table.get(key) {
				return Ok(existing.clone());
			}

			let mut args = self.launcher.base_args(key.mock, HelperOp::Session);
			args.push("--identifier".to_string());
			args.push(key.identifier.clone());

			debug!(
				target = "bridge",
				identifier = %key.identifier,
				mock = key.mock,
				"starting command session"
			);
			let session = ChildSession::spawn(
				&mut self.launcher.command(&args),
				self.config.clone(),
				&self.sessions,
				key.clone(),
				format!("command {}", key.identifier),
			)?;
			table.insert(key.clone(), session.clone());
			session
		};

		match self.await_message(key, &session).await {
			Ok(message) if message.is_ready() => Ok(session),
			Ok(message) => {
				let reason = message
					.failure_reason()
					.unwrap_or("session failed to start")
					.to_string();
				self.close_session(key, Some(&reason)).await;
				Err(BridgeError::Helper(reason))
			}
			Err(err) => {
				self.close_session(key, Some("session failed to start")).await;
				Err(err)
			}
		}
	}

	/// Awaits the next response line, translating pipe-level events into
	/// errors and tearing the session down on every terminal condition.
	async fn await_message(
		&self,
		key: &CommandKey,
		session: &Arc<ChildSession>,
	) -> Result<SessionMessage> {
		let event = match session.next_event(self.config.response_timeout).await {
			Ok(event) => event,
			Err(BridgeError::Timeout) => {
				// A late reply would desynchronize the next exchange.
				self.close_session(key, Some("timed out waiting for helper response"))
					.await;
				return Err(BridgeError::Timeout);
			}
			Err(err) => return Err(err),
		};

		match event {
			SessionEvent::Line(line) => match serde_json::from_slice::<SessionMessage>(&line) {
				Ok(message) => Ok(message),
				Err(err) => {
					self.close_session(key, Some("invalid helper response")).await;
					Err(err.into())
				}
			},
			SessionEvent::Stderr(text) => {
				self.close_session(key, Some(&text)).await;
				Err(BridgeError::Helper(text))
			}
			SessionEvent::Closed { reason, .. } => {
				let reason =
					reason.unwrap_or_else(|| "command session closed unexpectedly".to_string());
				self.close_session(key, Some(&reason)).await;
				Err(BridgeError::Helper(reason))
			}
			SessionEvent::Exited(code) => match code {
				Some(code) if code != 0 => Err(BridgeError::helper(format!(
					"command session exited with status {code}"
				))),
				_ => Err(BridgeError::helper("command session closed")),
			},
		}
	}

	/// Removes and tears down the session for `key`. Removal happens
	/// before any pipe work, so re-entrant calls see no session and the
	/// teardown runs at most once.
	pub async fn close_session(&self, key: &CommandKey, reason: Option<&str>) {
		let session = { self.sessions.lock().await.remove(key) };
		let Some(session) = session else {
			return;
		};
		debug!(
			target = "bridge",
			session = session.label(),
			reason = reason.unwrap_or("closed"),
			"closing command session"
		);
		session
			.shutdown(
				Some(reason.unwrap_or("command session closed").to_string()),
				true,
				true,
			)
			.await;
	}

	/// Closes every live session (used before clearing credential storage).
	pub async fn close_all(&self, reason: &str) {
		let keys: Vec<CommandKey> = { self.sessions.lock().await.keys().cloned().collect() };
		for key in keys {
			self.close_session(&key, Some(reason)).await;
		}
	}

	/// Whether a live session exists for `key` (test observability).
	pub async fn has_session(&self, key: &CommandKey) -> bool {
		self.sessions.lock().await.contains_key(key)
	}
}
