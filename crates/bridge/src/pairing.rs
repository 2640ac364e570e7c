//! Interactive pairing sessions.
//!
//! Pairing is the one stateful, multi-round exchange in the helper
//! protocol: a `pair --interactive` process reports `pin_required`, the
//! device shows a PIN, and the PIN is written back to the same process to
//! finish. The session table keyed by (device, protocol) carries that
//! state between the two calls. A PIN supplied up front instead runs a
//! one-shot `pair --pin` invocation; the helper terminates itself after
//! every PIN response, so a continued session is always torn down after
//! one round trip, whatever the outcome.

use std::collections::HashMap;
use std::sync::Arc;

use atmo_protocol::PairResponse;
use tokio::sync::Mutex;
use tracing::debug;

use crate::child::{ChildSession, SessionEvent, SessionTable};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::launcher::{HelperOp, Launcher};
use crate::runner::Runner;

/// Key of an interactive pairing session: one live flow per device and
/// protocol at a time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PairingKey {
	pub identifier: String,
	pub protocol: String,
}

impl PairingKey {
	pub fn new(identifier: impl Into<String>, protocol: impl Into<String>) -> Self {
		Self {
			identifier: identifier.into(),
			protocol: protocol.into(),
		}
	}
}

pub struct PairingSessionManager {
	launcher: Arc<Launcher>,
	config: Arc<BridgeConfig>,
	runner: Runner,
	sessions: SessionTable<PairingKey>,
}

impl PairingSessionManager {
	pub fn new(launcher: Arc<Launcher>, config: Arc<BridgeConfig>, runner: Runner) -> Self {
		Self {
			launcher,
			config,
			runner,
			sessions: Arc::new(Mutex::new(HashMap::new())),
		}
	}

	/// Pairs `protocol` on the device, dispatching on the PIN argument and
	/// existing state:
	///
	/// - PIN and a live session → continue the interactive flow.
	/// - PIN and no session → one-shot `pair --pin`.
	/// - no PIN and no session → begin an interactive flow; the session is
	///   retained only when the helper answers `pin_required`.
	/// - no PIN and a live session → [`BridgeError::PairingInProgress`].
	pub async fn pair(
		&self,
		identifier: &str,
		protocol: &str,
		pin: Option<&str>,
		mock: bool,
	) -> Result<PairResponse> {
		let key = PairingKey::new(identifier, protocol);
		let existing = { self.sessions.lock().await.get(&key).cloned() };

		match (pin, existing) {
			(Some(pin), Some(session)) => self.continue_pair(&key, session, pin).await,
			(Some(pin), None) => self.pair_once(identifier, protocol, pin, mock).await,
			(None, Some(_)) => Err(BridgeError::PairingInProgress),
			(None, None) => self.begin_pair(&key, mock).await,
		}
	}

	/// Cancels an interactive flow: removes and terminates the session if
	/// one exists, silently does nothing otherwise.
	pub async fn cancel(&self, identifier: &str, protocol: &str) {
		let key = PairingKey::new(identifier, protocol);
		let session = { self.sessions.lock().await.remove(&key) };
		let Some(session) = session else {
			return;
		};
		debug!(
			target = "bridge",
			identifier, protocol, "cancelling interactive pairing"
		);
		session.shutdown(Some("pairing cancelled".to_string()), false, true).await;
	}

	async fn begin_pair(&self, key: &PairingKey, mock: bool) -> Result<PairResponse> {
		let session = {
			let mut table = self.sessions.lock().await;
			if table.contains_key(key) {
				return Err(BridgeError::PairingInProgress);
			}

			let mut args = self.launcher.base_args(mock, HelperOp::Pair);
			args.push("--interactive".to_string());
			args.push("--identifier".to_string());
			args.push(key.identifier.clone());
			args.push("--protocol".to_string());
			args.push(key.protocol.clone());

			debug!(
				target = "bridge",
				identifier = %key.identifier,
				protocol = %key.protocol,
				mock,
				"beginning interactive pairing"
			);
			let session = ChildSession::spawn(
				&mut self.launcher.command(&args),
				self.config.clone(),
				&self.sessions,
				key.clone(),
				format!("pairing {}/{}", key.identifier, key.protocol),
			)?;
			table.insert(key.clone(), session.clone());
			session
		};

		let response = match self.await_pair_response(&session).await {
			Ok(response) => response,
			Err(err) => {
				self.remove_and_close(key, false).await;
				return Err(err);
			}
		};

		debug!(
			target = "bridge",
			status = %response.status,
			"interactive pairing initial response"
		);
		// Anything but pin_required means the flow already finished; only a
		// pending PIN prompt justifies keeping the process around.
		if !response.pin_required() {
			self.remove_and_close(key, false).await;
		}

		Ok(response)
	}

	/// Single round trip: submit the PIN, read one response, tear down.
	/// The helper terminates after answering a PIN either way.
	async fn continue_pair(
		&self,
		key: &PairingKey,
		session: Arc<ChildSession>,
		pin: &str,
	) -> Result<PairResponse> {
		debug!(
			target = "bridge",
			session = session.label(),
			"submitting PIN to interactive pairing"
		);
		let result = match session.write_raw(pin).await {
			Ok(()) => self.await_pair_response(&session).await,
			Err(err) => Err(err),
		};
		self.remove_and_close(key, false).await;

		if let Ok(response) = &result {
			debug!(
				target = "bridge",
				status = %response.status,
				"interactive pairing completed"
			);
		}
		result
	}

	async fn pair_once(
		&self,
		identifier: &str,
		protocol: &str,
		pin: &str,
		mock: bool,
	) -> Result<PairResponse> {
		let mut args = self.launcher.base_args(mock, HelperOp::Pair);
		args.push("--identifier".to_string());
		args.push(identifier.to_string());
		args.push("--protocol".to_string());
		args.push(protocol.to_string());
		args.push("--pin".to_string());
		args.push(pin.to_string());

		debug!(
			target = "bridge",
			identifier, protocol, mock, "one-shot pair"
		);
		let stdout = self.runner.run(&args).await?;
		let response: PairResponse = serde_json::from_slice(&stdout)?;
		debug!(target = "bridge", status = %response.status, "one-shot pair completed");
		Ok(response)
	}

	/// One pair-response line off the session's pipes. On end of stream the
	/// failure reason is whatever non-benign stderr the process left
	/// behind, defaulting to a generic closed-unexpectedly message.
	async fn await_pair_response(&self, session: &Arc<ChildSession>) -> Result<PairResponse> {
		match session.next_event(self.config.response_timeout).await? {
			SessionEvent::Line(line) => {
				let response: PairResponse = serde_json::from_slice(&line)?;
				Ok(response)
			}
			SessionEvent::Stderr(text) => Err(BridgeError::Helper(text)),
			SessionEvent::Closed { reason, stderr_tail } => {
				let message = reason
					.or(stderr_tail)
					.unwrap_or_else(|| "pairing process closed unexpectedly".to_string());
				Err(BridgeError::Helper(message))
			}
			SessionEvent::Exited(_) => {
				Err(BridgeError::helper("pairing process closed unexpectedly"))
			}
		}
	}

	async fn remove_and_close(&self, key: &PairingKey, kill: bool) {
		let session = { self.sessions.lock().await.remove(key) };
		if let Some(session) = session {
			session.shutdown(None, false, kill).await;
		}
	}

	/// Whether an interactive flow is live for this device and protocol
	/// (test observability).
	pub async fn has_session(&self, identifier: &str, protocol: &str) -> bool {
		self.sessions
			.lock()
			.await
			.contains_key(&PairingKey::new(identifier, protocol))
	}
}
