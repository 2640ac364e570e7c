//! Typed async operations over the helper, multiplexed across sessions.

use std::sync::Arc;

use atmo_protocol::{
	ClearStorageResponse, Device, PairResponse, PowerResponse, ScanResponse, UnpairResponse,
};
use tracing::debug;

use crate::config::BridgeConfig;
use crate::error::Result;
use crate::launcher::{HelperOp, Launcher};
use crate::pairing::PairingSessionManager;
use crate::runner::Runner;
use crate::session::{CommandKey, CommandSessionManager};

/// Result of unpairing every credentialed protocol of a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnpairOutcome {
	pub identifier: String,
	/// Whether any protocol actually had credentials removed.
	pub credentials_removed: bool,
	/// Protocols whose credentials were removed.
	pub protocols: Vec<String>,
}

/// Facade over the helper subprocesses.
///
/// One `Bridge` owns the session tables; operations on different devices
/// proceed concurrently, while requests within one session are strictly
/// serialized. Dropping the `Bridge` kills any remaining helper processes.
pub struct Bridge {
	launcher: Arc<Launcher>,
	runner: Runner,
	commands: CommandSessionManager,
	pairing: PairingSessionManager,
}

impl Bridge {
	pub fn new(config: BridgeConfig) -> Self {
		let config = Arc::new(config);
		let launcher = Arc::new(Launcher::new(&config));
		let runner = Runner::new(launcher.clone());
		let commands = CommandSessionManager::new(launcher.clone(), config.clone());
		let pairing =
			PairingSessionManager::new(launcher.clone(), config.clone(), runner.clone());
		Self {
			launcher,
			runner,
			commands,
			pairing,
		}
	}

	/// Discovers devices on the network.
	pub async fn scan(&self, mock: bool) -> Result<Vec<Device>> {
		let args = self.launcher.base_args(mock, HelperOp::Scan);
		let stdout = self.runner.run(&args).await?;
		let response: ScanResponse = serde_json::from_slice(&stdout)?;
		debug!(
			target = "bridge",
			devices = response.devices.len(),
			mock,
			"scan completed"
		);
		Ok(response.devices)
	}

	/// Pairs a protocol; see [`PairingSessionManager::pair`] for the
	/// dispatch on `pin` and existing interactive state.
	pub async fn pair(
		&self,
		identifier: &str,
		protocol: &str,
		pin: Option<&str>,
		mock: bool,
	) -> Result<PairResponse> {
		self.pairing.pair(identifier, protocol, pin, mock).await
	}

	/// Cancels an in-flight interactive pairing; no-op when none exists.
	pub async fn cancel_pair(&self, identifier: &str, protocol: &str) {
		self.pairing.cancel(identifier, protocol).await;
	}

	/// Sends a remote-control command over the device's command session.
	pub async fn send_command(
		&self,
		identifier: &str,
		command: &str,
		action: &str,
		mock: bool,
	) -> Result<atmo_protocol::CommandResponse> {
		self.commands
			.send_command(identifier, command, action, mock)
			.await
	}

	/// Sends a power action over the device's command session.
	pub async fn power(&self, identifier: &str, action: &str, mock: bool) -> Result<PowerResponse> {
		self.commands.power(identifier, action, mock).await
	}

	/// Removes stored credentials for one protocol. The device's command
	/// session is closed first; its connection authenticated with the
	/// credentials being removed.
	pub async fn unpair(
		&self,
		identifier: &str,
		protocol: &str,
		mock: bool,
	) -> Result<UnpairResponse> {
		self.commands
			.close_session(&CommandKey::new(identifier, mock), None)
			.await;

		let mut args = self.launcher.base_args(mock, HelperOp::Unpair);
		args.push("--identifier".to_string());
		args.push(identifier.to_string());
		args.push("--protocol".to_string());
		args.push(protocol.to_string());

		debug!(target = "bridge", identifier, protocol, mock, "unpair request");
		let stdout = self.runner.run(&args).await?;
		Ok(serde_json::from_slice(&stdout)?)
	}

	/// Unpairs every protocol of `device` that has stored credentials.
	/// When none has, the helper is never launched and the outcome reports
	/// no credentials removed.
	pub async fn unpair_device(&self, device: &Device, mock: bool) -> Result<UnpairOutcome> {
		let targets: Vec<&str> = device
			.protocols
			.iter()
			.filter(|p| p.credentials_present)
			.map(|p| p.protocol.as_str())
			.collect();

		let mut outcome = UnpairOutcome {
			identifier: device.id.clone(),
			credentials_removed: false,
			protocols: Vec::new(),
		};
		for protocol in targets {
			let response = self.unpair(&device.id, protocol, mock).await?;
			if response.credentials_removed {
				outcome.credentials_removed = true;
				outcome.protocols.push(protocol.to_string());
			}
		}
		Ok(outcome)
	}

	/// Deletes the helper's credential storage. Live command sessions are
	/// closed first in real mode, since their credentials are about to
	/// become invalid.
	pub async fn clear_storage(&self, mock: bool) -> Result<ClearStorageResponse> {
		if !mock {
			self.commands.close_all("clearing credentials").await;
		}
		let args = self.launcher.base_args(mock, HelperOp::ClearStorage);
		debug!(target = "bridge", mock, "clear-storage request");
		let stdout = self.runner.run(&args).await?;
		Ok(serde_json::from_slice(&stdout)?)
	}

	/// Command-session observability for callers and tests.
	pub async fn has_command_session(&self, identifier: &str, mock: bool) -> bool {
		self.commands
			.has_session(&CommandKey::new(identifier, mock))
			.await
	}

	/// Pairing-session observability for callers and tests.
	pub async fn has_pairing_session(&self, identifier: &str, protocol: &str) -> bool {
		self.pairing.has_session(identifier, protocol).await
	}
}
