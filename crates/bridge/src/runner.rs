//! One-shot helper invocations.
//!
//! Scan, one-shot pair, unpair and clear-storage run the helper once,
//! wait for it to finish, and parse the whole stdout as a single JSON
//! response. No session state is retained.

use std::process::Stdio;
use std::sync::Arc;

use tracing::debug;

use crate::error::{BridgeError, Result};
use crate::launcher::Launcher;

#[derive(Clone)]
pub struct Runner {
	launcher: Arc<Launcher>,
}

impl Runner {
	pub fn new(launcher: Arc<Launcher>) -> Self {
		Self { launcher }
	}

	/// Runs the helper with `args` to completion and returns its stdout.
	///
	/// A nonzero exit fails with the trimmed stderr text ("unknown error"
	/// when it is empty); a spawn failure surfaces immediately with no
	/// retry.
	pub async fn run(&self, args: &[String]) -> Result<Vec<u8>> {
		debug!(target = "bridge", ?args, "launching one-shot helper");
		let child = self
			.launcher
			.command(args)
			.stdin(Stdio::null())
			.spawn()
			.map_err(BridgeError::Launch)?;

		let output = child.wait_with_output().await?;
		if output.status.success() {
			debug!(
				target = "bridge",
				bytes = output.stdout.len(),
				"one-shot helper succeeded"
			);
			return Ok(output.stdout);
		}

		let stderr = String::from_utf8_lossy(&output.stderr);
		let trimmed = stderr.trim();
		let message = if trimmed.is_empty() {
			"unknown error".to_string()
		} else {
			trimmed.to_string()
		};
		debug!(
			target = "bridge",
			status = ?output.status.code(),
			error = %message,
			"one-shot helper failed"
		);
		Err(BridgeError::Helper(message))
	}
}
