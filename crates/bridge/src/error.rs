use thiserror::Error;

pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Debug, Error)]
pub enum BridgeError {
	/// The helper executable could not be started.
	#[error("failed to launch helper process: {0}")]
	Launch(#[source] std::io::Error),

	/// Failure reported by the helper (stderr text, `error` fields, exit
	/// diagnostics). The message is shown to the user verbatim.
	#[error("{0}")]
	Helper(String),

	/// An interactive pairing session already exists for this device and
	/// protocol.
	#[error("pairing already in progress")]
	PairingInProgress,

	/// A second response read was attempted while one was outstanding.
	#[error("concurrent session reads not supported")]
	ConcurrentReads,

	/// The session for this key disappeared between lookup and use.
	#[error("no active session")]
	NoActiveSession,

	/// The configured response deadline elapsed.
	#[error("timed out waiting for helper response")]
	Timeout,

	/// The helper produced a line that is not the expected JSON shape.
	#[error("invalid helper response: {0}")]
	Protocol(#[from] serde_json::Error),

	#[error(transparent)]
	Io(#[from] std::io::Error),
}

impl BridgeError {
	/// Helper failure with the given user-facing message.
	pub fn helper(message: impl Into<String>) -> Self {
		BridgeError::Helper(message.into())
	}
}
