use std::path::PathBuf;
use std::time::Duration;

/// Stderr substrings that are known-benign runtime noise, never an error
/// signal. Seeded with the OpenSSL deprecation warning urllib3 emits on
/// LibreSSL systems; the list is configuration because new benign warnings
/// appear as the helper's dependencies evolve.
pub const DEFAULT_SUPPRESSED_STDERR: &[&str] = &["NotOpenSSLWarning"];

/// Configuration for a [`Bridge`](crate::Bridge).
#[derive(Debug, Clone)]
pub struct BridgeConfig {
	/// Explicit python executable, bypassing resolution.
	pub python_executable: Option<PathBuf>,
	/// Module invoked as `python -m <module>`.
	pub helper_module: String,
	/// Directory holding the bundled python runtime (`.venv/...`).
	pub resource_dir: Option<PathBuf>,
	/// Substrings marking stderr output as benign noise.
	pub suppressed_stderr: Vec<String>,
	/// Deadline for the ready handshake and each response await. `None`
	/// waits indefinitely, relying on process-termination signals.
	pub response_timeout: Option<Duration>,
}

impl Default for BridgeConfig {
	fn default() -> Self {
		Self {
			python_executable: None,
			helper_module: "pybridge".to_string(),
			resource_dir: None,
			suppressed_stderr: DEFAULT_SUPPRESSED_STDERR
				.iter()
				.map(|s| s.to_string())
				.collect(),
			response_timeout: None,
		}
	}
}

impl BridgeConfig {
	pub fn with_python_executable(mut self, path: impl Into<PathBuf>) -> Self {
		self.python_executable = Some(path.into());
		self
	}

	pub fn with_helper_module(mut self, module: impl Into<String>) -> Self {
		self.helper_module = module.into();
		self
	}

	pub fn with_resource_dir(mut self, dir: impl Into<PathBuf>) -> Self {
		self.resource_dir = Some(dir.into());
		self
	}

	pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
		self.response_timeout = Some(timeout);
		self
	}

	pub fn with_suppressed_stderr<I, S>(mut self, patterns: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.suppressed_stderr = patterns.into_iter().map(Into::into).collect();
		self
	}

	/// Whether `text` is benign stderr noise that must not fail a request.
	/// Empty output is always ignored.
	pub fn is_stderr_suppressed(&self, text: &str) -> bool {
		let trimmed = text.trim();
		if trimmed.is_empty() {
			return true;
		}
		self.suppressed_stderr
			.iter()
			.any(|pattern| trimmed.contains(pattern.as_str()))
	}
}
