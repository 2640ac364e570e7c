//! Helper process launching.
//!
//! Resolves which python executable runs the helper module and builds the
//! argument vector for each operation. Resolution is best-effort by design:
//! a missing runtime is not an error here, it surfaces as a spawn failure
//! when the process is actually started.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::config::BridgeConfig;

/// Environment variable that opts a debug build into using a `.venv`
/// under the current working directory.
pub const WORKSPACE_PYTHON_ENV: &str = "ATMO_ALLOW_WORKSPACE_PYTHON";

/// Subcommands of the helper module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelperOp {
	Scan,
	Pair,
	Unpair,
	ClearStorage,
	Session,
}

impl HelperOp {
	pub fn as_str(self) -> &'static str {
		match self {
			HelperOp::Scan => "scan",
			HelperOp::Pair => "pair",
			HelperOp::Unpair => "unpair",
			HelperOp::ClearStorage => "clear-storage",
			HelperOp::Session => "session",
		}
	}
}

/// Resolved launch parameters for helper subprocesses.
///
/// The executable path and environment overrides are computed once at
/// construction; the overrides are merged over the inherited environment
/// each time a process is created.
#[derive(Debug, Clone)]
pub struct Launcher {
	python: PathBuf,
	module: String,
	env_overrides: Vec<(String, String)>,
}

impl Launcher {
	pub fn new(config: &BridgeConfig) -> Self {
		let python = resolve_python_executable(
			config.python_executable.as_deref(),
			config.resource_dir.as_deref(),
		);
		let env_overrides = build_env_overrides(config.resource_dir.as_deref());
		debug!(
			target = "bridge",
			python = %python.display(),
			module = %config.helper_module,
			"resolved helper runtime"
		);
		Self {
			python,
			module: config.helper_module.clone(),
			env_overrides,
		}
	}

	/// `-m <module>` prefix, the `--mock` flag when set, then the
	/// operation's subcommand. Operation-specific flags are appended by
	/// the caller.
	pub fn base_args(&self, mock: bool, op: HelperOp) -> Vec<String> {
		let mut args = vec!["-m".to_string(), self.module.clone()];
		if mock {
			args.push("--mock".to_string());
		}
		args.push(op.as_str().to_string());
		args
	}

	/// A [`Command`] ready to spawn with all three stdio pipes attached.
	pub fn command(&self, args: &[String]) -> Command {
		let mut command = Command::new(&self.python);
		command
			.args(args)
			.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.kill_on_drop(true);
		for (key, value) in &self.env_overrides {
			command.env(key, value);
		}
		command
	}

	pub fn python_path(&self) -> &Path {
		&self.python
	}
}

/// Resolution order: explicit override, bundled virtualenv under the
/// resource directory, (debug builds, opt-in via env var) a workspace
/// virtualenv, then system python.
fn resolve_python_executable(explicit: Option<&Path>, resource_dir: Option<&Path>) -> PathBuf {
	if let Some(path) = explicit {
		return path.to_path_buf();
	}

	if let Some(dir) = resource_dir {
		for candidate in [".venv/bin/python3", ".venv/bin/python"] {
			if let Some(python) = executable_at(dir, candidate) {
				return python;
			}
		}
	}

	if cfg!(debug_assertions) && std::env::var(WORKSPACE_PYTHON_ENV).as_deref() == Ok("1") {
		if let Ok(cwd) = std::env::current_dir() {
			for candidate in [".venv/bin/python3", ".venv/bin/python"] {
				if let Some(python) = executable_at(&cwd, candidate) {
					return python;
				}
			}
		}
	}

	if let Some(python) = executable_at(Path::new("/usr/bin"), "python3") {
		return python;
	}

	PathBuf::from("/usr/bin/python")
}

fn executable_at(directory: &Path, relative: &str) -> Option<PathBuf> {
	let resolved = directory.join(relative);
	is_executable(&resolved).then_some(resolved)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
	use std::os::unix::fs::PermissionsExt;
	std::fs::metadata(path)
		.map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
		.unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
	path.is_file()
}

/// Module search path and unbuffered output for the bundled runtime.
/// Without a resource directory the inherited environment is left alone.
fn build_env_overrides(resource_dir: Option<&Path>) -> Vec<(String, String)> {
	let Some(resource_dir) = resource_dir else {
		return Vec::new();
	};

	let mut python_paths: Vec<String> = Vec::new();
	if let Some(site_packages) = find_site_packages(&resource_dir.join(".venv")) {
		python_paths.push(site_packages.to_string_lossy().into_owned());
	}
	python_paths.push(resource_dir.to_string_lossy().into_owned());
	if let Ok(existing) = std::env::var("PYTHONPATH") {
		if !existing.is_empty() {
			python_paths.push(existing);
		}
	}

	vec![
		("PYTHONUNBUFFERED".to_string(), "1".to_string()),
		("PYTHONPATH".to_string(), python_paths.join(":")),
	]
}

fn find_site_packages(venv_root: &Path) -> Option<PathBuf> {
	let entries = std::fs::read_dir(venv_root.join("lib")).ok()?;
	for entry in entries.flatten() {
		if !entry.file_name().to_string_lossy().starts_with("python") {
			continue;
		}
		let site_packages = entry.path().join("site-packages");
		if site_packages.is_dir() {
			return Some(site_packages);
		}
	}
	None
}
