//! Shell scripts standing in for the python helper.
//!
//! Each test writes a small `/bin/sh` script, points the bridge's explicit
//! python override at it, and drives the real process/pipe machinery
//! against it. Scripts that append `$$` to the pid file let tests count
//! how many helper processes a scenario spawned.

#![cfg(unix)]
#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;

use atmo_bridge::{Bridge, BridgeConfig};
use tempfile::TempDir;

pub struct MockHelper {
	dir: TempDir,
	script: PathBuf,
}

impl MockHelper {
	/// Writes an executable script with the given body. The body may
	/// reference `$PIDFILE`, which is exported to the path returned by
	/// [`MockHelper::pid_count`]'s backing file.
	pub fn new(body: &str) -> Self {
		use std::os::unix::fs::PermissionsExt;

		let dir = TempDir::new().unwrap();
		let script = dir.path().join("helper.sh");
		let pid_file = dir.path().join("pids");
		let contents = format!(
			"#!/bin/sh\nPIDFILE={}\nexport PIDFILE\n{body}\n",
			pid_file.display()
		);
		fs::write(&script, contents).unwrap();
		let mut perms = fs::metadata(&script).unwrap().permissions();
		perms.set_mode(0o755);
		fs::set_permissions(&script, perms).unwrap();
		Self { dir, script }
	}

	pub fn bridge(&self) -> Bridge {
		self.bridge_with(|config| config)
	}

	pub fn bridge_with(&self, adjust: impl FnOnce(BridgeConfig) -> BridgeConfig) -> Bridge {
		let config = BridgeConfig::default().with_python_executable(&self.script);
		Bridge::new(adjust(config))
	}

	/// Number of helper processes that ran `echo $$ >> $PIDFILE`.
	pub fn pid_count(&self) -> usize {
		fs::read_to_string(self.dir.path().join("pids"))
			.map(|contents| contents.lines().count())
			.unwrap_or(0)
	}
}
