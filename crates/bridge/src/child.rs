//! Supervised helper child process shared by the session managers.
//!
//! A [`ChildSession`] owns the stdin handle of a spawned helper plus the
//! event stream produced by its I/O task. The task is the only owner of
//! stdout, stderr and the process handle; it frames stdout into lines,
//! filters stderr through the benign-noise list, observes termination, and
//! finally removes the session from its owning table. Removal from the
//! table is the single authoritative destruction point; every other path
//! funnels through it, so teardown runs exactly once per session.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use atmo_protocol::SessionRequest;
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::transport::{LineBuffer, write_json_line, write_raw_line};

static GENERATIONS: AtomicU64 = AtomicU64::new(0);

/// What the I/O task observed on the helper's pipes.
#[derive(Debug)]
pub(crate) enum SessionEvent {
	/// One complete stdout line.
	Line(Vec<u8>),
	/// Non-suppressed stderr output; authoritative error for the in-flight
	/// request. The I/O task also terminates the process, so the session
	/// ends even when no request is waiting.
	Stderr(String),
	/// Stdout reached end of stream. `reason` is set when the close was
	/// requested on our side; `stderr_tail` carries any non-benign stderr
	/// seen before the stream ended.
	Closed {
		reason: Option<String>,
		stderr_tail: Option<String>,
	},
	/// The process terminated with the given exit code.
	Exited(Option<i32>),
}

/// A live helper subprocess tied to one session-table entry.
pub(crate) struct ChildSession {
	/// Distinguishes this session from a successor under the same key, so
	/// the I/O task's removal never tears down a replacement.
	generation: u64,
	stdin: Mutex<Option<ChildStdin>>,
	/// Receiver side of the event stream. At most one caller may hold it;
	/// `try_lock` failure is the "concurrent reads" condition.
	events: Mutex<mpsc::UnboundedReceiver<SessionEvent>>,
	events_tx: mpsc::UnboundedSender<SessionEvent>,
	kill_tx: mpsc::Sender<()>,
	label: String,
}

pub(crate) type SessionTable<K> = Arc<Mutex<HashMap<K, Arc<ChildSession>>>>;

impl ChildSession {
	/// Spawns the helper and its I/O task. The caller is responsible for
	/// inserting the returned session into `table`; the I/O task removes
	/// it again once the process exits.
	pub(crate) fn spawn<K>(
		command: &mut Command,
		config: Arc<BridgeConfig>,
		table: &SessionTable<K>,
		key: K,
		label: String,
	) -> Result<Arc<ChildSession>>
	where
		K: Eq + Hash + Clone + Send + 'static,
	{
		let mut child = command.spawn().map_err(BridgeError::Launch)?;
		let stdin = child
			.stdin
			.take()
			.ok_or_else(|| BridgeError::helper("helper stdin unavailable"))?;
		let stdout = child
			.stdout
			.take()
			.ok_or_else(|| BridgeError::helper("helper stdout unavailable"))?;
		let stderr = child
			.stderr
			.take()
			.ok_or_else(|| BridgeError::helper("helper stderr unavailable"))?;

		let (events_tx, events_rx) = mpsc::unbounded_channel();
		let (kill_tx, kill_rx) = mpsc::channel(1);
		let generation = GENERATIONS.fetch_add(1, Ordering::Relaxed);

		let session = Arc::new(ChildSession {
			generation,
			stdin: Mutex::new(Some(stdin)),
			events: Mutex::new(events_rx),
			events_tx: events_tx.clone(),
			kill_tx,
			label: label.clone(),
		});

		let weak_table = Arc::downgrade(table);
		tokio::spawn(async move {
			let status = run_io(child, stdout, stderr, events_tx, kill_rx, config).await;
			remove_on_exit(weak_table, key, generation, status, label).await;
		});

		Ok(session)
	}

	/// The next pipe event, honoring the optional response deadline.
	///
	/// Exactly one caller may await at a time; a concurrent attempt fails
	/// fast instead of queuing.
	pub(crate) async fn next_event(&self, timeout: Option<Duration>) -> Result<SessionEvent> {
		let mut events = self
			.events
			.try_lock()
			.map_err(|_| BridgeError::ConcurrentReads)?;
		let event = match timeout {
			Some(limit) => tokio::time::timeout(limit, events.recv())
				.await
				.map_err(|_| BridgeError::Timeout)?,
			None => events.recv().await,
		};
		// A dropped sender means the I/O task is gone, same as a closed stream.
		Ok(event.unwrap_or(SessionEvent::Closed {
			reason: None,
			stderr_tail: None,
		}))
	}

	/// Writes one JSON request line to the helper, or fails with
	/// [`BridgeError::NoActiveSession`] once teardown took the pipe.
	pub(crate) async fn write_json<T: Serialize>(&self, message: &T) -> Result<()> {
		let mut stdin = self.stdin.lock().await;
		match stdin.as_mut() {
			Some(handle) => write_json_line(handle, message).await,
			None => Err(BridgeError::NoActiveSession),
		}
	}

	/// Writes one raw line (PIN entry) to the helper.
	pub(crate) async fn write_raw(&self, line: &str) -> Result<()> {
		let mut stdin = self.stdin.lock().await;
		match stdin.as_mut() {
			Some(handle) => write_raw_line(handle, line).await,
			None => Err(BridgeError::NoActiveSession),
		}
	}

	/// Tears the process down after removal from the table: fails any
	/// pending waiter with `reason`, optionally writes a `{"type":"close"}`
	/// request, closes stdin, and optionally requests termination.
	pub(crate) async fn shutdown(&self, reason: Option<String>, notify_close: bool, kill: bool) {
		let _ = self.events_tx.send(SessionEvent::Closed {
			reason,
			stderr_tail: None,
		});

		let mut stdin = self.stdin.lock().await;
		if notify_close {
			if let Some(handle) = stdin.as_mut() {
				let _ = write_json_line(handle, &SessionRequest::Close).await;
			}
		}
		// Dropping the handle closes the pipe; the helper sees EOF.
		*stdin = None;
		drop(stdin);

		if kill {
			let _ = self.kill_tx.try_send(());
		}
	}

	pub(crate) fn label(&self) -> &str {
		&self.label
	}
}

/// Drives the pipes until the process exits. Stdout is polled before the
/// exit status (biased select), so a pending caller deterministically
/// observes stream closure rather than racing the termination handler.
async fn run_io(
	mut child: Child,
	mut stdout: ChildStdout,
	mut stderr: ChildStderr,
	events: mpsc::UnboundedSender<SessionEvent>,
	mut kill_rx: mpsc::Receiver<()>,
	config: Arc<BridgeConfig>,
) -> Option<i32> {
	let mut lines = LineBuffer::new();
	let mut stdout_chunk = [0u8; 4096];
	let mut stderr_chunk = [0u8; 4096];
	let mut stderr_tail = String::new();
	let mut stdout_open = true;
	let mut stderr_open = true;
	let mut sent_closed = false;
	let mut kill_requested = false;

	let status = loop {
		// Closed carries the stderr tail as the failure reason of record,
		// so it is only emitted once stderr has also been fully drained
		// (or the process is gone).
		if !stdout_open && !stderr_open && !sent_closed {
			sent_closed = true;
			let _ = events.send(SessionEvent::Closed {
				reason: None,
				stderr_tail: stderr_tail_of(&stderr_tail),
			});
		}

		tokio::select! {
			biased;

			read = stdout.read(&mut stdout_chunk), if stdout_open => match read {
				Ok(0) | Err(_) => stdout_open = false,
				Ok(n) => {
					lines.extend(&stdout_chunk[..n]);
					while let Some(line) = lines.next_line() {
						let _ = events.send(SessionEvent::Line(line));
					}
				}
			},

			read = stderr.read(&mut stderr_chunk), if stderr_open => match read {
				Ok(0) | Err(_) => stderr_open = false,
				Ok(n) => {
					let text = String::from_utf8_lossy(&stderr_chunk[..n]);
					if !config.is_stderr_suppressed(&text) {
						let trimmed = text.trim().to_string();
						stderr_tail.push_str(&text);
						let _ = events.send(SessionEvent::Stderr(trimmed));
						// Stderr ends the session whether or not a request
						// is in flight; terminating here routes the idle
						// case through the exit handler's table removal.
						if !kill_requested {
							kill_requested = true;
							let _ = child.start_kill();
						}
					}
				}
			},

			_ = kill_rx.recv(), if !kill_requested => {
				kill_requested = true;
				let _ = child.start_kill();
			}

			status = child.wait() => {
				break status.ok().and_then(|status| status.code());
			}
		}
	};

	if !sent_closed {
		let _ = events.send(SessionEvent::Closed {
			reason: None,
			stderr_tail: stderr_tail_of(&stderr_tail),
		});
	}
	let _ = events.send(SessionEvent::Exited(status));
	status
}

fn stderr_tail_of(accumulated: &str) -> Option<String> {
	let trimmed = accumulated.trim();
	(!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Exit handler: removes the session from its table unless a successor
/// already replaced it under the same key.
async fn remove_on_exit<K>(
	table: Weak<Mutex<HashMap<K, Arc<ChildSession>>>>,
	key: K,
	generation: u64,
	status: Option<i32>,
	label: String,
) where
	K: Eq + Hash,
{
	let Some(table) = table.upgrade() else {
		return;
	};
	let removed = {
		let mut table = table.lock().await;
		match table.get(&key) {
			Some(session) if session.generation == generation => table.remove(&key),
			_ => None,
		}
	};
	if let Some(session) = removed {
		debug!(target = "bridge", session = %label, ?status, "helper process terminated");
		// Close stdin quietly; the pending waiter (if any) already received
		// the Closed/Exited events from the I/O task.
		*session.stdin.lock().await = None;
	}
}
