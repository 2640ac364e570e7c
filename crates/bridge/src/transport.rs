//! Newline framing over the helper's stdio pipes.
//!
//! The helper writes one JSON object per line on stdout and reads one JSON
//! object per line on stdin. Pipe reads deliver arbitrary chunks, so
//! incoming bytes are buffered and complete lines peeled off as they
//! arrive. A zero-length read means the peer closed its end; that is a
//! session-closed signal for the owner, never an empty line.

use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;

use crate::error::Result;

const NEWLINE: u8 = b'\n';

/// Accumulates stdout bytes and extracts newline-delimited frames.
#[derive(Debug, Default)]
pub struct LineBuffer {
	buffer: Vec<u8>,
}

impl LineBuffer {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn extend(&mut self, chunk: &[u8]) {
		self.buffer.extend_from_slice(chunk);
	}

	/// The bytes before the first newline, with the newline discarded and
	/// the remainder retained. Call repeatedly to drain multiple buffered
	/// lines from one chunk.
	pub fn next_line(&mut self) -> Option<Vec<u8>> {
		let newline = self.buffer.iter().position(|&b| b == NEWLINE)?;
		let mut line: Vec<u8> = self.buffer.drain(..=newline).collect();
		line.pop();
		Some(line)
	}

	pub fn is_empty(&self) -> bool {
		self.buffer.is_empty()
	}
}

/// Serializes `message`, appends the newline terminator, and writes the
/// frame in one call. Fails with an I/O error once the pipe is closed.
pub async fn write_json_line<T: Serialize>(stdin: &mut ChildStdin, message: &T) -> Result<()> {
	let mut frame = serde_json::to_vec(message)?;
	frame.push(NEWLINE);
	stdin.write_all(&frame).await?;
	stdin.flush().await?;
	Ok(())
}

/// Writes a raw line (PIN entry for interactive pairing).
pub async fn write_raw_line(stdin: &mut ChildStdin, line: &str) -> Result<()> {
	let mut frame = line.as_bytes().to_vec();
	frame.push(NEWLINE);
	stdin.write_all(&frame).await?;
	stdin.flush().await?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn drains_multiple_lines_from_one_chunk() {
		let mut buffer = LineBuffer::new();
		buffer.extend(b"{\"a\":1}\n{\"b\":2}\n");

		assert_eq!(buffer.next_line().as_deref(), Some(b"{\"a\":1}".as_slice()));
		assert_eq!(buffer.next_line().as_deref(), Some(b"{\"b\":2}".as_slice()));
		assert_eq!(buffer.next_line(), None);
		assert!(buffer.is_empty());
	}

	#[test]
	fn retains_partial_line() {
		let mut buffer = LineBuffer::new();
		buffer.extend(b"{\"status\":\"re");
		assert_eq!(buffer.next_line(), None);

		buffer.extend(b"ady\"}\n{\"tail");
		assert_eq!(
			buffer.next_line().as_deref(),
			Some(b"{\"status\":\"ready\"}".as_slice())
		);
		assert_eq!(buffer.next_line(), None);
		assert!(!buffer.is_empty());
	}

	#[test]
	fn bare_newline_is_an_empty_line() {
		let mut buffer = LineBuffer::new();
		buffer.extend(b"\n");
		assert_eq!(buffer.next_line().as_deref(), Some(b"".as_slice()));
		assert!(buffer.is_empty());
	}
}
