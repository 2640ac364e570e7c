//! Session-multiplexing bridge to the pybridge helper.
//!
//! The helper is an external python program (`python -m pybridge ...`) that
//! implements the actual device discovery, pairing and control protocols.
//! This crate owns everything on our side of that boundary:
//!
//! - locating the python runtime and building per-operation argument
//!   vectors ([`launcher`])
//! - newline framing over the helper's stdio pipes ([`transport`])
//! - long-lived command sessions, one per device, reused across requests
//!   ([`session`])
//! - multi-round PIN pairing flows ([`pairing`])
//! - one-shot invocations for scan, unpair and storage maintenance
//!   ([`runner`])
//!
//! [`Bridge`] ties these together into the typed async operations callers
//! use. Every failure surfaces as a [`BridgeError`] carrying a
//! human-readable message; a failed operation never affects sessions other
//! than its own.

pub mod bridge;
mod child;
pub mod config;
pub mod error;
pub mod launcher;
pub mod pairing;
pub mod runner;
pub mod session;
pub mod transport;

pub use bridge::{Bridge, UnpairOutcome};
pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use pairing::PairingKey;
pub use session::CommandKey;
