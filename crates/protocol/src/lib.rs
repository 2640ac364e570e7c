//! Wire types for the pybridge helper protocol.
//!
//! This crate contains the serde-serializable types exchanged with the
//! python helper over its JSON interfaces: scan results on stdout of
//! one-shot invocations, and newline-delimited session messages on the
//! stdin/stdout pipes of long-lived `session` and interactive `pair`
//! processes. Field names match the helper's snake_case JSON exactly.
//!
//! Types here are pure data; the process and session machinery lives in
//! `atmo-bridge`.

pub mod commands;
pub mod device;
pub mod responses;
pub mod session;

pub use commands::*;
pub use device::*;
pub use responses::*;
pub use session::*;
