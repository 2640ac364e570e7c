//! Command-line front end for the bridge.

pub mod cli;
pub mod commands;
pub mod logging;
