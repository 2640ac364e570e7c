use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "atmo")]
#[command(about = "Remote control for streaming devices via the pybridge helper")]
#[command(version)]
pub struct Cli {
    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Use deterministic mock responses instead of contacting devices
    #[arg(long, global = true)]
    pub mock: bool,

    /// Python executable running the helper (bypasses resolution)
    #[arg(long, global = true, value_name = "PATH")]
    pub python: Option<PathBuf>,

    /// Directory holding the bundled python runtime
    #[arg(long, global = true, value_name = "DIR")]
    pub resource_dir: Option<PathBuf>,

    /// Deadline in seconds for each helper response (default: none)
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Discover devices on the network
    Scan,

    /// Pair a protocol, prompting for a PIN when the device requires one
    Pair {
        /// Device identifier (id, name or address)
        #[arg(long)]
        identifier: String,
        /// Protocol to pair (e.g. companion, airplay, raop)
        #[arg(long)]
        protocol: String,
        /// PIN shown by the device; runs a one-shot pairing when given
        #[arg(long)]
        pin: Option<String>,
    },

    /// Send a remote-control command
    #[command(alias = "cmd")]
    Command {
        /// Command name (up, down, left, right, select, menu, home, play_pause)
        command: String,
        #[arg(long)]
        identifier: String,
        /// Input action for directional commands
        #[arg(long, default_value = atmo_protocol::DEFAULT_INPUT_ACTION)]
        action: String,
    },

    /// Send a power action or query the power state
    Power {
        action: PowerAction,
        #[arg(long)]
        identifier: String,
    },

    /// Remove stored credentials for a protocol
    Unpair {
        #[arg(long)]
        identifier: String,
        #[arg(long)]
        protocol: String,
    },

    /// Delete the helper's credential storage
    ClearStorage,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum PowerAction {
    On,
    Off,
    Status,
}

impl PowerAction {
    pub fn as_str(self) -> &'static str {
        match self {
            PowerAction::On => "on",
            PowerAction::Off => "off",
            PowerAction::Status => "status",
        }
    }
}
