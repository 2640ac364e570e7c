//! Remote-control command and input-action names accepted by the helper.
//!
//! Commands stay free-form strings at the bridge layer; this catalog exists
//! so front ends can validate input before spawning a process.

/// Directional and menu commands that take an input action.
pub const DIRECTIONAL_COMMANDS: &[&str] = &[
    "up", "down", "left", "right", "select", "menu", "home",
];

/// Playback commands (no input action semantics).
pub const PLAYBACK_COMMANDS: &[&str] = &["play_pause"];

/// Input actions for directional commands.
pub const INPUT_ACTIONS: &[&str] = &["SingleTap", "DoubleTap", "Hold"];

/// Default input action when none is specified.
pub const DEFAULT_INPUT_ACTION: &str = "SingleTap";

/// Power actions accepted by the `power` session request.
pub const POWER_ACTIONS: &[&str] = &["on", "off", "status"];

/// Whether `command` is part of the helper's remote-control catalog.
pub fn is_known_command(command: &str) -> bool {
    DIRECTIONAL_COMMANDS.contains(&command)
        || PLAYBACK_COMMANDS.contains(&command)
        || command == "playpause"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_membership() {
        assert!(is_known_command("select"));
        assert!(is_known_command("play_pause"));
        assert!(is_known_command("playpause"));
        assert!(!is_known_command("eject"));
    }
}
