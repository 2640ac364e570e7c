use std::io::Write;
use std::time::Duration;

use anyhow::{Context, bail};
use atmo_bridge::{Bridge, BridgeConfig};
use atmo_protocol::{INPUT_ACTIONS, is_known_command};
use serde_json::json;

use crate::cli::{Cli, Commands};

pub async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let mut config = BridgeConfig::default();
    if let Some(python) = &cli.python {
        config = config.with_python_executable(python);
    }
    if let Some(dir) = &cli.resource_dir {
        config = config.with_resource_dir(dir);
    }
    if let Some(secs) = cli.timeout {
        config = config.with_response_timeout(Duration::from_secs(secs));
    }
    let bridge = Bridge::new(config);
    let mock = cli.mock;

    match cli.command {
        Commands::Scan => {
            let devices = bridge.scan(mock).await?;
            print_json(&devices)?;
        }
        Commands::Pair {
            identifier,
            protocol,
            pin,
        } => {
            pair(&bridge, &identifier, &protocol, pin.as_deref(), mock).await?;
        }
        Commands::Command {
            command,
            identifier,
            action,
        } => {
            if !is_known_command(&command) {
                bail!("unknown command: {command}");
            }
            if !INPUT_ACTIONS.contains(&action.as_str()) {
                bail!(
                    "unknown input action: {action} (expected one of {})",
                    INPUT_ACTIONS.join(", ")
                );
            }
            let response = bridge.send_command(&identifier, &command, &action, mock).await?;
            print_json(&response)?;
        }
        Commands::Power { action, identifier } => {
            let response = bridge.power(&identifier, action.as_str(), mock).await?;
            print_json(&response)?;
        }
        Commands::Unpair {
            identifier,
            protocol,
        } => {
            let response = bridge.unpair(&identifier, &protocol, mock).await?;
            print_json(&response)?;
        }
        Commands::ClearStorage => {
            let response = bridge.clear_storage(mock).await?;
            print_json(&response)?;
        }
    }

    Ok(())
}

/// Runs the pairing flow, prompting on the terminal when the device
/// displays a PIN. An empty PIN entry cancels the flow.
async fn pair(
    bridge: &Bridge,
    identifier: &str,
    protocol: &str,
    pin: Option<&str>,
    mock: bool,
) -> anyhow::Result<()> {
    let response = bridge.pair(identifier, protocol, pin, mock).await?;

    if !response.pin_required() {
        print_json(&response)?;
        return Ok(());
    }

    let pin = prompt_pin().await?;
    let Some(pin) = pin else {
        bridge.cancel_pair(identifier, protocol).await;
        print_json(&json!({ "status": "cancelled", "protocol": protocol }))?;
        return Ok(());
    };

    let completed = bridge.pair(identifier, protocol, Some(&pin), mock).await?;
    print_json(&completed)?;
    Ok(())
}

/// Reads the PIN from the terminal; `None` on empty input or EOF.
async fn prompt_pin() -> anyhow::Result<Option<String>> {
    tokio::task::spawn_blocking(|| {
        eprint!("Enter PIN (empty to cancel): ");
        std::io::stderr().flush().ok();
        let mut line = String::new();
        std::io::stdin()
            .read_line(&mut line)
            .context("failed to read PIN")?;
        let trimmed = line.trim();
        Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
    })
    .await?
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
