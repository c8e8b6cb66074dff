//! Command-line interface for uartgate.
//!
//! Talks to a running `uartgated` over its HTTP API.
//!
//! ```bash
//! uartgate-cli ports
//! uartgate-cli connect /dev/ttyUSB0
//! uartgate-cli led on
//! uartgate-cli --url http://pi.local:5000 status
//! ```

use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};

use uartgate::{
    api::v1::{ActionResponse, CommandResponse},
    api_client::{ApiClient, DEFAULT_URL},
};

/// Control a microcontroller through the uartgate daemon
#[derive(Parser)]
#[command(name = "uartgate-cli")]
#[command(version)]
#[command(about = "Control a microcontroller through the uartgate daemon")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Daemon base URL
    #[arg(short, long, global = true, default_value = DEFAULT_URL)]
    url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Show link status
    Status,

    /// List serial ports on the daemon's host
    Ports,

    /// Connect to PORT, or reconnect/discover if omitted
    Connect {
        /// Serial port path (e.g., /dev/ttyUSB0, COM3)
        port: Option<String>,
    },

    /// Close the serial link
    Disconnect,

    /// Switch the LED
    Led {
        #[arg(value_enum)]
        state: LedState,
    },

    /// Send one raw command character
    Send {
        /// Single ASCII character
        command: char,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum LedState {
    On,
    Off,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = ApiClient::new(&cli.url)?;

    match cli.command {
        Commands::Status => {
            let status = client.status().await?;
            println!("{} ({})", status.status, status.port);
        }
        Commands::Ports => {
            let ports = client.ports().await?.ports;
            if ports.is_empty() {
                println!("No serial ports found.");
            }
            for entry in ports {
                let marker = if entry.candidate { "*" } else { " " };
                println!(
                    "{marker} {:<16} {:<40} {}",
                    entry.port.device, entry.port.description, entry.port.hwid
                );
            }
        }
        Commands::Connect { port } => action(client.connect(port.as_deref()).await?)?,
        Commands::Disconnect => action(client.disconnect().await?)?,
        Commands::Led { state } => {
            command(client.led(matches!(state, LedState::On)).await?)?;
        }
        Commands::Send { command: c } => {
            if !c.is_ascii() {
                bail!("command must be an ASCII character");
            }
            command(client.send(c).await?)?;
        }
    }

    Ok(())
}

fn action(resp: ActionResponse) -> Result<()> {
    if resp.status != "success" {
        bail!(resp.message);
    }
    println!("{}", resp.message);
    Ok(())
}

fn command(resp: CommandResponse) -> Result<()> {
    if resp.status != "success" {
        bail!(resp.message);
    }
    match resp.response {
        Some(reply) => println!("{}: {reply}", resp.message),
        None => println!("{}", resp.message),
    }
    Ok(())
}
