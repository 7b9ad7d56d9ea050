//! gridlink CLI: drive a grid controller from the command line.

mod usb;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use gridlink_core::config::GridConfig;
use gridlink_core::device::DeviceIdentity;
use gridlink_core::transport::GridTransport;
use gridlink_core::{Command, EventKind, GridEvent, GridHub};
use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use usb::NusbTransport;

const RESPONSE_TIMEOUT: Duration = Duration::from_millis(1000);

#[derive(Parser)]
#[command(name = "gridlink", version, about = "Drive a grid controller over USB")]
struct Cli {
    /// JSON config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Serial number of the grid to use (default: first found).
    #[arg(long, global = true)]
    serial: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Switch {
    On,
    Off,
}

impl From<Switch> for bool {
    fn from(s: Switch) -> Self {
        matches!(s, Switch::On)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List attached grids and their protocol family.
    List,
    /// Print device events until the grid goes away.
    Watch {
        /// Print one JSON object per event.
        #[arg(long)]
        json: bool,
    },
    /// Ask the grid what it is.
    Query,
    /// Read the device id string.
    Id,
    /// Read the grid dimensions.
    Size,
    /// Set one LED.
    Led { x: u8, y: u8, state: Switch },
    /// Set every LED.
    All { state: Switch },
    /// Set global intensity (0-15).
    Intensity { value: i32 },
    /// Set one LED's brightness level (0-15).
    Level { x: u8, y: u8, level: i32 },
    /// Set every LED to one brightness level (0-15).
    LevelAll { level: i32 },
    /// Send a raw JSON command, e.g. '{"type":"led","x":0,"y":0,"on":true}'.
    Send { json: String },
}

fn connect(cli: &Cli) -> Result<GridHub> {
    let config = match &cli.config {
        Some(path) => GridConfig::load(path)?,
        None => GridConfig::default(),
    };
    let hub = GridHub::with_config(config)?;
    let transport: Arc<dyn GridTransport> = Arc::new(NusbTransport::find(cli.serial.as_deref())?);
    let family = hub.connect(transport)?;
    tracing::debug!(%family, "connected");
    Ok(hub)
}

fn subscribe(hub: &GridHub, kinds: &[EventKind]) -> Receiver<GridEvent> {
    let (tx, rx) = channel();
    let tx = Arc::new(Mutex::new(tx));
    for &kind in kinds {
        let tx = Arc::clone(&tx);
        hub.on(kind, move |event| {
            if let Ok(tx) = tx.lock() {
                let _ = tx.send(event.clone());
            }
        });
    }
    rx
}

/// Issue `command` and wait for the first reply of `reply` kind.
fn request(hub: &GridHub, command: Command, reply: EventKind) -> Result<GridEvent> {
    let rx = subscribe(hub, &[reply, EventKind::Error]);
    hub.command(command)?;
    match rx.recv_timeout(RESPONSE_TIMEOUT) {
        Ok(GridEvent::Error { message }) => bail!("device error: {message}"),
        Ok(event) => Ok(event),
        Err(_) => bail!("no {reply:?} reply within {}ms", RESPONSE_TIMEOUT.as_millis()),
    }
}

fn print_event(event: &GridEvent, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }
    match event {
        GridEvent::Input(input) => match input.device_name() {
            Some(name) => println!("device id: {name}"),
            None => println!("{input:?}"),
        },
        GridEvent::Command(cmd) => println!("sent {cmd:?}"),
        GridEvent::Error { message } => println!("error: {message}"),
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::List => {
            let grids = usb::list_grids()?;
            if grids.is_empty() {
                println!("No grids found.");
                println!("Ensure the grid is plugged in and you have USB permissions.");
            }
            for info in &grids {
                let serial = info.serial_number().unwrap_or("<no serial>");
                let family = match DeviceIdentity::classify(serial) {
                    Ok(id) => id.family.to_string(),
                    Err(_) => "unsupported".to_string(),
                };
                println!(
                    "{serial} [{family}] (VID: 0x{:04X}, PID: 0x{:04X}, bus {} addr {})",
                    info.vendor_id(),
                    info.product_id(),
                    info.bus_number(),
                    info.device_address()
                );
            }
        }
        Commands::Watch { json } => {
            let hub = connect(&cli)?;
            let rx = subscribe(
                &hub,
                &[
                    EventKind::KeyDown,
                    EventKind::KeyUp,
                    EventKind::GridSize,
                    EventKind::DeviceId,
                    EventKind::QueryResponse,
                    EventKind::Error,
                ],
            );
            for event in rx {
                print_event(&event, *json)?;
                if matches!(event, GridEvent::Error { .. }) {
                    break;
                }
            }
        }
        Commands::Query => {
            let hub = connect(&cli)?;
            let event = request(&hub, Command::Query, EventKind::QueryResponse)?;
            print_event(&event, false)?;
        }
        Commands::Id => {
            let hub = connect(&cli)?;
            let event = request(&hub, Command::GetId, EventKind::DeviceId)?;
            print_event(&event, false)?;
        }
        Commands::Size => {
            let hub = connect(&cli)?;
            request(&hub, Command::GetGridSize, EventKind::GridSize)?;
            println!("Grid size: {}", hub.size());
        }
        Commands::Led { x, y, state } => {
            connect(&cli)?.led(*x, *y, (*state).into())?;
        }
        Commands::All { state } => {
            connect(&cli)?.led_all((*state).into())?;
        }
        Commands::Intensity { value } => {
            connect(&cli)?.intensity(*value)?;
        }
        Commands::Level { x, y, level } => {
            connect(&cli)?.level(*x, *y, *level)?;
        }
        Commands::LevelAll { level } => {
            connect(&cli)?.level_all(*level)?;
        }
        Commands::Send { json } => {
            let command: Command =
                serde_json::from_str(json).context("parse command JSON")?;
            connect(&cli)?.command(command)?;
        }
    }

    Ok(())
}
