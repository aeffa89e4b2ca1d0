//! Console host for a Jester session.
//!
//! Reads commands from stdin (`mode:ble`, `default:both`, `status`, `log`,
//! `pause`, `resume`, `disconnect`, `quit`) and prints the session log as it
//! grows.

use anyhow::Context;
use jester::{
    init_logging, port_filter, session_config, Config, DeviceDiscovery, DeviceEvent,
    EventRouter, HotplugMonitor, SerialDiscovery, Session, SessionEvent, BUILD_DATE, VERSION,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};

const HELP: &str = "\
Commands:
  mode:<off|bluetooth|ble|both>     switch the accessory now
  default:<off|bluetooth|ble|both>  set the power-up mode
  status                            print the session snapshot as JSON
  log                               print the whole session log
  pause | resume                    simulate the host going to background/foreground
  disconnect                        close the current device
  quit                              exit";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|arg| arg == "--version" || arg == "-V") {
        println!("jester {} (built {})", VERSION, BUILD_DATE);
        return Ok(());
    }

    let config_path = match args.first() {
        Some(path) => PathBuf::from(path),
        None => Config::default_path()?,
    };
    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    init_logging(&config.logging)?;
    tracing::info!("Jester {} starting", VERSION);

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let discovery: Arc<dyn DeviceDiscovery> = Arc::new(SerialDiscovery::new(
        port_filter(&config.discovery),
        events_tx.clone(),
    ));
    let session = Arc::new(Session::new(
        discovery.clone(),
        session_config(&config.session),
    ));

    session.on_alert(|title, message| eprintln!("[{}] {}", title, message));
    let printer = spawn_log_printer(session.subscribe());

    let router = EventRouter::new(session.clone(), discovery.clone());
    let router_task = tokio::task::spawn_blocking(move || router.run_blocking(events_rx));

    let hotplug = HotplugMonitor::new(
        discovery.clone(),
        config.discovery.poll_interval(),
        events_tx.clone(),
    )
    .spawn();

    events_tx.send(DeviceEvent::Resumed)?;
    println!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !handle_input(&session, &events_tx, line.trim()).await? {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }
    }

    tracing::info!("Shutting down...");
    hotplug.abort();
    // The router may already be gone if its thread panicked.
    let _ = events_tx.send(DeviceEvent::Destroyed);
    drop(events_tx);

    if tokio::time::timeout(Duration::from_secs(5), router_task)
        .await
        .is_err()
    {
        tracing::warn!("Event router did not stop in time");
    }
    printer.abort();

    Ok(())
}

/// Handle one console line. Returns false when the user asked to quit.
async fn handle_input(
    session: &Arc<Session>,
    events: &mpsc::UnboundedSender<DeviceEvent>,
    input: &str,
) -> anyhow::Result<bool> {
    match input.to_ascii_lowercase().as_str() {
        "" => {}
        "quit" | "exit" => return Ok(false),
        "help" => println!("{}", HELP),
        "status" => println!("{}", serde_json::to_string_pretty(&session.snapshot())?),
        "log" => {
            for entry in session.log_snapshot() {
                println!("{}", entry);
            }
        }
        "pause" => events.send(DeviceEvent::Paused)?,
        "resume" => events.send(DeviceEvent::Resumed)?,
        "disconnect" => {
            let session = session.clone();
            tokio::task::spawn_blocking(move || session.disconnect()).await?;
        }
        _ => {
            // Writes block for up to the write timeout.
            let session = session.clone();
            let command = input.to_string();
            tokio::task::spawn_blocking(move || session.send(&command)).await?;
        }
    }
    Ok(true)
}

/// Print every new log entry on stdout
fn spawn_log_printer(
    mut events: broadcast::Receiver<SessionEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SessionEvent::LogAppended(entry)) => println!("{}", entry),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Log printer skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
