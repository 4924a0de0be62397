//! State Reflector - host-side harness for the shared state bridge
//!
//! Runs a bridge against stdin/stdout (one message per line) or an
//! interactive REPL.

use anyhow::Result;
use clap::{Parser, ValueEnum};
use state_reflector::bridge::{HostEvent, MpscHostChannel, SyncBridge, PING};
use state_reflector::config::BridgeConfig;
use std::io::BufRead;
use std::rc::Rc;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;

/// State Reflector - keep UI state in sync with a native host
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log output format (logs always go to stderr)
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Run an interactive REPL instead of the stdio peer
    #[arg(long)]
    repl: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(&args.log_level, args.log_format)?;

    info!("Starting State Reflector...");

    let config = match &args.config {
        Some(path) => {
            info!("Configuration file: {}", path);
            BridgeConfig::load(path).await?
        }
        None => BridgeConfig::default(),
    };

    // Bindings are !Send, everything runs on this thread
    let local = tokio::task::LocalSet::new();
    if args.repl {
        local.run_until(run_repl(config)).await?;
    } else {
        local.run_until(run_stdio(config)).await?;
    }

    info!("State Reflector shutdown complete");
    Ok(())
}

async fn run_repl(config: BridgeConfig) -> Result<()> {
    let bridge = SyncBridge::create(config, Some(Rc::new(cli::PrintChannel)));
    let listener = bridge.install_listener()?;
    cli::run_repl(&bridge, &listener).await?;
    bridge.dispose();
    Ok(())
}

/// Host messages arrive on stdin, UI messages leave on stdout
async fn run_stdio(config: BridgeConfig) -> Result<()> {
    let (channel, host_rx) = MpscHostChannel::new();
    let bridge = SyncBridge::create(config, Some(Rc::new(channel)));
    let seeds = bridge.bind_seeds();
    let listener = bridge.install_listener()?;

    let writer = tokio::spawn(write_host_events(host_rx));
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    // Blocking reads stay off the runtime so shutdown never waits on stdin
    std::thread::Builder::new()
        .name("stdin-reader".into())
        .spawn(move || forward_lines(std::io::stdin().lock(), &inbound_tx))?;

    info!(seeds = seeds.len(), "Bridge ready, reading messages from stdin");

    tokio::select! {
        _ = listener.run(inbound_rx) => info!("stdin closed"),
        _ = shutdown_signal() => {}
    }

    // Closing the bridge ends the writer once queued messages are flushed
    drop(seeds);
    bridge.dispose();
    drop(bridge);
    match writer.await {
        Ok(result) => result?,
        Err(e) => warn!("Output writer task failed: {}", e),
    }
    Ok(())
}

/// Forward non-blank lines until input ends or the listener goes away
fn forward_lines(reader: impl BufRead, inbound: &mpsc::UnboundedSender<String>) {
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to read stdin: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        if inbound.send(line).is_err() {
            debug!("Listener gone, stopping stdin reader");
            break;
        }
    }
    debug!("stdin reader finished");
}

async fn write_host_events(mut events: mpsc::UnboundedReceiver<HostEvent>) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    while let Some(event) = events.recv().await {
        let line = match event {
            HostEvent::Message(message) => message,
            HostEvent::Ping => PING.to_string(),
        };
        stdout.write_all(line.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }
    Ok(())
}

fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_thread_names(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()?,
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()?,
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for CTRL+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_forward_lines_skips_blank_lines() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        forward_lines(Cursor::new("PING\n\n   \n{\"a\":1}\n"), &tx);
        drop(tx);

        assert_eq!(rx.try_recv().unwrap(), "PING");
        assert_eq!(rx.try_recv().unwrap(), "{\"a\":1}");
        assert!(rx.try_recv().is_err());
    }

    /// Input that never ends
    struct Endless;

    impl std::io::Read for Endless {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            for (i, byte) in buf.iter_mut().enumerate() {
                *byte = if i % 2 == 0 { b'a' } else { b'\n' };
            }
            Ok(buf.len() - buf.len() % 2)
        }
    }

    #[test]
    fn test_forward_lines_stops_when_listener_is_gone() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        forward_lines(std::io::BufReader::new(Endless), &tx);
        assert!(tx.is_closed());
    }
}
