//! Binary entry point: parses CLI arguments, wires up tracing, and runs the
//! listen loop(s) until an interrupt or terminate signal arrives.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use sshclip_core::{EventBus, InMemoryStore, ShutdownEvent, SystemEnv};
use sshclip_server::{run_local, run_tcp};
use sshclip_transport::local::LocalListener;
use sshclip_transport::tcp::PlainTcpListener;
use tracing::{error, info};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Register synchronization server: a single authoritative store reachable
/// over a local socket and, optionally, plain TCP.
#[derive(Parser, Debug)]
#[command(name = "sshclip-server", version, about)]
struct Args {
    /// Path of the local Unix domain socket to listen on.
    #[arg(long, default_value = "/tmp/sshclip.sock")]
    local_socket: PathBuf,

    /// Additional address to listen on for plain-TCP agent connections.
    #[arg(long)]
    tcp_bind: Option<SocketAddr>,

    /// Log level filter, e.g. `info`, `sshclip_server=debug`.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let args = Args::parse();
    init_tracing(&args.log_level);

    if let Err(err) = run(args).await {
        error!(%err, "server exited with an error");
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(InMemoryStore::new(SystemEnv));
    let events = EventBus::new();

    spawn_signal_forwarders(events.clone());

    let local_listener = LocalListener::bind(&args.local_socket)?;
    let local_events = events.clone();
    let local_store = Arc::clone(&store);
    let mut tasks = vec![tokio::spawn(async move {
        run_local(local_listener, local_store, local_events).await.map_err(to_boxed)
    })];

    if let Some(addr) = args.tcp_bind {
        let tcp_listener = PlainTcpListener::bind(addr).await?;
        let tcp_events = events.clone();
        let tcp_store = Arc::clone(&store);
        tasks.push(tokio::spawn(async move {
            run_tcp(tcp_listener, tcp_store, tcp_events).await.map_err(to_boxed)
        }));
    }

    for task in tasks {
        task.await??;
    }
    info!("server shut down cleanly");
    Ok(())
}

fn to_boxed(err: sshclip_server::ListenError) -> Box<dyn std::error::Error + Send + Sync> {
    Box::new(err)
}

/// Maps `SIGINT`/`SIGTERM` onto the shutdown bus, the way the listen loops
/// expect to hear about them.
fn spawn_signal_forwarders(events: EventBus) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let interrupt_events = events.clone();
        tokio::spawn(async move {
            if let Ok(mut stream) = signal(SignalKind::interrupt()) {
                stream.recv().await;
                interrupt_events.publish(&ShutdownEvent::Interrupt);
            }
        });

        tokio::spawn(async move {
            if let Ok(mut stream) = signal(SignalKind::terminate()) {
                stream.recv().await;
                events.publish(&ShutdownEvent::Terminate);
            }
        });
    }
}
