//! Binary entry point: parses CLI arguments, wires up tracing, and runs the
//! local listen loop alongside the upstream supervisor until shutdown.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use sshclip_agent::{run_supervisor, CacheStore};
use sshclip_core::{EventBus, ShutdownEvent, SystemEnv};
use sshclip_server::run_local;
use sshclip_transport::local::LocalListener;
use sshclip_transport::tcp::PlainTcpDialer;
use tracing::error;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Caching/reconciliation agent: proxies a local Unix socket to an
/// upstream register server, serving reads from a hot local cache.
#[derive(Parser, Debug)]
#[command(name = "sshclip-agent", version, about)]
struct Args {
    /// Path of the local Unix domain socket to serve CLI clients on.
    #[arg(long, default_value = "/tmp/sshclip.sock")]
    local_socket: PathBuf,

    /// Upstream server host.
    #[arg(long)]
    upstream_host: String,

    /// Upstream server port.
    #[arg(long, default_value_t = 2222)]
    upstream_port: u16,

    /// Log level filter, e.g. `info`, `sshclip_agent=debug`.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let args = Args::parse();
    init_tracing(&args.log_level);

    if let Err(err) = run(args).await {
        error!(%err, "agent exited with an error");
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let env = SystemEnv;
    let events = EventBus::new();
    spawn_signal_forwarders(events.clone());

    let (cache, write_back, upstream_slot) = CacheStore::new(env);
    let cache = Arc::new(cache);

    let local_listener = LocalListener::bind(&args.local_socket)?;
    let listen_events = events.clone();
    let listen_cache = Arc::clone(&cache);
    let listen_task =
        tokio::spawn(async move { run_local(local_listener, listen_cache, listen_events).await });

    let supervisor_task = tokio::spawn(run_supervisor(
        env,
        PlainTcpDialer::new(),
        args.upstream_host,
        args.upstream_port,
        cache,
        write_back,
        upstream_slot,
        events,
    ));

    listen_task.await??;
    supervisor_task.await??;
    Ok(())
}

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
