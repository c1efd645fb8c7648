//! Simple gRPC demo driver
//!
//! A headless stand-in for the UI: it dispatches the same actions a window
//! would and prints the state it would render.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use simple_core::{ClientAction, ErrorKind, ServerAction};
use simple_grpc::{
    ClientConfig, ClientStore, LiveClient, LiveServer, Registry, ServerConfig, ServerStore,
};

/// Simple gRPC demo - one server, one message, one acknowledgement
#[derive(Parser, Debug)]
#[command(name = "simple-grpc")]
#[command(about = "Drive the Simple gRPC server or client from the terminal")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a server on an ephemeral loopback port and print received messages
    Serve {
        /// Loopback address to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Threads in the server's worker group
        #[arg(long, default_value_t = 1)]
        worker_threads: usize,
        /// Seconds to wait for in-flight calls on shutdown
        #[arg(long, default_value_t = 10)]
        drain_secs: u64,
    },
    /// Send one message to a running server
    Send {
        /// Server port, as printed by `serve`
        #[arg(long)]
        port: String,
        /// Server host
        #[arg(long, default_value = "localhost")]
        host: String,
        /// Seconds before the call is abandoned
        #[arg(long, default_value_t = 5)]
        timeout_secs: u64,
        /// Message text
        message: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();

    match args.command {
        Command::Serve {
            host,
            worker_threads,
            drain_secs,
        } => {
            let config = ServerConfig {
                host,
                worker_threads,
                drain_timeout: Duration::from_secs(drain_secs),
                ..ServerConfig::default()
            };
            serve(config).await
        }
        Command::Send {
            port,
            host,
            timeout_secs,
            message,
        } => {
            let config = ClientConfig {
                host,
                call_timeout: Duration::from_secs(timeout_secs),
            };
            send(config, port, message).await
        }
    }
}

async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let env = LiveServer::new(Arc::new(Registry::new()), config);
    let store = ServerStore::server(Arc::new(env));
    let mut handle = store.handle();

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let running = tokio::spawn(store.run(async move {
        let _ = stop_rx.await;
    }));

    handle.dispatch(ServerAction::StartRequested);
    let state = handle
        .wait_for(|s| s.is_running || s.error.is_some())
        .await
        .ok_or_else(|| anyhow::anyhow!("store stopped unexpectedly"))?;
    let Some(address) = state.address else {
        let _ = stop_tx.send(());
        anyhow::bail!("server failed to start: {:?}", state.error);
    };
    println!("Server running: {}", address);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            changed = handle.changed() => {
                let Some(state) = changed else { break };
                if let Some(alert) = state.pending_alert {
                    println!("{}: {}", alert.title, alert.body);
                    handle.dispatch(alert.dismiss_action);
                }
            }
        }
    }

    handle.dispatch(ServerAction::StopRequested);
    let state = handle
        .wait_for(|s| !s.is_running || s.error == Some(ErrorKind::CouldNotStop))
        .await
        .ok_or_else(|| anyhow::anyhow!("store stopped unexpectedly"))?;
    let _ = stop_tx.send(());
    running.await?;

    if state.is_running {
        anyhow::bail!("server failed to stop");
    }
    println!("Server stopped");
    Ok(())
}

async fn send(config: ClientConfig, port: String, message: String) -> anyhow::Result<()> {
    let mut store = ClientStore::client(Arc::new(LiveClient::new(config)));

    store.apply(ClientAction::PortEdited(port));
    store.apply(ClientAction::MessageEdited(message));
    store.apply(ClientAction::SendRequested);

    // Port 0 fails without issuing a call, so there is nothing to wait for.
    if store.state().error.is_none() {
        let completed = store
            .next_action()
            .await
            .ok_or_else(|| anyhow::anyhow!("store stopped unexpectedly"))?;
        store.apply(completed);
    }

    match store.state().error {
        Some(e) => anyhow::bail!("{}", e),
        None => {
            println!("Message sent");
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                // Fall through to let ctrl_c handle shutdown
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, stopping server");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, stopping server");
        }
    }
}
