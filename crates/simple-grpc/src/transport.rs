//! Listener binding, worker groups and the outbound unary call.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::{Endpoint, Server};

use crate::proto::{SimpleMessage, simple_client::SimpleClient, simple_server};

/// Errors from the network layer.
///
/// These are logged where they occur and collapsed into
/// [`simple_core::ErrorKind`] by the lifecycle operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The listening socket could not be bound
    #[error("bind failed: {0}")]
    Bind(#[source] std::io::Error),
    /// The worker runtime could not be built
    #[error("worker group failed: {0}")]
    Runtime(#[source] std::io::Error),
    /// The worker group has already been released
    #[error("worker group released")]
    Released,
    /// The server task ended with an error
    #[error("serve failed: {0}")]
    Serve(#[source] tonic::transport::Error),
    /// A worker task panicked or was cancelled
    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    /// The dial target is not a valid URI
    #[error("invalid target: {0}")]
    InvalidTarget(String),
    /// Nothing accepted the connection
    #[error("connect failed: {0}")]
    Connect(#[source] tonic::transport::Error),
    /// The call reached the server but failed
    #[error("call failed: {0}")]
    Status(#[from] tonic::Status),
    /// The operation did not finish in time
    #[error("timed out")]
    Timeout,
    /// Port 0 was given as a dial target
    #[error("no target port")]
    NoTarget,
}

/// The threads running one server instance's network I/O.
///
/// Wraps a dedicated multi-thread tokio runtime. Releasing it (explicitly
/// or by dropping) never blocks, so it is safe from async code.
#[derive(Debug)]
pub struct WorkerGroup {
    runtime: Option<Runtime>,
}

impl WorkerGroup {
    /// Build a worker group with the given number of threads (at least one).
    pub fn new(threads: usize) -> Result<Self, TransportError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(threads.max(1))
            .thread_name("simple-worker")
            .enable_all()
            .build()
            .map_err(TransportError::Runtime)?;
        Ok(Self {
            runtime: Some(runtime),
        })
    }

    /// Handle for spawning onto the group, or `None` once released.
    pub fn handle(&self) -> Option<Handle> {
        self.runtime.as_ref().map(|rt| rt.handle().clone())
    }

    /// Whether [`release`](Self::release) has run.
    pub fn is_released(&self) -> bool {
        self.runtime.is_none()
    }

    /// Stop the threads without waiting for outstanding tasks.
    pub fn release(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl Drop for WorkerGroup {
    fn drop(&mut self) {
        self.release();
    }
}

/// A bound, serving listener.
#[derive(Debug)]
pub struct Listener {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    serve: Option<JoinHandle<Result<(), tonic::transport::Error>>>,
}

impl Listener {
    /// The address the socket is actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// The OS-assigned port.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Whether the serve task has finished.
    pub fn is_stopped(&self) -> bool {
        self.serve.is_none()
    }

    /// Stop accepting and wait for in-flight calls to finish.
    ///
    /// Calling this on a stopped listener is a no-op. If draining takes
    /// longer than `drain_timeout` the listener stays half-stopped and the
    /// call can be retried.
    pub async fn shutdown(&mut self, drain_timeout: Duration) -> Result<(), TransportError> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }

        let Some(serve) = self.serve.as_mut() else {
            return Ok(());
        };

        let joined = tokio::time::timeout(drain_timeout, serve)
            .await
            .map_err(|_| TransportError::Timeout)?;
        self.serve = None;

        joined?.map_err(TransportError::Serve)
    }
}

/// Bind `host:0` on the worker group and start serving `service`.
///
/// Returns once the socket is bound; connections made from then on are
/// queued until the server task accepts them.
pub async fn bind_ephemeral<S>(
    worker: &Handle,
    host: &str,
    service: S,
) -> Result<Listener, TransportError>
where
    S: simple_server::Simple,
{
    let host = host.to_string();

    let listener = worker
        .spawn(async move {
            let socket = TcpListener::bind((host.as_str(), 0))
                .await
                .map_err(TransportError::Bind)?;
            let addr = socket.local_addr().map_err(TransportError::Bind)?;

            let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
            let serve = tokio::spawn(
                Server::builder()
                    .add_service(simple_server::SimpleServer::new(service))
                    .serve_with_incoming_shutdown(TcpListenerStream::new(socket), async move {
                        let _ = shutdown_rx.await;
                    }),
            );

            Ok::<_, TransportError>(Listener {
                addr,
                shutdown: Some(shutdown_tx),
                serve: Some(serve),
            })
        })
        .await??;

    tracing::debug!("Listener bound to {}", listener.addr);
    Ok(listener)
}

/// Issue one `Send` call to `host:port` on a fresh connection.
///
/// The connection is dropped when the call returns. Port 0 fails
/// immediately without dialing.
pub async fn call(
    host: &str,
    port: u16,
    text: String,
    timeout: Duration,
) -> Result<(), TransportError> {
    if port == 0 {
        return Err(TransportError::NoTarget);
    }

    let uri = format!("http://{}:{}", host, port);
    let endpoint = Endpoint::from_shared(uri.clone())
        .map_err(|_| TransportError::InvalidTarget(uri))?
        .connect_timeout(timeout)
        .timeout(timeout);

    let exchange = async {
        let channel = endpoint.connect().await.map_err(TransportError::Connect)?;
        let mut client = SimpleClient::new(channel);
        client.send(SimpleMessage { text }).await?;
        Ok::<(), TransportError>(())
    };

    tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| TransportError::Timeout)?
}
