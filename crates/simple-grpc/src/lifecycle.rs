//! Start, stop and send.
//!
//! Each operation recovers every lower-level failure, logs it, and returns
//! the [`ErrorKind`] the reducer understands.

use simple_core::{ErrorKind, InstanceId};

use crate::bridge::SimpleService;
use crate::config::{ClientConfig, ServerConfig};
use crate::registry::Registry;
use crate::transport;

/// Allocate `id`, bind an ephemeral port and start serving.
///
/// Returns the bound `host:port`. A second start for an id that is already
/// registered fails without allocating anything.
pub async fn start(
    registry: &Registry,
    id: InstanceId,
    config: &ServerConfig,
) -> Result<String, ErrorKind> {
    let reservation = registry
        .reserve(id, config.worker_threads)
        .map_err(|e| {
            tracing::warn!(%id, "Could not start: {}", e);
            ErrorKind::CouldNotStart
        })?;

    let service = SimpleService::new(reservation.slot);
    let listener = match transport::bind_ephemeral(&reservation.worker, &config.host, service).await
    {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%id, "Could not bind: {}", e);
            registry.release(id);
            return Err(ErrorKind::CouldNotStart);
        }
    };

    let addr = listener.local_addr();
    if registry.attach_listener(id, listener).is_err() {
        tracing::error!(%id, "Instance removed while binding");
        return Err(ErrorKind::CouldNotStart);
    }

    tracing::info!(%id, "Server started on {}", addr);
    Ok(addr.to_string())
}

/// Drain and release `id`.
///
/// The entry is only removed once the listener has stopped; a failed drain
/// leaves it registered so the stop can be retried. Unknown ids fail with
/// [`ErrorKind::CouldNotStop`].
pub async fn stop(
    registry: &Registry,
    id: InstanceId,
    config: &ServerConfig,
) -> Result<InstanceId, ErrorKind> {
    let listener = registry.listener(id).map_err(|e| {
        tracing::warn!(%id, "Could not stop: {}", e);
        ErrorKind::CouldNotStop
    })?;

    listener
        .lock()
        .await
        .shutdown(config.drain_timeout)
        .await
        .map_err(|e| {
            tracing::error!(%id, "Shutdown failed: {}", e);
            ErrorKind::CouldNotStop
        })?;

    registry.release(id);
    tracing::info!(%id, "Server stopped");
    Ok(id)
}

/// Send `text` to the port `id` is bound to.
pub async fn send(
    registry: &Registry,
    id: InstanceId,
    config: &ClientConfig,
    text: String,
) -> Result<(), ErrorKind> {
    let Some(port) = registry.port(id) else {
        tracing::warn!(%id, "Could not send: not running");
        return Err(ErrorKind::CouldNotSend);
    };
    send_to(config, port, text).await
}

/// Send `text` to `config.host:port`.
pub async fn send_to(config: &ClientConfig, port: u16, text: String) -> Result<(), ErrorKind> {
    transport::call(&config.host, port, text, config.call_timeout)
        .await
        .map_err(|e| {
            tracing::warn!(port, "Could not send: {}", e);
            ErrorKind::CouldNotSend
        })?;
    tracing::debug!(port, "Message sent");
    Ok(())
}
