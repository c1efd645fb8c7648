//! The I/O the stores depend on, behind traits so tests can replace it.

use std::sync::Arc;

use async_trait::async_trait;
use simple_core::{ErrorKind, InstanceId};

use crate::bridge::{self, ActionSender, Subscription};
use crate::config::{ClientConfig, ServerConfig};
use crate::lifecycle;
use crate::registry::Registry;

/// Operations a server store performs.
#[async_trait]
pub trait ServerEnvironment: Send + Sync {
    /// Allocate and bind `id`, returning its address.
    async fn start(&self, id: InstanceId) -> Result<String, ErrorKind>;

    /// Shut `id` down and release it.
    async fn stop(&self, id: InstanceId) -> Result<InstanceId, ErrorKind>;

    /// Call the server `id` with `text`.
    async fn send(&self, id: InstanceId, text: String) -> Result<(), ErrorKind>;

    /// Install `actions` as the listener for messages arriving at `id`.
    fn subscribe(&self, id: InstanceId, actions: ActionSender) -> Subscription;
}

/// Operations a client store performs.
#[async_trait]
pub trait ClientEnvironment: Send + Sync {
    /// Call the server on `port` with `text`.
    async fn send(&self, port: u16, text: String) -> Result<(), ErrorKind>;
}

/// Real servers in a shared [`Registry`].
#[derive(Debug, Clone)]
pub struct LiveServer {
    registry: Arc<Registry>,
    config: ServerConfig,
}

impl LiveServer {
    /// Create an environment over `registry`.
    pub fn new(registry: Arc<Registry>, config: ServerConfig) -> Self {
        Self { registry, config }
    }

    /// The registry instances are tracked in.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
}

#[async_trait]
impl ServerEnvironment for LiveServer {
    async fn start(&self, id: InstanceId) -> Result<String, ErrorKind> {
        lifecycle::start(&self.registry, id, &self.config).await
    }

    async fn stop(&self, id: InstanceId) -> Result<InstanceId, ErrorKind> {
        lifecycle::stop(&self.registry, id, &self.config).await
    }

    async fn send(&self, id: InstanceId, text: String) -> Result<(), ErrorKind> {
        lifecycle::send(&self.registry, id, &self.config.call, text).await
    }

    fn subscribe(&self, id: InstanceId, actions: ActionSender) -> Subscription {
        bridge::subscribe(&self.registry, id, actions)
    }
}

/// Real outbound calls.
#[derive(Debug, Clone, Default)]
pub struct LiveClient {
    config: ClientConfig,
}

impl LiveClient {
    /// Create an environment dialing with `config`.
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ClientEnvironment for LiveClient {
    async fn send(&self, port: u16, text: String) -> Result<(), ErrorKind> {
        lifecycle::send_to(&self.config, port, text).await
    }
}
