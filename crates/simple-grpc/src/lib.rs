//! Simple gRPC Server and Client
//!
//! Runs the I/O half of the Simple demo: a one-method gRPC service bound to
//! an ephemeral loopback port, a registry of running instances, and a
//! store that feeds reducer commands to the network and network events
//! back to the reducer.
//!
//! # Architecture
//!
//! Every server instance owns its own worker runtime. Inbound calls are
//! handled there and forwarded to whichever store is subscribed to the
//! instance as a `MessageReceived` action on that store's channel. The
//! store applies actions one at a time, so reducer transitions never
//! interleave with each other or with network work.
//!
//! # Example Flow
//!
//! ```text
//! Collaborator          Store                 Registry / Worker
//! │                       │                           │
//! │  StartRequested       │                           │
//! │ ─────────────────────>│  reserve + bind :0        │
//! │                       │ ─────────────────────────>│
//! │                       │  StartCompleted(addr)     │
//! │                       │<───────────────────────── │
//! │                       │  Subscribe                │
//! │                       │ ─────────────────────────>│
//! │                       │                           │ <── Send(text)
//! │                       │  MessageReceived(text)    │
//! │                       │<───────────────────────── │ ──> Empty
//! │  state.pending_alert  │                           │
//! │<───────────────────── │                           │
//! ```

pub mod proto;

pub mod bridge;
pub mod config;
pub mod environment;
pub mod lifecycle;
pub mod registry;
pub mod store;
pub mod transport;

pub use bridge::{SimpleService, Subscription, subscribe};
pub use config::{ClientConfig, ServerConfig};
pub use environment::{ClientEnvironment, LiveClient, LiveServer, ServerEnvironment};
pub use registry::Registry;
pub use store::{ClientStore, ServerStore, Store, StoreHandle};
pub use transport::TransportError;

// Re-export proto types for convenience
pub use proto::{
    Empty, SimpleMessage, simple_client::SimpleClient, simple_server::SimpleServer,
};
