//! Simple: state machines for a one-method gRPC server and client
//!
//! This crate holds the pure half of the system. A collaborator (a UI, a
//! CLI, a test) dispatches actions; a reducer applies them to a state value
//! and returns the commands that should run next. Nothing in here performs
//! I/O; the `simple-grpc` crate executes the commands and feeds their
//! completions back in as new actions.
//!
//! ```text
//! action ──> reduce(&mut state) ──> [command, ...] ──> executor
//!   ^                                                     │
//!   └──────────────── completion action ──────────────────┘
//! ```

mod client;
mod error;
mod id;
mod reducer;
mod server;

pub use client::{ClientAction, ClientCommand, ClientState};
pub use error::ErrorKind;
pub use id::InstanceId;
pub use reducer::Reducer;
pub use server::{ALERT_TITLE, Alert, ServerAction, ServerCommand, ServerState};
