//! Client state machine
//!
//! The client keeps no connection between calls; every send dials the
//! target port afresh.

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::reducer::Reducer;

/// Everything a collaborator needs to render the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientState {
    /// Port to dial; 0 means no target
    pub target_port: u16,
    /// Text being edited for the next send
    pub outbound_message: String,
    /// Most recent send failure, cleared by the next successful send
    pub error: Option<ErrorKind>,
}

/// Inputs to the client state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientAction {
    /// The port field changed. Non-numeric input selects port 0.
    PortEdited(String),
    /// The outbound text changed.
    MessageEdited(String),
    /// Collaborator asked to clear the outbound text.
    ClearRequested,
    /// Collaborator asked to send the outbound text.
    SendRequested,
    /// The send finished.
    SendCompleted(Result<(), ErrorKind>),
}

/// Side effects requested by client transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    /// Issue the unary call.
    Send {
        /// Target port on the configured host
        port: u16,
        /// Message text
        text: String,
    },
    /// Surface a recovered failure.
    Report(ErrorKind),
}

impl ClientState {
    /// Create a client state with no target.
    pub fn new() -> Self {
        Self::default()
    }
}

fn parse_port(input: &str) -> u16 {
    input.trim().parse().unwrap_or(0)
}

impl Reducer for ClientState {
    type Action = ClientAction;
    type Command = ClientCommand;

    fn reduce(&mut self, action: ClientAction) -> Vec<ClientCommand> {
        match action {
            ClientAction::PortEdited(input) => {
                self.target_port = parse_port(&input);
                vec![]
            }
            ClientAction::MessageEdited(text) => {
                self.outbound_message = text;
                vec![]
            }
            ClientAction::ClearRequested => {
                self.outbound_message.clear();
                vec![]
            }
            ClientAction::SendRequested => {
                // Port 0 is "no target": fail without dialing and keep the text.
                if self.target_port == 0 {
                    self.error = Some(ErrorKind::CouldNotSend);
                    return vec![ClientCommand::Report(ErrorKind::CouldNotSend)];
                }
                let text = std::mem::take(&mut self.outbound_message);
                vec![ClientCommand::Send {
                    port: self.target_port,
                    text,
                }]
            }
            ClientAction::SendCompleted(Ok(())) => {
                self.error = None;
                vec![]
            }
            ClientAction::SendCompleted(Err(kind)) => {
                self.error = Some(kind);
                vec![ClientCommand::Report(kind)]
            }
        }
    }
}
