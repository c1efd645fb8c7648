//! Server state machine

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::id::InstanceId;
use crate::reducer::Reducer;

/// Title of the alert raised for every received message.
pub const ALERT_TITLE: &str = "Message Received";

/// An alert waiting to be shown and dismissed by the collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    /// Alert title
    pub title: String,
    /// Alert body
    pub body: String,
    /// Action to dispatch when the alert's button is pressed
    pub dismiss_action: ServerAction,
}

/// Everything a collaborator needs to render the server.
///
/// `is_running` and `address` move together: the address is present
/// exactly while the server is running.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerState {
    /// Whether a listener is bound
    pub is_running: bool,
    /// Bound `host:port`, present while running
    pub address: Option<String>,
    /// Most recent failure, until a later success of the same kind
    pub error: Option<ErrorKind>,
    /// Text being edited for the next self-send
    pub outbound_message: String,
    /// Last message whose alert was dismissed
    pub last_received_message: Option<String>,
    /// Alert for a message that arrived but has not been dismissed
    pub pending_alert: Option<Alert>,
}

/// Inputs to the server state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerAction {
    /// Collaborator asked to start the server.
    StartRequested,
    /// Binding finished with the bound address or an error.
    StartCompleted(Result<String, ErrorKind>),
    /// Collaborator asked to stop the server.
    StopRequested,
    /// Shutdown finished with the stopped instance or an error.
    StopCompleted(Result<InstanceId, ErrorKind>),
    /// The outbound text changed.
    MessageEdited(String),
    /// Collaborator asked to send the outbound text to this server.
    SendRequested,
    /// The self-send finished.
    SendCompleted(Result<(), ErrorKind>),
    /// A message arrived over RPC.
    MessageReceived(String),
    /// Collaborator asked for the listener to be (re)installed.
    SubscriptionRequested,
    /// The listener is installed.
    SubscriptionEstablished,
    /// The alert was closed without pressing its button.
    AlertDismissRequested,
    /// The alert's button was pressed for the given message.
    AlertDismissed(String),
}

/// Side effects requested by server transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerCommand {
    /// Allocate the instance and bind an ephemeral port.
    Start,
    /// Shut the instance down and release it.
    Stop,
    /// Install the store as the instance's message listener.
    Subscribe,
    /// Drop the installed listener.
    Unsubscribe,
    /// Issue the unary call against this server's own port.
    Send {
        /// Message text
        text: String,
    },
    /// Surface a recovered failure.
    Report(ErrorKind),
}

impl ServerState {
    /// Create a stopped server state.
    pub fn new() -> Self {
        Self::default()
    }

    fn fail(&mut self, kind: ErrorKind) -> Vec<ServerCommand> {
        self.error = Some(kind);
        vec![ServerCommand::Report(kind)]
    }

    // A success only clears the error it supersedes.
    fn clear_error(&mut self, kind: ErrorKind) {
        if self.error == Some(kind) {
            self.error = None;
        }
    }
}

impl Reducer for ServerState {
    type Action = ServerAction;
    type Command = ServerCommand;

    fn reduce(&mut self, action: ServerAction) -> Vec<ServerCommand> {
        match action {
            ServerAction::StartRequested => {
                if self.is_running {
                    return vec![];
                }
                vec![ServerCommand::Start]
            }
            ServerAction::StartCompleted(Ok(address)) => {
                self.is_running = true;
                self.address = Some(address);
                self.clear_error(ErrorKind::CouldNotStart);
                vec![ServerCommand::Subscribe]
            }
            ServerAction::StartCompleted(Err(kind)) => self.fail(kind),

            ServerAction::StopRequested => vec![ServerCommand::Stop],
            ServerAction::StopCompleted(Ok(_)) => {
                self.is_running = false;
                self.address = None;
                self.clear_error(ErrorKind::CouldNotStop);
                vec![ServerCommand::Unsubscribe]
            }
            ServerAction::StopCompleted(Err(kind)) => self.fail(kind),

            ServerAction::MessageEdited(text) => {
                self.outbound_message = text;
                vec![]
            }
            ServerAction::SendRequested => {
                if !self.is_running {
                    return vec![];
                }
                let text = std::mem::take(&mut self.outbound_message);
                vec![ServerCommand::Send { text }]
            }
            ServerAction::SendCompleted(Ok(())) => {
                self.clear_error(ErrorKind::CouldNotSend);
                vec![]
            }
            ServerAction::SendCompleted(Err(kind)) => self.fail(kind),

            ServerAction::MessageReceived(text) => {
                self.pending_alert = Some(Alert {
                    title: ALERT_TITLE.to_string(),
                    body: text.clone(),
                    dismiss_action: ServerAction::AlertDismissed(text),
                });
                vec![]
            }
            ServerAction::AlertDismissRequested => {
                self.pending_alert = None;
                vec![]
            }
            ServerAction::AlertDismissed(text) => {
                self.last_received_message = Some(text);
                self.pending_alert = None;
                vec![]
            }

            ServerAction::SubscriptionRequested => {
                if !self.is_running {
                    return vec![];
                }
                vec![ServerCommand::Subscribe]
            }
            ServerAction::SubscriptionEstablished => vec![],
        }
    }
}
