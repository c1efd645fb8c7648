//! User-visible error taxonomy

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The kinds of failure surfaced to whoever renders the state.
///
/// Lower layers have richer errors; they are logged where they happen and
/// collapsed into one of these before re-entering a reducer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The listener could not be allocated or bound.
    #[error("could not start server")]
    CouldNotStart,
    /// The instance is unknown or did not shut down cleanly.
    #[error("could not stop server")]
    CouldNotStop,
    /// The message could not be delivered to the target.
    #[error("could not send message")]
    CouldNotSend,
}
