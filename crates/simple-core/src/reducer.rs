//! The reducer trait shared by the server and client state machines

/// A pure transition function over `Self`.
///
/// `reduce` mutates the state in place and returns the commands an
/// executor should run as a result. It must not perform I/O; anything
/// asynchronous is expressed as a command whose completion comes back as
/// another action.
pub trait Reducer {
    /// Input to the state machine.
    type Action;
    /// Side effects requested by a transition.
    type Command;

    /// Apply one action, returning zero or more follow-up commands.
    fn reduce(&mut self, action: Self::Action) -> Vec<Self::Command>;
}
