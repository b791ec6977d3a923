// Execution State
//
// The tri-state signal every pull operation returns.

use std::fmt;

/// Control state returned by every produce, skip and fetch call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionState {
    /// A dependency would block. Nothing was lost; call again later with the
    /// same arguments.
    Waiting,
    /// Progress was made and more rows may follow.
    HasMore,
    /// The stage is exhausted until it is explicitly reset.
    Done,
}

impl ExecutionState {
    pub fn is_waiting(self) -> bool {
        self == ExecutionState::Waiting
    }

    pub fn is_done(self) -> bool {
        self == ExecutionState::Done
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionState::Waiting => write!(f, "WAITING"),
            ExecutionState::HasMore => write!(f, "HASMORE"),
            ExecutionState::Done => write!(f, "DONE"),
        }
    }
}
