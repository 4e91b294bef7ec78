//! Worker lifecycle.

use crate::engine::{ConversionGateway, Engine};

/// Where the worker is in its life. The engine exists only while `Ready`.
pub enum LifecycleState<E: Engine> {
    Uninitialized,
    Ready(ConversionGateway<E>),
    ShuttingDown,
}

impl<E: Engine> LifecycleState<E> {
    pub fn phase(&self) -> Phase {
        match self {
            LifecycleState::Uninitialized => Phase::Uninitialized,
            LifecycleState::Ready(_) => Phase::Ready,
            LifecycleState::ShuttingDown => Phase::ShuttingDown,
        }
    }

    pub fn gateway(&self) -> Option<&ConversionGateway<E>> {
        match self {
            LifecycleState::Ready(gateway) => Some(gateway),
            _ => None,
        }
    }

    /// Move to `ShuttingDown`, releasing the engine if there was one.
    /// Returns true when an engine was released.
    pub fn shut_down(&mut self) -> bool {
        let previous = std::mem::replace(self, LifecycleState::ShuttingDown);
        matches!(previous, LifecycleState::Ready(_))
    }
}

/// Engine-free view of [`LifecycleState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Uninitialized,
    Ready,
    ShuttingDown,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Uninitialized => "uninitialized",
            Phase::Ready => "ready",
            Phase::ShuttingDown => "shutting_down",
        };
        f.write_str(name)
    }
}

/// Why the message loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Quit,
    EndOfInput,
    /// A frame header declared more than the configured ceiling.
    OversizedFrame(u32),
    /// Reading stdin failed with something other than end-of-stream.
    InputFailed,
    /// A response could not be written; the supervisor is gone.
    OutputFailed,
}
