//! Runtime errors raised while a machine is running.

use thiserror::Error;

/// Boxed error produced by user entry actions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur during `start` and `transition`.
///
/// None of these are recovered by the engine: they propagate to whoever
/// awaited the call that triggered them, and the machine stays in the last
/// state it successfully entered.
#[derive(Debug, Error)]
pub enum MachineError {
    #[error("Invalid state: {name}")]
    InvalidState { name: String },

    #[error("Already in {name}")]
    AlreadyInState { name: String },

    #[error("Machine is busy in state '{state}'; another transition chain is in flight")]
    Busy { state: String },

    #[error("Entry action failed: {0}")]
    ActionFailed(#[source] BoxError),
}

impl MachineError {
    /// Wrap a user error raised from an entry action.
    ///
    /// ```rust
    /// use micromachine::effects::MachineError;
    ///
    /// let error = MachineError::action("network unreachable");
    /// assert_eq!(error.to_string(), "Entry action failed: network unreachable");
    /// ```
    pub fn action<E>(error: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::ActionFailed(error.into())
    }
}

pub type MachineResult<T> = Result<T, MachineError>;
