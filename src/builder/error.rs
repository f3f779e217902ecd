//! Build errors for machine definitions and composites.

use std::fmt;
use thiserror::Error;

/// Errors that can occur when building machines and composites.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("Initial state not specified. Call .initial(state) before .build()")]
    MissingInitialState,

    #[error("Context not specified. Call .context(value) before .build()")]
    MissingContext,

    #[error("No states defined. Add at least one state")]
    NoStates,

    #[error("State '{name}' is declared more than once")]
    DuplicateState { name: String },

    #[error("Initial state '{name}' is not declared")]
    UnknownInitialState { name: String },

    #[error("No final states specified. Call .final_state(state) or .final_states(states)")]
    NoFinalStates,

    #[error("Final state '{name}' is not declared")]
    UnknownFinalState { name: String },

    #[error("Final state '{name}' has an entry action; final states must be terminal")]
    FinalStateNotTerminal { name: String },

    #[error("At least two machines are required, got {count}")]
    TooFewMachines { count: usize },
}

/// Every problem found in one definition, in discovery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildErrors(Vec<BuildError>);

impl BuildErrors {
    pub fn new(errors: Vec<BuildError>) -> Self {
        Self(errors)
    }

    pub fn errors(&self) -> &[BuildError] {
        &self.0
    }

    pub fn contains(&self, error: &BuildError) -> bool {
        self.0.contains(error)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for BuildErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid machine definition")?;
        for error in &self.0 {
            write!(f, "; {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for BuildErrors {}

impl From<BuildError> for BuildErrors {
    fn from(error: BuildError) -> Self {
        Self(vec![error])
    }
}
