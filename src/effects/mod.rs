//! The transition engine.
//!
//! This module is the imperative shell around `core`: it owns mutable
//! machine state, runs asynchronous entry actions and notifies listeners.
//!
//! # Key Concepts
//!
//! - **State nodes**: a name plus an optional entry action; no action means terminal
//! - **State machine**: validates transitions, merges context, records history
//! - **Machine handle**: the transition capability handed to entry actions
//! - **Machine trait**: the public shape shared with composites
//!
//! Futures returned by the engine are boxed and `'static`, so they run on
//! any executor.

mod error;
mod machine;
mod node;
mod traits;

pub use error::{BoxError, MachineError, MachineResult};
pub use machine::{MachineHandle, ReentryPolicy, StateMachine};
pub use node::{EntryAction, StateNode};
pub use traits::Machine;
