//! Core state machine types.
//!
//! This module contains the plain data side of the runtime:
//! - State identifiers via the `State` trait
//! - Context values and their shallow merge
//! - Append-only history of entered states
//! - Events and the listener registry
//!
//! Nothing in here runs entry actions; that lives in `effects`.

mod context;
mod event;
mod history;
mod state;

pub use context::Context;
pub use event::{
    dispatch, EventKind, Listener, ListenerId, Listeners, MachineEvent, SharedListener,
};
pub use history::{HistoryEntry, StateHistory};
pub use state::State;
