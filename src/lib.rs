//! Micromachine: a small async state machine runtime
//!
//! A machine is a set of named states, an initial state, one or more final
//! states and a context value. Entering a state runs its asynchronous entry
//! action, which typically does some work and then transitions onward,
//! passing a partial context that is shallow-merged into the machine's.
//! A state without an entry action is terminal; the machine succeeded if
//! that state is one of its finals.
//!
//! # Core Concepts
//!
//! - **State**: identifiers via the `State` trait (strings or `state_enum!` enums)
//! - **Context**: the value carried by a machine, updated by shallow merge
//! - **History**: every entered state with its entry time
//! - **Composition**: run machines in sequence, stopping at the first failure
//! - **Binding**: mirror progress into a watch channel for views
//!
//! # Example
//!
//! ```rust
//! use micromachine::{MachineBuilder, StateMachine};
//! use serde_json::{json, Value};
//!
//! # futures::executor::block_on(async {
//! let machine: StateMachine<String, Value> = MachineBuilder::new()
//!     .context(json!({ "people": [] }))
//!     .initial("INITIAL")
//!     .final_state("FINAL")
//!     .state("INITIAL", |machine, _| async move {
//!         let people = json!([{ "name": "Thomas", "age": 22 }]);
//!         machine.transition("FINAL", Some(json!({ "people": people }))).await
//!     })
//!     .terminal("FINAL")
//!     .build()
//!     .unwrap();
//!
//! machine.start(None).await.unwrap();
//!
//! assert!(machine.success());
//! assert_eq!(machine.history().names(), vec!["INITIAL", "FINAL"]);
//! assert_eq!(machine.context()["people"][0]["name"], "Thomas");
//! # });
//! ```

pub mod binding;
pub mod builder;
pub mod compose;
pub mod core;
pub mod effects;

// Re-export commonly used types
pub use binding::{run_machine, MachineBinding, Snapshot};
pub use builder::{BuildError, BuildErrors, MachineBuilder, MachineConfig};
pub use compose::{compose, Composite, CompositeBuilder};
pub use crate::core::{Context, MachineEvent, State, StateHistory};
pub use effects::{
    Machine, MachineError, MachineHandle, MachineResult, ReentryPolicy, StateMachine,
};
