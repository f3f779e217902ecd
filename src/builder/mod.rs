//! Builder API for declaring state machines.
//!
//! This module provides a fluent builder, a serializable configuration and
//! the `state_enum!` macro for creating machines with minimal boilerplate.
//! The builder is stricter than the engine: it rejects duplicate state
//! names and final or initial states that were never declared.

pub mod config;
pub mod error;
pub mod machine;
pub mod macros;

pub use config::{Finals, MachineConfig};
pub use error::{BuildError, BuildErrors};
pub use machine::MachineBuilder;
