//! Sequential composition of machines.
//!
//! A [`Composite`] runs its components one after another and exposes the
//! same [`Machine`](crate::effects::Machine) surface as a single machine,
//! so composites can themselves be composed.

pub mod composite;

pub use composite::{compose, Composite};

use crate::builder::BuildError;
use crate::core::Context;
use crate::effects::Machine;
use std::sync::Arc;

/// Fluent alternative to [`compose`].
///
/// ```rust
/// use micromachine::compose::CompositeBuilder;
/// use micromachine::effects::StateMachine;
/// use serde_json::{json, Value};
///
/// let first: StateMachine<String, Value> = StateMachine::new("A", ["B"], json!({}));
/// first.terminal("B");
/// let second: StateMachine<String, Value> = StateMachine::new("C", ["D"], json!({}));
/// second.terminal("D");
///
/// let composite = CompositeBuilder::new()
///     .then(first)
///     .then(second)
///     .build()
///     .unwrap();
/// assert_eq!(composite.len(), 2);
/// ```
pub struct CompositeBuilder<C: Context> {
    machines: Vec<Arc<dyn Machine<C>>>,
}

impl<C: Context> CompositeBuilder<C> {
    pub fn new() -> Self {
        Self {
            machines: Vec::new(),
        }
    }

    /// Append a machine to the chain.
    pub fn then(mut self, machine: impl Machine<C> + 'static) -> Self {
        self.machines.push(Arc::new(machine));
        self
    }

    /// Append an already shared machine.
    pub fn then_shared(mut self, machine: Arc<dyn Machine<C>>) -> Self {
        self.machines.push(machine);
        self
    }

    pub fn build(self) -> Result<Composite<C>, BuildError> {
        compose(self.machines)
    }
}

impl<C: Context> Default for CompositeBuilder<C> {
    fn default() -> Self {
        Self::new()
    }
}
