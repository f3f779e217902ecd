//! State nodes and their asynchronous entry actions.

use crate::core::{Context, State};
use crate::effects::error::MachineResult;
use crate::effects::machine::MachineHandle;
use futures::future::{BoxFuture, FutureExt};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Type alias for entry action functions.
///
/// An action receives a handle bound to the machine being run and a
/// snapshot of its context. It typically ends by calling
/// `handle.transition(..)` exactly once.
pub type EntryAction<S, C> =
    Arc<dyn Fn(MachineHandle<S, C>, C) -> BoxFuture<'static, MachineResult<()>> + Send + Sync>;

/// A named node in a machine.
///
/// A node without an entry action is terminal: entering it ends the run
/// and no transition ever leaves it.
pub struct StateNode<S: State, C: Context> {
    name: S,
    on_enter: Option<EntryAction<S, C>>,
}

impl<S: State, C: Context> StateNode<S, C> {
    /// Create a node that runs `action` when entered.
    pub fn new<F, Fut>(name: impl Into<S>, action: F) -> Self
    where
        F: Fn(MachineHandle<S, C>, C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = MachineResult<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            on_enter: Some(Arc::new(move |handle: MachineHandle<S, C>, context: C| {
                action(handle, context).boxed()
            })),
        }
    }

    /// Create a terminal node.
    pub fn terminal(name: impl Into<S>) -> Self {
        Self {
            name: name.into(),
            on_enter: None,
        }
    }

    /// Create a node from an already boxed action, or a terminal one.
    pub fn from_parts(name: S, on_enter: Option<EntryAction<S, C>>) -> Self {
        Self { name, on_enter }
    }

    pub fn name(&self) -> &S {
        &self.name
    }

    pub fn is_terminal(&self) -> bool {
        self.on_enter.is_none()
    }

    /// Run the entry action, if any. Errors are returned unchanged.
    pub async fn emit_on_enter(
        &self,
        handle: MachineHandle<S, C>,
        context: C,
    ) -> MachineResult<()> {
        match &self.on_enter {
            Some(action) => action(handle, context).await,
            None => Ok(()),
        }
    }
}

impl<S: State, C: Context> Clone for StateNode<S, C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            on_enter: self.on_enter.clone(),
        }
    }
}

impl<S: State, C: Context> fmt::Debug for StateNode<S, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateNode")
            .field("name", &self.name)
            .field("terminal", &self.is_terminal())
            .finish()
    }
}
