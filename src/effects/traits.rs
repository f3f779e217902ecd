//! The public shape shared by single machines and composites.

use crate::core::{Context, Listener, ListenerId};
use crate::effects::error::MachineResult;
use futures::future::BoxFuture;

/// Anything that can be started, observed and composed.
///
/// Implemented by [`StateMachine`](crate::effects::StateMachine) and
/// [`Composite`](crate::compose::Composite); the trait is object safe so
/// composites can take both (and each other) as components.
pub trait Machine<C: Context>: Send + Sync {
    /// Snapshot of the current context.
    fn context(&self) -> C;

    /// Enter the initial state, merging `context` first if given.
    ///
    /// The returned future resolves once the chain of entry actions it
    /// triggered has finished or failed. A composite's resolves once the
    /// composite terminates or a component fails.
    fn start(&self, context: Option<C>) -> BoxFuture<'static, MachineResult<()>>;

    /// Register a listener called on every accepted transition.
    fn on_state_changed(&self, listener: Listener<C>) -> ListenerId;

    /// Register a listener called when a terminal state is entered.
    fn on_terminated(&self, listener: Listener<C>) -> ListenerId;

    fn remove_listener(&self, id: ListenerId) -> bool;

    /// Remove every listener registered through this object. Idempotent.
    fn clear_listeners(&self);

    /// Return to the unstarted condition so the machine can run again.
    fn reset(&self);

    /// Name of the most recently entered state, `None` before the first
    /// start. A composite reports the last state any component entered.
    fn state_name(&self) -> Option<String>;

    fn success(&self) -> bool;

    fn terminated(&self) -> bool;
}
