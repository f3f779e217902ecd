//! Observable binding for driving views from a machine.
//!
//! A [`MachineBinding`] mirrors machine progress into a
//! [`tokio::sync::watch`] channel so any consumer (a UI loop, a status
//! endpoint, a test) can read the latest [`Snapshot`] or await changes.
//! Dropping the binding clears every listener on the machine, including
//! ones registered elsewhere. Bind a composite rather than one of its
//! components: a composite's wiring to its components is not one of its
//! own listeners and survives.

pub mod run;

pub use run::run_machine;

use crate::core::{Context, Listener, MachineEvent};
use crate::effects::{Machine, MachineResult};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tracing::trace;

/// Render state mirrored from a machine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot<C> {
    /// Last entered state, `None` until the machine starts
    pub state: Option<String>,
    pub context: C,
    pub success: bool,
    pub terminated: bool,
}

impl<C: Context> Snapshot<C> {
    fn of(machine: &dyn Machine<C>) -> Self {
        Self {
            state: machine.state_name(),
            context: machine.context(),
            success: machine.success(),
            terminated: machine.terminated(),
        }
    }
}

pub struct MachineBinding<C: Context> {
    machine: Option<Arc<dyn Machine<C>>>,
    sender: Arc<watch::Sender<Snapshot<C>>>,
}

impl<C: Context> MachineBinding<C> {
    /// Bind a machine, taking ownership of it.
    pub fn new(machine: impl Machine<C> + 'static) -> Self {
        Self::from_shared(Arc::new(machine))
    }

    /// Bind a machine that is also held elsewhere.
    pub fn from_shared(machine: Arc<dyn Machine<C>>) -> Self {
        let (sender, _) = watch::channel(Snapshot::of(machine.as_ref()));
        let sender = Arc::new(sender);

        machine.on_state_changed(mirror(&machine, &sender));
        machine.on_terminated(mirror(&machine, &sender));

        Self {
            machine: Some(machine),
            sender,
        }
    }

    /// Bind `machine` and start it right away.
    ///
    /// The returned future drives the run; the binding already reflects
    /// every transition while it is polled.
    pub fn auto_start(
        machine: impl Machine<C> + 'static,
        context: Option<C>,
    ) -> (Self, BoxFuture<'static, MachineResult<()>>) {
        let binding = Self::new(machine);
        let run = binding.start(context);
        (binding, run)
    }

    /// Latest mirrored state.
    pub fn snapshot(&self) -> Snapshot<C> {
        self.sender.borrow().clone()
    }

    /// Receiver notified on every mirrored event.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot<C>> {
        self.sender.subscribe()
    }

    /// Whether a machine is bound.
    pub fn ready(&self) -> bool {
        self.machine.is_some()
    }

    /// Start the bound machine. Resolves immediately once unbound.
    pub fn start(&self, context: Option<C>) -> BoxFuture<'static, MachineResult<()>> {
        match &self.machine {
            Some(machine) => machine.start(context),
            None => Box::pin(futures::future::ready(Ok(()))),
        }
    }

    pub fn machine(&self) -> Option<&Arc<dyn Machine<C>>> {
        self.machine.as_ref()
    }

    /// Clear all of the machine's listeners and release it.
    pub fn unbind(&mut self) {
        if let Some(machine) = self.machine.take() {
            machine.clear_listeners();
            trace!(state = ?machine.state_name(), "binding released");
        }
    }
}

impl<C: Context> Drop for MachineBinding<C> {
    fn drop(&mut self) {
        self.unbind();
    }
}

fn mirror<C: Context>(
    machine: &Arc<dyn Machine<C>>,
    sender: &Arc<watch::Sender<Snapshot<C>>>,
) -> Listener<C> {
    let machine: Weak<dyn Machine<C>> = Arc::downgrade(machine);
    let sender = Arc::clone(sender);
    Box::new(move |event: &MachineEvent<C>| {
        let Some(machine) = machine.upgrade() else {
            return;
        };
        let snapshot = Snapshot {
            state: Some(event.state.clone()),
            context: event.context.clone(),
            success: machine.success(),
            terminated: machine.terminated(),
        };
        sender.send_replace(snapshot);
    })
}
