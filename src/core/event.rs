//! Machine events and the listener registry shared by machines and composites.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Payload delivered to listeners.
///
/// `context` is an owned snapshot; mutating it never affects the machine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MachineEvent<C> {
    /// Name of the state that was entered
    pub state: String,
    /// Context after the transition was applied
    pub context: C,
}

/// Which notification a listener is registered for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    StateChanged,
    Terminated,
}

/// Handle returned on registration, used to remove a single listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Callback invoked synchronously on every matching event.
pub type Listener<C> = Box<dyn Fn(&MachineEvent<C>) + Send + Sync>;

pub type SharedListener<C> = Arc<dyn Fn(&MachineEvent<C>) + Send + Sync>;

/// Multi-subscriber registry, notified in registration order.
///
/// The registry holds no lock of its own; owners keep it behind their
/// mutex and call [`Listeners::snapshot`] so that callbacks run with the
/// lock released.
pub struct Listeners<C> {
    next_id: u64,
    entries: Vec<(ListenerId, EventKind, SharedListener<C>)>,
}

impl<C> Default for Listeners<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Listeners<C> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            entries: Vec::new(),
        }
    }

    pub fn add(&mut self, kind: EventKind, listener: Listener<C>) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, kind, Arc::from(listener)));
        id
    }

    /// Remove one listener. Returns `false` if it was already gone.
    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _, _)| *entry_id != id);
        self.entries.len() != before
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Listeners registered for `kind`, cloned out of the registry.
    pub fn snapshot(&self, kind: EventKind) -> Vec<SharedListener<C>> {
        self.entries
            .iter()
            .filter(|(_, entry_kind, _)| *entry_kind == kind)
            .map(|(_, _, listener)| Arc::clone(listener))
            .collect()
    }
}

/// Invoke every listener with the same event.
pub fn dispatch<C>(listeners: &[SharedListener<C>], event: &MachineEvent<C>) {
    for listener in listeners {
        listener(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn event() -> MachineEvent<()> {
        MachineEvent {
            state: "INITIAL".into(),
            context: (),
        }
    }

    #[test]
    fn every_listener_of_a_kind_is_notified() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut listeners: Listeners<()> = Listeners::new();

        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            listeners.add(
                EventKind::StateChanged,
                Box::new(move |_: &MachineEvent<()>| {
                    calls.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }
        listeners.add(
            EventKind::Terminated,
            Box::new(|_: &MachineEvent<()>| panic!("wrong kind")),
        );

        dispatch(&listeners.snapshot(EventKind::StateChanged), &event());

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn remove_drops_only_the_given_listener() {
        let mut listeners: Listeners<()> = Listeners::new();
        let first = listeners.add(EventKind::StateChanged, Box::new(|_: &MachineEvent<()>| {}));
        let second = listeners.add(EventKind::Terminated, Box::new(|_: &MachineEvent<()>| {}));

        assert!(listeners.remove(first));
        assert!(!listeners.remove(first));
        assert_eq!(listeners.len(), 1);
        assert_ne!(first, second);
    }

    #[test]
    fn clear_is_idempotent() {
        let mut listeners: Listeners<()> = Listeners::new();
        listeners.add(EventKind::StateChanged, Box::new(|_: &MachineEvent<()>| {}));

        listeners.clear();
        listeners.clear();

        assert!(listeners.is_empty());
    }
}
