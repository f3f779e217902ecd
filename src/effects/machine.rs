//! State machine that runs asynchronous entry actions.

use crate::core::{
    dispatch, Context, EventKind, HistoryEntry, Listener, ListenerId, Listeners, MachineEvent,
    State, StateHistory,
};
use crate::effects::error::{MachineError, MachineResult};
use crate::effects::node::StateNode;
use crate::effects::traits::Machine;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, trace};
use uuid::Uuid;

/// How a machine treats a `start`/`transition` issued while another chain
/// of entry actions is still running.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReentryPolicy {
    /// Only a transition into the current state is rejected. Overlapping
    /// external calls interleave freely.
    #[default]
    Permissive,

    /// External calls fail with [`MachineError::Busy`] while a chain is in
    /// flight. Transitions made through the chain's own [`MachineHandle`]
    /// are accepted.
    Exclusive,
}

struct Run<S: State, C: Context> {
    context: C,
    current: Option<S>,
    history: StateHistory<S>,
    chain: Option<u64>,
    next_chain: u64,
}

struct Inner<S: State, C: Context> {
    id: Uuid,
    initial: S,
    finals: Vec<S>,
    initial_context: C,
    policy: ReentryPolicy,
    states: Mutex<Vec<Arc<StateNode<S, C>>>>,
    run: Mutex<Run<S, C>>,
    listeners: Mutex<Listeners<C>>,
}

/// A finite state machine with asynchronous entry actions.
///
/// `StateMachine` is a cheap handle: clones share the same states, context
/// and listeners.
///
/// # Example
///
/// ```rust
/// use micromachine::effects::StateMachine;
/// use serde_json::{json, Value};
///
/// # futures::executor::block_on(async {
/// let machine: StateMachine<String, Value> =
///     StateMachine::new("INITIAL", ["FINAL"], json!({ "name": "" }));
///
/// machine
///     .state("INITIAL", |machine, _context| async move {
///         machine.transition("FINAL", Some(json!({ "name": "Fede" }))).await
///     })
///     .terminal("FINAL");
///
/// machine.start(None).await.unwrap();
///
/// assert!(machine.success());
/// assert_eq!(machine.context()["name"], "Fede");
/// # });
/// ```
pub struct StateMachine<S: State, C: Context> {
    inner: Arc<Inner<S, C>>,
}

impl<S: State, C: Context> Clone for StateMachine<S, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: State, C: Context> StateMachine<S, C> {
    /// Create an unstarted machine with the permissive reentry policy.
    pub fn new<F>(initial: impl Into<S>, finals: impl IntoIterator<Item = F>, context: C) -> Self
    where
        F: Into<S>,
    {
        Self::with_policy(initial, finals, context, ReentryPolicy::default())
    }

    pub fn with_policy<F>(
        initial: impl Into<S>,
        finals: impl IntoIterator<Item = F>,
        context: C,
        policy: ReentryPolicy,
    ) -> Self
    where
        F: Into<S>,
    {
        Self {
            inner: Arc::new(Inner {
                id: Uuid::new_v4(),
                initial: initial.into(),
                finals: finals.into_iter().map(Into::into).collect(),
                initial_context: context.clone(),
                policy,
                states: Mutex::new(Vec::new()),
                run: Mutex::new(Run {
                    context,
                    current: None,
                    history: StateHistory::new(),
                    chain: None,
                    next_chain: 0,
                }),
                listeners: Mutex::new(Listeners::new()),
            }),
        }
    }

    /// Append a node. Names are not checked for uniqueness here; on
    /// duplicates the first registered node wins.
    pub fn add_state(&self, node: StateNode<S, C>) {
        self.inner.states.lock().push(Arc::new(node));
    }

    /// Add a node with an entry action.
    pub fn state<F, Fut>(&self, name: impl Into<S>, action: F) -> &Self
    where
        F: Fn(MachineHandle<S, C>, C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = MachineResult<()>> + Send + 'static,
    {
        self.add_state(StateNode::new(name, action));
        self
    }

    /// Add a terminal node.
    pub fn terminal(&self, name: impl Into<S>) -> &Self {
        self.add_state(StateNode::terminal(name));
        self
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn initial(&self) -> &S {
        &self.inner.initial
    }

    pub fn finals(&self) -> &[S] {
        &self.inner.finals
    }

    pub fn policy(&self) -> ReentryPolicy {
        self.inner.policy
    }

    /// Registered state names in declaration order.
    pub fn states(&self) -> Vec<S> {
        self.inner
            .states
            .lock()
            .iter()
            .map(|node| node.name().clone())
            .collect()
    }

    pub fn context(&self) -> C {
        self.inner.run.lock().context.clone()
    }

    pub fn current_state(&self) -> Option<S> {
        self.inner.run.lock().current.clone()
    }

    pub fn history(&self) -> StateHistory<S> {
        self.inner.run.lock().history.clone()
    }

    /// True when the current state is one of the declared final states.
    pub fn success(&self) -> bool {
        let run = self.inner.run.lock();
        run.current
            .as_ref()
            .is_some_and(|current| self.inner.finals.contains(current))
    }

    /// True when the current state has no entry action.
    pub fn terminated(&self) -> bool {
        let current = self.inner.run.lock().current.clone();
        current.is_some_and(|current| {
            self.find_state(&current)
                .is_ok_and(|node| node.is_terminal())
        })
    }

    /// Enter the initial state. Same as `transition(initial, context)`.
    pub fn start(&self, context: Option<C>) -> BoxFuture<'static, MachineResult<()>> {
        self.run_transition(self.inner.initial.clone(), context, None)
    }

    /// Move to `name`, merging `context` into the machine's context.
    ///
    /// Resolves when the entry action of the new state (and everything it
    /// triggers) has completed. Fails without touching the machine if
    /// `name` is unknown or is the current state.
    pub fn transition(
        &self,
        name: impl Into<S>,
        context: Option<C>,
    ) -> BoxFuture<'static, MachineResult<()>> {
        self.run_transition(name.into(), context, None)
    }

    pub fn on_state_changed<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&MachineEvent<C>) + Send + Sync + 'static,
    {
        self.add_listener(EventKind::StateChanged, Box::new(listener))
    }

    pub fn on_terminated<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&MachineEvent<C>) + Send + Sync + 'static,
    {
        self.add_listener(EventKind::Terminated, Box::new(listener))
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.listeners.lock().remove(id)
    }

    pub fn clear_listeners(&self) {
        self.inner.listeners.lock().clear();
        trace!(machine = %self.inner.id, "listeners cleared");
    }

    /// Forget the current state and history and restore the construction
    /// time context. States and listeners are kept.
    pub fn reset(&self) {
        let mut run = self.inner.run.lock();
        run.context = self.inner.initial_context.clone();
        run.current = None;
        run.history = StateHistory::new();
        debug!(machine = %self.inner.id, "machine reset");
    }

    fn add_listener(&self, kind: EventKind, listener: Listener<C>) -> ListenerId {
        self.inner.listeners.lock().add(kind, listener)
    }

    fn find_state(&self, name: &S) -> MachineResult<Arc<StateNode<S, C>>> {
        self.inner
            .states
            .lock()
            .iter()
            .find(|node| node.name() == name)
            .cloned()
            .ok_or_else(|| MachineError::InvalidState {
                name: name.name().to_string(),
            })
    }

    fn notify(&self, kind: EventKind, event: &MachineEvent<C>) {
        let listeners = self.inner.listeners.lock().snapshot(kind);
        trace!(
            machine = %self.inner.id,
            ?kind,
            listeners = listeners.len(),
            "notifying listeners"
        );
        dispatch(&listeners, event);
    }

    /// Claim the in-flight slot for a new chain, or join the running one.
    fn enter_chain(
        &self,
        chain: Option<u64>,
    ) -> MachineResult<(Option<u64>, Option<ChainGuard<S, C>>)> {
        if self.inner.policy == ReentryPolicy::Permissive {
            return Ok((None, None));
        }

        let mut run = self.inner.run.lock();
        match (run.chain, chain) {
            (Some(active), Some(requested)) if active == requested => Ok((Some(active), None)),
            (Some(_), _) => Err(MachineError::Busy {
                state: run
                    .current
                    .as_ref()
                    .map(|state| state.name().to_string())
                    .unwrap_or_default(),
            }),
            (None, _) => {
                let id = run.next_chain;
                run.next_chain += 1;
                run.chain = Some(id);
                Ok((
                    Some(id),
                    Some(ChainGuard {
                        machine: self.clone(),
                        id,
                    }),
                ))
            }
        }
    }

    fn run_transition(
        &self,
        name: S,
        partial: Option<C>,
        chain: Option<u64>,
    ) -> BoxFuture<'static, MachineResult<()>> {
        let machine = self.clone();
        async move {
            let (chain, _guard) = machine.enter_chain(chain)?;
            let node = machine.find_state(&name)?;

            let event = {
                let mut run = machine.inner.run.lock();
                if run.current.as_ref() == Some(&name) {
                    return Err(MachineError::AlreadyInState {
                        name: name.name().to_string(),
                    });
                }

                let from = run.current.as_ref().map(|state| state.name().to_string());
                run.history.push(HistoryEntry::now(name.clone()));
                if let Some(partial) = partial {
                    run.context.merge(partial);
                }
                run.current = Some(name.clone());

                debug!(
                    machine = %machine.inner.id,
                    from = from.as_deref().unwrap_or("<unstarted>"),
                    state = name.name(),
                    "entered state"
                );

                MachineEvent {
                    state: name.name().to_string(),
                    context: run.context.clone(),
                }
            };

            machine.notify(EventKind::StateChanged, &event);

            if node.is_terminal() {
                debug!(
                    machine = %machine.inner.id,
                    state = %event.state,
                    success = machine.success(),
                    "machine terminated"
                );
                machine.notify(EventKind::Terminated, &event);
                return Ok(());
            }

            let handle = MachineHandle {
                machine: machine.clone(),
                chain,
            };
            node.emit_on_enter(handle, event.context).await
        }
        .boxed()
    }
}

impl<S: State, C: Context> Machine<C> for StateMachine<S, C> {
    fn context(&self) -> C {
        StateMachine::context(self)
    }

    fn start(&self, context: Option<C>) -> BoxFuture<'static, MachineResult<()>> {
        StateMachine::start(self, context)
    }

    fn on_state_changed(&self, listener: Listener<C>) -> ListenerId {
        self.add_listener(EventKind::StateChanged, listener)
    }

    fn on_terminated(&self, listener: Listener<C>) -> ListenerId {
        self.add_listener(EventKind::Terminated, listener)
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        StateMachine::remove_listener(self, id)
    }

    fn clear_listeners(&self) {
        StateMachine::clear_listeners(self)
    }

    fn reset(&self) {
        StateMachine::reset(self)
    }

    fn state_name(&self) -> Option<String> {
        self.current_state().map(|state| state.name().to_string())
    }

    fn success(&self) -> bool {
        StateMachine::success(self)
    }

    fn terminated(&self) -> bool {
        StateMachine::terminated(self)
    }
}

impl<S: State, C: Context> fmt::Debug for StateMachine<S, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let run = self.inner.run.lock();
        f.debug_struct("StateMachine")
            .field("id", &self.inner.id)
            .field("initial", &self.inner.initial)
            .field("finals", &self.inner.finals)
            .field("current", &run.current)
            .field("context", &run.context)
            .finish()
    }
}

/// Releases the in-flight slot when the outermost call of a chain ends,
/// whether it succeeded, failed or was dropped.
struct ChainGuard<S: State, C: Context> {
    machine: StateMachine<S, C>,
    id: u64,
}

impl<S: State, C: Context> Drop for ChainGuard<S, C> {
    fn drop(&mut self) {
        let mut run = self.machine.inner.run.lock();
        if run.chain == Some(self.id) {
            run.chain = None;
        }
    }
}

/// Transition capability handed to entry actions.
///
/// Scoped to the machine running the action; under
/// [`ReentryPolicy::Exclusive`] its transitions belong to the chain that
/// invoked the action.
pub struct MachineHandle<S: State, C: Context> {
    machine: StateMachine<S, C>,
    chain: Option<u64>,
}

impl<S: State, C: Context> Clone for MachineHandle<S, C> {
    fn clone(&self) -> Self {
        Self {
            machine: self.machine.clone(),
            chain: self.chain,
        }
    }
}

impl<S: State, C: Context> MachineHandle<S, C> {
    pub fn transition(
        &self,
        name: impl Into<S>,
        context: Option<C>,
    ) -> BoxFuture<'static, MachineResult<()>> {
        self.machine.run_transition(name.into(), context, self.chain)
    }

    pub fn context(&self) -> C {
        self.machine.context()
    }

    pub fn current_state(&self) -> Option<S> {
        self.machine.current_state()
    }

    pub fn history(&self) -> StateHistory<S> {
        self.machine.history()
    }
}

impl<S: State, C: Context> fmt::Debug for MachineHandle<S, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MachineHandle")
            .field("machine", &self.machine.id())
            .field("chain", &self.chain)
            .finish()
    }
}
