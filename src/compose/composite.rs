//! Sequential chain of machines behaving as one machine.
//!
//! A successful, non-last component's terminated event queues a start of
//! the next component. The queue is drained by a driver: the future
//! returned from [`Machine::start`] or [`Composite::drive`]. A component
//! may reach its terminal state long after its own `start` future resolved
//! (an action that hands the transition to a spawned task), or be started
//! directly instead of through the composite; in both cases the next
//! component runs as soon as a driver is polling.

use crate::builder::BuildError;
use crate::core::{dispatch, Context, EventKind, Listener, ListenerId, Listeners, MachineEvent};
use crate::effects::{Machine, MachineError, MachineResult};
use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::future::{BoxFuture, FutureExt};
use futures::StreamExt;
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, trace};
use uuid::Uuid;

struct Chain<C> {
    context: C,
    /// Last state reported by any component
    state: Option<String>,
    terminated: bool,
}

/// Work queued for the driver by component events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Start(usize),
    Terminated,
}

struct CompositeInner<C: Context> {
    id: Uuid,
    machines: Vec<Arc<dyn Machine<C>>>,
    chain: Mutex<Chain<C>>,
    listeners: Mutex<Listeners<C>>,
    signals: UnboundedSender<Signal>,
    /// `None` while a driver holds it
    queue: Mutex<Option<UnboundedReceiver<Signal>>>,
}

/// Machines run one after another; the chain stops at the first one that
/// terminates without success.
///
/// The composite keeps an aggregate context: the union of every
/// component's context, updated with every event a component reports.
/// Listeners registered on the composite receive the aggregate.
pub struct Composite<C: Context> {
    inner: Arc<CompositeInner<C>>,
}

impl<C: Context> Clone for Composite<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Chain `machines` in order. At least two are required.
pub fn compose<C: Context>(machines: Vec<Arc<dyn Machine<C>>>) -> Result<Composite<C>, BuildError> {
    if machines.len() < 2 {
        return Err(BuildError::TooFewMachines {
            count: machines.len(),
        });
    }

    let (signals, queue) = mpsc::unbounded();
    let inner = Arc::new(CompositeInner {
        id: Uuid::new_v4(),
        chain: Mutex::new(Chain {
            context: seed_context(&machines),
            state: None,
            terminated: false,
        }),
        machines,
        listeners: Mutex::new(Listeners::new()),
        signals,
        queue: Mutex::new(Some(queue)),
    });

    let last = inner.machines.len() - 1;
    for (index, machine) in inner.machines.iter().enumerate() {
        let weak = Arc::downgrade(&inner);
        machine.on_state_changed(Box::new(move |event: &MachineEvent<C>| {
            if let Some(inner) = weak.upgrade() {
                inner.component_state_changed(event);
            }
        }));

        let weak: Weak<CompositeInner<C>> = Arc::downgrade(&inner);
        machine.on_terminated(Box::new(move |event: &MachineEvent<C>| {
            if let Some(inner) = weak.upgrade() {
                inner.component_terminated(index, index == last, event);
            }
        }));
    }

    debug!(
        composite = %inner.id,
        machines = inner.machines.len(),
        "composite created"
    );
    Ok(Composite { inner })
}

/// Union of the components' contexts, later components winning.
fn seed_context<C: Context>(machines: &[Arc<dyn Machine<C>>]) -> C {
    let mut contexts = machines.iter().map(|machine| machine.context());
    // Callers guarantee at least two machines.
    let mut context = match contexts.next() {
        Some(first) => first,
        None => unreachable!("composite without machines"),
    };
    for partial in contexts {
        context.merge(partial);
    }
    context
}

impl<C: Context> CompositeInner<C> {
    fn component_state_changed(&self, event: &MachineEvent<C>) {
        let aggregate = {
            let mut chain = self.chain.lock();
            chain.context.merge(event.context.clone());
            chain.state = Some(event.state.clone());
            MachineEvent {
                state: event.state.clone(),
                context: chain.context.clone(),
            }
        };
        self.notify(EventKind::StateChanged, &aggregate);
    }

    fn component_terminated(&self, index: usize, is_last: bool, event: &MachineEvent<C>) {
        let succeeded = self.machines[index].success();
        let aggregate = {
            let mut chain = self.chain.lock();
            chain.context.merge(event.context.clone());
            chain.state = Some(event.state.clone());

            if !is_last && succeeded {
                None
            } else {
                chain.terminated = true;
                Some(MachineEvent {
                    state: event.state.clone(),
                    context: chain.context.clone(),
                })
            }
        };

        match aggregate {
            None => {
                trace!(
                    composite = %self.id,
                    component = index,
                    next = index + 1,
                    "component succeeded, queueing the next one"
                );
                self.signal(Signal::Start(index + 1));
            }
            Some(aggregate) => {
                debug!(
                    composite = %self.id,
                    component = index,
                    state = %aggregate.state,
                    success = succeeded,
                    "composite terminated"
                );
                self.notify(EventKind::Terminated, &aggregate);
                self.signal(Signal::Terminated);
            }
        }
    }

    fn signal(&self, signal: Signal) {
        // The receiver lives as long as `self`, so this only fails while
        // the composite is being dropped.
        if self.signals.unbounded_send(signal).is_err() {
            trace!(composite = %self.id, ?signal, "signal dropped");
        }
    }

    fn notify(&self, kind: EventKind, event: &MachineEvent<C>) {
        let listeners = self.listeners.lock().snapshot(kind);
        dispatch(&listeners, event);
    }

    fn busy(&self) -> MachineError {
        MachineError::Busy {
            state: self.chain.lock().state.clone().unwrap_or_default(),
        }
    }
}

/// Exclusive hold on the signal queue. The receiver goes back to the
/// composite when the driver finishes or is dropped mid-run.
struct Driver<C: Context> {
    inner: Arc<CompositeInner<C>>,
    queue: Option<UnboundedReceiver<Signal>>,
}

impl<C: Context> Driver<C> {
    fn claim(inner: &Arc<CompositeInner<C>>) -> Option<Self> {
        let queue = inner.queue.lock().take()?;
        Some(Self {
            inner: Arc::clone(inner),
            queue: Some(queue),
        })
    }

    /// Throw away signals left over from an earlier run.
    fn discard_pending(&mut self) {
        if let Some(queue) = self.queue.as_mut() {
            while let Ok(Some(signal)) = queue.try_next() {
                trace!(composite = %self.inner.id, ?signal, "discarding stale signal");
            }
        }
    }

    /// Start queued components until the composite terminates or a
    /// component fails.
    async fn run(mut self) -> MachineResult<()> {
        loop {
            if self.inner.chain.lock().terminated {
                return Ok(());
            }
            let Some(queue) = self.queue.as_mut() else {
                return Ok(());
            };
            match queue.next().await {
                Some(Signal::Start(index)) => {
                    trace!(composite = %self.inner.id, component = index, "starting component");
                    self.inner.machines[index].start(None).await?;
                }
                Some(Signal::Terminated) => {}
                None => return Ok(()),
            }
        }
    }
}

impl<C: Context> Drop for Driver<C> {
    fn drop(&mut self) {
        if let Some(queue) = self.queue.take() {
            *self.inner.queue.lock() = Some(queue);
        }
    }
}

impl<C: Context> Composite<C> {
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Number of chained machines.
    pub fn len(&self) -> usize {
        self.inner.machines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.machines.is_empty()
    }

    pub fn machines(&self) -> &[Arc<dyn Machine<C>>] {
        &self.inner.machines
    }

    /// Run queued components without starting the first one.
    ///
    /// Use this when components are started directly: the returned future
    /// starts each component queued by its predecessor's success and
    /// resolves once the composite terminates. Fails with `Busy` while
    /// another driver is running.
    pub fn drive(&self) -> BoxFuture<'static, MachineResult<()>> {
        let inner = Arc::clone(&self.inner);
        async move {
            let driver = Driver::claim(&inner).ok_or_else(|| inner.busy())?;
            driver.run().await
        }
        .boxed()
    }
}

impl<C: Context> Machine<C> for Composite<C> {
    fn context(&self) -> C {
        self.inner.chain.lock().context.clone()
    }

    /// Start the first machine with `context`; each following machine is
    /// started, without a seed, once its predecessor's terminated event
    /// reports success. Resolves when the composite terminates or a
    /// component fails, and with `Busy` while another driver is running.
    fn start(&self, context: Option<C>) -> BoxFuture<'static, MachineResult<()>> {
        let inner = Arc::clone(&self.inner);
        async move {
            let mut driver = Driver::claim(&inner).ok_or_else(|| inner.busy())?;
            driver.discard_pending();
            inner.chain.lock().terminated = false;

            trace!(composite = %inner.id, component = 0, "starting component");
            inner.machines[0].start(context).await?;
            driver.run().await
        }
        .boxed()
    }

    fn on_state_changed(&self, listener: Listener<C>) -> ListenerId {
        self.inner
            .listeners
            .lock()
            .add(EventKind::StateChanged, listener)
    }

    fn on_terminated(&self, listener: Listener<C>) -> ListenerId {
        self.inner
            .listeners
            .lock()
            .add(EventKind::Terminated, listener)
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.listeners.lock().remove(id)
    }

    /// Clears the composite's own listeners. The wiring to its components
    /// stays in place.
    fn clear_listeners(&self) {
        self.inner.listeners.lock().clear();
    }

    fn reset(&self) {
        for machine in &self.inner.machines {
            machine.reset();
        }
        let context = seed_context(&self.inner.machines);
        {
            let mut chain = self.inner.chain.lock();
            chain.context = context;
            chain.state = None;
            chain.terminated = false;
        }
        if let Some(mut driver) = Driver::claim(&self.inner) {
            driver.discard_pending();
        }
        debug!(composite = %self.inner.id, "composite reset");
    }

    fn state_name(&self) -> Option<String> {
        self.inner.chain.lock().state.clone()
    }

    fn success(&self) -> bool {
        self.inner.machines.iter().all(|machine| machine.success())
    }

    fn terminated(&self) -> bool {
        self.inner.chain.lock().terminated
    }
}

impl<C: Context> fmt::Debug for Composite<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let chain = self.inner.chain.lock();
        f.debug_struct("Composite")
            .field("id", &self.inner.id)
            .field("machines", &self.inner.machines.len())
            .field("terminated", &chain.terminated)
            .field("context", &chain.context)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::StateMachine;
    use serde_json::{json, Value};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use tokio::sync::Notify;
    use tokio::time::timeout;

    type JsonMachine = StateMachine<String, Value>;

    fn name_machine() -> JsonMachine {
        let machine: JsonMachine =
            StateMachine::new("INITIAL", ["NAME_LOADED"], json!({ "name": null }));
        machine
            .state("INITIAL", |machine, _| async move {
                machine
                    .transition("NAME_LOADED", Some(json!({ "name": "Fede" })))
                    .await
            })
            .terminal("NAME_LOADED");
        machine
    }

    fn age_machine() -> JsonMachine {
        let machine: JsonMachine =
            StateMachine::new("INITIAL", ["AGE_LOADED"], json!({ "age": null }));
        machine
            .state("INITIAL", |machine, _| async move {
                machine
                    .transition("AGE_LOADED", Some(json!({ "age": 35 })))
                    .await
            })
            .terminal("AGE_LOADED");
        machine
    }

    fn failing_machine() -> JsonMachine {
        let machine: JsonMachine = StateMachine::new("INITIAL", ["DONE"], json!({}));
        machine
            .state("INITIAL", |machine, _| async move {
                machine
                    .transition("ERROR", Some(json!({ "error": "unreachable" })))
                    .await
            })
            .terminal("DONE")
            .terminal("ERROR");
        machine
    }

    /// Reaches its final state from a spawned task, after its own `start`
    /// future has resolved.
    fn deferred_machine() -> JsonMachine {
        let machine: JsonMachine =
            StateMachine::new("INITIAL", ["CITY_LOADED"], json!({ "city": null }));
        machine
            .state("INITIAL", |machine, _| async move {
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    machine
                        .transition("CITY_LOADED", Some(json!({ "city": "Rosario" })))
                        .await
                });
                Ok(())
            })
            .terminal("CITY_LOADED");
        machine
    }

    fn boxed(machine: JsonMachine) -> Arc<dyn Machine<Value>> {
        Arc::new(machine)
    }

    #[test]
    fn compose_requires_two_machines() {
        let result = compose(vec![boxed(name_machine())]);
        assert_eq!(
            result.unwrap_err(),
            BuildError::TooFewMachines { count: 1 }
        );

        let result = compose::<Value>(Vec::new());
        assert_eq!(
            result.unwrap_err(),
            BuildError::TooFewMachines { count: 0 }
        );
    }

    #[test]
    fn aggregate_context_starts_as_union() {
        let composite = compose(vec![boxed(name_machine()), boxed(age_machine())]).unwrap();

        assert_eq!(composite.context(), json!({ "name": null, "age": null }));
        assert!(!composite.terminated());
        assert!(!composite.success());
    }

    #[tokio::test]
    async fn runs_components_in_order_and_aggregates() {
        let composite = compose(vec![boxed(name_machine()), boxed(age_machine())]).unwrap();
        let terminated = Arc::new(StdMutex::new(Vec::new()));

        let sink = Arc::clone(&terminated);
        composite.on_terminated(Box::new(move |event: &MachineEvent<Value>| {
            sink.lock()
                .unwrap()
                .push((event.state.clone(), event.context.clone()));
        }));

        composite.start(None).await.unwrap();

        assert_eq!(composite.context(), json!({ "name": "Fede", "age": 35 }));
        assert!(composite.success());
        assert!(composite.terminated());
        assert_eq!(
            *terminated.lock().unwrap(),
            vec![(
                "AGE_LOADED".to_string(),
                json!({ "name": "Fede", "age": 35 })
            )]
        );
    }

    #[tokio::test]
    async fn failed_component_stops_the_chain() {
        let last = age_machine();
        let composite = compose(vec![
            boxed(name_machine()),
            boxed(failing_machine()),
            boxed(last.clone()),
        ])
        .unwrap();
        let terminations = Arc::new(StdMutex::new(Vec::new()));

        let sink = Arc::clone(&terminations);
        composite.on_terminated(Box::new(move |event: &MachineEvent<Value>| {
            sink.lock().unwrap().push(event.state.clone());
        }));

        composite.start(None).await.unwrap();

        assert!(composite.terminated());
        assert!(!composite.success());
        assert_eq!(*terminations.lock().unwrap(), vec!["ERROR".to_string()]);
        assert_eq!(last.current_state(), None);
        assert!(last.history().is_empty());
        assert_eq!(composite.context()["error"], "unreachable");
        assert_eq!(composite.context()["age"], Value::Null);
    }

    #[tokio::test]
    async fn forwards_component_transitions_with_aggregate() {
        let composite = compose(vec![boxed(name_machine()), boxed(age_machine())]).unwrap();
        let seen = Arc::new(StdMutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        composite.on_state_changed(Box::new(move |event: &MachineEvent<Value>| {
            sink.lock()
                .unwrap()
                .push((event.state.clone(), event.context["name"].clone()));
        }));

        composite.start(None).await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ("INITIAL".to_string(), Value::Null),
                ("NAME_LOADED".to_string(), json!("Fede")),
                ("INITIAL".to_string(), json!("Fede")),
                ("AGE_LOADED".to_string(), json!("Fede")),
            ]
        );
    }

    #[tokio::test]
    async fn seed_goes_to_the_first_component_only() {
        let first = name_machine();
        let second = age_machine();
        let composite = compose(vec![boxed(first.clone()), boxed(second.clone())]).unwrap();

        composite
            .start(Some(json!({ "source": "seed" })))
            .await
            .unwrap();

        assert_eq!(first.context()["source"], "seed");
        assert_eq!(second.context().get("source"), None);
        assert_eq!(composite.context()["source"], "seed");
    }

    #[tokio::test]
    async fn composites_nest() {
        let inner = compose(vec![boxed(name_machine()), boxed(age_machine())]).unwrap();
        let city: JsonMachine = StateMachine::new("INITIAL", ["CITY_LOADED"], json!({}));
        city.state("INITIAL", |machine, _| async move {
            machine
                .transition("CITY_LOADED", Some(json!({ "city": "Rosario" })))
                .await
        })
        .terminal("CITY_LOADED");

        let outer = compose(vec![
            Arc::new(inner) as Arc<dyn Machine<Value>>,
            boxed(city),
        ])
        .unwrap();

        outer.start(None).await.unwrap();

        assert!(outer.success());
        assert_eq!(
            outer.context(),
            json!({ "name": "Fede", "age": 35, "city": "Rosario" })
        );
    }

    #[tokio::test]
    async fn clear_listeners_keeps_the_chain_wired() {
        let composite = compose(vec![boxed(name_machine()), boxed(age_machine())]).unwrap();
        let calls = Arc::new(StdMutex::new(0));

        let sink = Arc::clone(&calls);
        composite.on_terminated(Box::new(move |_: &MachineEvent<Value>| {
            *sink.lock().unwrap() += 1;
        }));
        composite.clear_listeners();
        composite.clear_listeners();

        composite.start(None).await.unwrap();

        assert_eq!(*calls.lock().unwrap(), 0);
        assert!(composite.success());
    }

    #[tokio::test]
    async fn reset_allows_a_second_run() {
        let composite = compose(vec![boxed(name_machine()), boxed(age_machine())]).unwrap();

        composite.start(None).await.unwrap();
        assert_eq!(composite.state_name().as_deref(), Some("AGE_LOADED"));
        composite.reset();

        assert_eq!(composite.state_name(), None);
        assert!(!composite.terminated());
        assert!(!composite.success());
        assert_eq!(composite.context(), json!({ "name": null, "age": null }));

        composite.start(None).await.unwrap();
        assert!(composite.success());
        assert_eq!(composite.context(), json!({ "name": "Fede", "age": 35 }));
    }

    #[tokio::test]
    async fn deferred_termination_starts_the_next_component() {
        let first = deferred_machine();
        let second = age_machine();
        let composite = compose(vec![boxed(first.clone()), boxed(second.clone())]).unwrap();

        timeout(Duration::from_secs(5), composite.start(None))
            .await
            .expect("composite never terminated")
            .unwrap();

        assert!(first.success());
        assert_eq!(second.current_state().as_deref(), Some("AGE_LOADED"));
        assert!(composite.terminated());
        assert!(composite.success());
        assert_eq!(
            composite.context(),
            json!({ "city": "Rosario", "age": 35 })
        );
    }

    #[tokio::test]
    async fn deferred_last_component_terminates_the_composite() {
        let composite = compose(vec![boxed(name_machine()), boxed(deferred_machine())]).unwrap();
        let terminations = Arc::new(StdMutex::new(Vec::new()));

        let sink = Arc::clone(&terminations);
        composite.on_terminated(Box::new(move |event: &MachineEvent<Value>| {
            sink.lock().unwrap().push(event.state.clone());
        }));

        timeout(Duration::from_secs(5), composite.start(None))
            .await
            .expect("composite never terminated")
            .unwrap();

        assert!(composite.terminated());
        assert_eq!(*terminations.lock().unwrap(), vec!["CITY_LOADED".to_string()]);
    }

    #[tokio::test]
    async fn directly_started_component_advances_once_driven() {
        let first = name_machine();
        let second = age_machine();
        let composite = compose(vec![boxed(first.clone()), boxed(second.clone())]).unwrap();

        first.start(None).await.unwrap();

        assert!(first.success());
        assert_eq!(second.current_state(), None);
        assert!(!composite.terminated());

        timeout(Duration::from_secs(5), composite.drive())
            .await
            .expect("queued component never ran")
            .unwrap();

        assert_eq!(second.current_state().as_deref(), Some("AGE_LOADED"));
        assert!(composite.terminated());
        assert!(composite.success());
    }

    #[tokio::test]
    async fn a_waiting_driver_picks_up_a_direct_start() {
        let first = deferred_machine();
        let second = age_machine();
        let composite = compose(vec![boxed(first.clone()), boxed(second.clone())]).unwrap();

        let driver = tokio::spawn(composite.drive());
        first.start(None).await.unwrap();

        timeout(Duration::from_secs(5), driver)
            .await
            .expect("driver never finished")
            .unwrap()
            .unwrap();

        assert!(second.success());
        assert!(composite.terminated());
    }

    #[tokio::test]
    async fn only_one_driver_at_a_time() {
        let gate = Arc::new(Notify::new());
        let first: JsonMachine = StateMachine::new("INITIAL", ["DONE"], json!({}));
        let opened = Arc::clone(&gate);
        first
            .state("INITIAL", move |machine, _| {
                let opened = Arc::clone(&opened);
                async move {
                    opened.notified().await;
                    machine.transition("DONE", None).await
                }
            })
            .terminal("DONE");
        let composite = compose(vec![boxed(first.clone()), boxed(age_machine())]).unwrap();

        let run = tokio::spawn(composite.start(None));
        while first.current_state().is_none() {
            tokio::task::yield_now().await;
        }

        let second_start = composite.start(None).await;
        let second_drive = composite.drive().await;
        assert!(matches!(second_start, Err(MachineError::Busy { .. })));
        assert!(matches!(second_drive, Err(MachineError::Busy { .. })));

        gate.notify_one();
        run.await.unwrap().unwrap();
        assert!(composite.success());
    }
}
