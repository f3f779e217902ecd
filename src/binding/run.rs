//! Run a machine to completion and branch on its outcome.

use crate::core::{Context, MachineEvent};
use crate::effects::{Machine, MachineResult};
use futures::channel::oneshot;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Start `machine` and hand its terminated event to `on_success` or
/// `on_failure`, depending on the machine's `success()`.
///
/// The helper waits for the terminated event, not just for `start`: a
/// machine that reaches its terminal state from a spawned task is still
/// dispatched. A machine that never terminates keeps the returned future
/// pending, so wrap it in a timeout where that matters. If the machine's
/// listeners are cleared before it terminates, neither callback runs and
/// the result is `Ok(None)`. Errors from the run are returned after the
/// helper's listener has been removed.
///
/// ```rust
/// use micromachine::binding::run_machine;
/// use micromachine::effects::StateMachine;
/// use serde_json::{json, Value};
///
/// # futures::executor::block_on(async {
/// let machine: StateMachine<String, Value> = StateMachine::new("INITIAL", ["DONE"], json!({}));
/// machine
///     .state("INITIAL", |machine, _| async move { machine.transition("DONE", None).await })
///     .terminal("DONE");
///
/// let outcome = run_machine(
///     &machine,
///     None,
///     |event| async move { format!("ok: {}", event.state) },
///     |event| async move { format!("failed: {}", event.state) },
/// )
/// .await
/// .unwrap();
///
/// assert_eq!(outcome.as_deref(), Some("ok: DONE"));
/// # });
/// ```
pub async fn run_machine<C, M, T, OnSuccess, SuccessFut, OnFailure, FailureFut>(
    machine: &M,
    context: Option<C>,
    on_success: OnSuccess,
    on_failure: OnFailure,
) -> MachineResult<Option<T>>
where
    C: Context,
    M: Machine<C> + ?Sized,
    OnSuccess: FnOnce(MachineEvent<C>) -> SuccessFut,
    SuccessFut: Future<Output = T>,
    OnFailure: FnOnce(MachineEvent<C>) -> FailureFut,
    FailureFut: Future<Output = T>,
{
    let (sender, terminated) = oneshot::channel();
    let slot = Arc::new(Mutex::new(Some(sender)));

    let listener = machine.on_terminated(Box::new(move |event: &MachineEvent<C>| {
        if let Some(sender) = slot.lock().take() {
            let _ = sender.send(event.clone());
        }
    }));

    if let Err(error) = machine.start(context).await {
        machine.remove_listener(listener);
        return Err(error);
    }

    let event = terminated.await;
    machine.remove_listener(listener);
    let Ok(event) = event else {
        debug!("listeners cleared before the machine terminated");
        return Ok(None);
    };

    if machine.success() {
        debug!(state = %event.state, "run succeeded");
        Ok(Some(on_success(event).await))
    } else {
        debug!(state = %event.state, "run failed");
        Ok(Some(on_failure(event).await))
    }
}
